use std::cell::Cell;

// set while this thread runs wrapper bookkeeping (counting, deciding, logging)
thread_local! {
    static IN_INTERCEPT: Cell<bool> = const { Cell::new(false) };
}

pub fn is_in_intercept() -> bool {
    IN_INTERCEPT.with(|flag| flag.get())
}

/// marks the current thread as inside wrapper bookkeeping until dropped
///
/// restores the previous flag on drop, so it also unwinds cleanly.
pub(crate) struct InterceptScope {
    previous: bool,
}

impl InterceptScope {
    pub(crate) fn enter() -> Self {
        let previous = IN_INTERCEPT.with(|flag| flag.replace(true));
        Self { previous }
    }
}

impl Drop for InterceptScope {
    fn drop(&mut self) {
        IN_INTERCEPT.with(|flag| flag.set(self.previous));
    }
}

/// run `f` with the current thread marked as intercepting
pub(crate) fn guarded<T>(f: impl FnOnce() -> T) -> T {
    let _scope = InterceptScope::enter();
    f()
}
