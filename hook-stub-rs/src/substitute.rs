use crate::interceptor::Interceptor;

/// test-supplied behaviour that replaces or decorates a hooked call
///
/// each hook is invoked only when the interceptor fires at that location.
pub trait Substitute<R> {
    /// runs before the original when BEFORE fires
    fn before(&mut self, stub: &Interceptor) {
        let _ = stub;
    }

    /// produces the return value when SKIP_ORIGINAL fires
    fn skip(&mut self, stub: &Interceptor) -> R;

    /// may replace the original's result when AFTER fires
    fn after(&mut self, stub: &Interceptor, result: R) -> R {
        let _ = stub;
        result
    }

    /// runs at the end of every hooked call, fired or not
    fn finish(&mut self, stub: &Interceptor) {
        let _ = stub;
    }
}

/// adapts a single closure to every firing point
///
/// the value produced at BEFORE is kept and returned if the original is
/// then skipped in the same call; at AFTER the closure's value replaces the
/// result.
pub struct SubstituteFn<R, F> {
    body: F,
    pending: Option<R>,
}

impl<R, F> SubstituteFn<R, F>
where
    F: FnMut(&Interceptor) -> R,
{
    pub fn new(body: F) -> Self {
        Self {
            body,
            pending: None,
        }
    }
}

impl<R, F> Substitute<R> for SubstituteFn<R, F>
where
    F: FnMut(&Interceptor) -> R,
{
    fn before(&mut self, stub: &Interceptor) {
        self.pending = Some((self.body)(stub));
    }

    fn skip(&mut self, stub: &Interceptor) -> R {
        match self.pending.take() {
            Some(value) => value,
            None => (self.body)(stub),
        }
    }

    fn after(&mut self, stub: &Interceptor, _result: R) -> R {
        (self.body)(stub)
    }

    // a value kept from BEFORE belongs to that call only
    fn finish(&mut self, _stub: &Interceptor) {
        self.pending = None;
    }
}
