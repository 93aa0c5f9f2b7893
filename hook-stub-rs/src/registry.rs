use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info};

use crate::config::ArmDirective;
use crate::error::Result;
use crate::interceptor::{Interceptor, InterceptorSnapshot};
use crate::resolver::LibraryCache;
use crate::types::HookTable;

/// every interceptor of a process plus the libraries they resolve against
///
/// interceptors are never removed; they live as long as the registry.
#[derive(Debug, Default)]
pub struct StubRegistry {
    libraries: LibraryCache,
    interceptors: Mutex<Vec<Arc<Interceptor>>>,
    debug: Arc<AtomicBool>,
    armed: Mutex<Vec<ArmDirective>>,
    torn_down: AtomicBool,
}

impl StubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Arc<Interceptor>>> {
        self.interceptors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn armed(&self) -> MutexGuard<'_, Vec<ArmDirective>> {
        self.armed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// resolve `table` and append a new interceptor for it
    pub fn try_register(&self, table: &HookTable) -> Result<Arc<Interceptor>> {
        let symbols = self.libraries.resolve_table(table)?;
        let interceptor = Arc::new(Interceptor::new(table, symbols, Arc::clone(&self.debug)));

        // lock order: entries, then armed (same as `arm`)
        let mut entries = self.entries();
        for directive in self.armed().iter() {
            if directive.method == interceptor.method() {
                info!(method = %directive.method, "arming interceptor from environment");
                interceptor.configure(directive.ignition.clone());
            }
        }
        entries.push(Arc::clone(&interceptor));
        drop(entries);

        debug!(
            pid = std::process::id(),
            method = %interceptor.method(),
            library = %interceptor.library(),
            "interceptor registered"
        );
        Ok(interceptor)
    }

    /// like [`try_register`](Self::try_register), but a library or symbol
    /// that cannot be resolved terminates the process
    pub fn register(&self, table: &HookTable) -> Arc<Interceptor> {
        match self.try_register(table) {
            Ok(interceptor) => interceptor,
            Err(e) => {
                error!(pid = std::process::id(), error = %e, "hook environment is broken, aborting");
                std::process::exit(1);
            }
        }
    }

    /// clear the firing state of every interceptor and the debug flag
    pub fn reset_all(&self) {
        let entries = self.entries();
        for interceptor in entries.iter() {
            interceptor.reset_state();
        }
        self.debug.store(false, Ordering::Relaxed);
        debug!(count = entries.len(), "reset all interceptors");
    }

    pub fn set_debug(&self, enabled: bool) {
        self.debug.store(enabled, Ordering::Relaxed);
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    /// configure interceptors whose method label matches, now and on registration
    pub fn arm(&self, directive: ArmDirective) {
        let entries = self.entries();
        for interceptor in entries.iter() {
            if interceptor.method() == directive.method {
                interceptor.configure(directive.ignition.clone());
            }
        }
        self.armed().push(directive);
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// interceptors in registration order
    pub fn interceptors(&self) -> Vec<Arc<Interceptor>> {
        self.entries().clone()
    }

    pub fn find(&self, method: &str) -> Option<Arc<Interceptor>> {
        self.entries()
            .iter()
            .find(|i| i.method() == method)
            .cloned()
    }

    pub fn libraries(&self) -> &LibraryCache {
        &self.libraries
    }

    pub fn snapshot(&self) -> Vec<InterceptorSnapshot> {
        self.entries().iter().map(|i| i.snapshot()).collect()
    }

    pub fn status_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&serde_json::json!({
            "debug": self.debug_enabled(),
            "interceptors": self.snapshot(),
        }))?)
    }

    /// close every cached library; only the first call does anything
    ///
    /// must not run while a hooked call is still executing.
    pub fn teardown(&self) -> usize {
        if self
            .torn_down
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return 0;
        }
        self.libraries.close_all()
    }
}

static GLOBAL_REGISTRY: Lazy<StubRegistry> = Lazy::new(StubRegistry::new);

/// the process-wide registry used by generated wrappers
pub fn global() -> &'static StubRegistry {
    &GLOBAL_REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook_table;
    use crate::types::{FireLocation, Ignition};

    #[test]
    fn empty_table_registers_without_libraries() {
        let registry = StubRegistry::new();
        let stub = registry.try_register(&HookTable::default()).unwrap();
        assert_eq!(stub.method(), "");
        assert_eq!(registry.len(), 1);
        assert!(registry.libraries().is_empty());
    }

    #[test]
    fn reset_all_resets_every_instance_and_debug() {
        let registry = StubRegistry::new();
        let stubs: Vec<_> = (0..3)
            .map(|_| registry.try_register(&HookTable::default()).unwrap())
            .collect();

        stubs[0].configure(Ignition::at(2).payload("a").trace(true));
        stubs[1].configure(Ignition::at(9).location(FireLocation::BOTH));
        stubs[2].record_call();
        stubs[2].record_call();
        registry.set_debug(true);

        registry.reset_all();

        assert!(!registry.debug_enabled());
        for stub in registry.interceptors() {
            let snap = stub.snapshot();
            assert_eq!(snap.state.call_count, 0);
            assert_eq!(snap.state.location, FireLocation::NONE);
            assert_eq!(snap.state.threshold, 0);
            assert_eq!(snap.state.payload, "");
            assert!(!snap.state.trace);
        }
    }

    #[test]
    fn debug_flag_is_shared_with_interceptors() {
        let registry = StubRegistry::new();
        let stub = registry.try_register(&HookTable::default()).unwrap();
        assert!(stub.entry_line(None, None).is_none());
        registry.set_debug(true);
        assert!(stub.entry_line(None, None).is_some());
    }

    #[test]
    fn arm_applies_to_existing_and_future() {
        let registry = StubRegistry::new();
        let early = registry.try_register(&hook_table![]).unwrap();
        registry.arm(ArmDirective {
            method: String::new(),
            ignition: Ignition::at(4).payload("armed"),
        });
        assert_eq!(early.payload(), "armed");

        let late = registry.try_register(&hook_table![]).unwrap();
        assert_eq!(late.snapshot().state.threshold, 4);
    }

    #[test]
    fn arm_racing_registration_reaches_every_interceptor() {
        let registry = Arc::new(StubRegistry::new());
        let registrars: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        registry.try_register(&HookTable::default()).unwrap();
                    }
                })
            })
            .collect();

        registry.arm(ArmDirective {
            method: String::new(),
            ignition: Ignition::at(7),
        });
        for handle in registrars {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 800);
        for stub in registry.interceptors() {
            assert_eq!(stub.snapshot().state.threshold, 7);
        }
    }

    #[test]
    fn status_json_reports_interceptors() {
        let registry = StubRegistry::new();
        registry.try_register(&HookTable::default()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&registry.status_json().unwrap()).unwrap();
        assert_eq!(json["debug"], false);
        assert_eq!(json["interceptors"].as_array().unwrap().len(), 1);
        assert_eq!(json["interceptors"][0]["call_count"], 0);
    }

    #[test]
    fn teardown_runs_once() {
        let registry = StubRegistry::new();
        assert_eq!(registry.teardown(), 0);
        assert_eq!(registry.teardown(), 0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn two_interceptors_share_one_library() {
        let registry = StubRegistry::new();
        let abs = registry.try_register(&hook_table![("libc.so.6", "abs")]).unwrap();
        let labs = registry
            .try_register(&hook_table![("libc.so.6", "labs"), ("libc.so.6", "abs", "abs")])
            .unwrap();

        assert_eq!(registry.libraries().open_count(), 1);
        assert_eq!(abs.symbol("abs"), labs.symbol("abs"));
        assert_eq!(labs.method(), "abs, labs");
        assert_eq!(registry.find("abs, labs").map(|i| i.library().to_string()), Some("libc.so.6".to_string()));

        assert_eq!(registry.teardown(), 1);
        assert_eq!(registry.teardown(), 0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn failed_registration_is_not_recorded() {
        let registry = StubRegistry::new();
        assert!(registry
            .try_register(&hook_table![("libc.so.6", "hook_stub_missing_fn")])
            .is_err());
        assert!(registry.is_empty());
    }
}
