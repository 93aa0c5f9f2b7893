use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{error, info, warn};

use crate::diagnostics::{self, Phase};
use crate::error::{Result, StubError};
use crate::resolver::{RawSymbol, SymbolTable};
use crate::state::reentrancy::guarded;
use crate::state::{is_in_intercept, IgnitionState};
use crate::substitute::Substitute;
use crate::types::{FireLocation, HookTable, Ignition};

/// control object for one hooked logical operation
///
/// created through a [`StubRegistry`](crate::StubRegistry), which owns the
/// libraries its symbols live in and the debug flag it logs under.
#[derive(Debug)]
pub struct Interceptor {
    method: String,
    library: String,
    symbols: SymbolTable,
    state: Mutex<IgnitionState>,
    debug: Arc<AtomicBool>,
}

/// serializable view of an interceptor for status reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterceptorSnapshot {
    pub method: String,
    pub library: String,
    pub symbols: Vec<String>,
    #[serde(flatten)]
    pub state: IgnitionState,
}

impl Interceptor {
    pub(crate) fn new(table: &HookTable, symbols: SymbolTable, debug: Arc<AtomicBool>) -> Self {
        Self {
            method: table.method_label(),
            library: table.library_label(),
            symbols,
            state: Mutex::new(IgnitionState::default()),
            debug,
        }
    }

    fn state(&self) -> MutexGuard<'_, IgnitionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn debug_enabled(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn library(&self) -> &str {
        &self.library
    }

    /// address of a symbol from this interceptor's own table
    pub fn symbol(&self, name: &str) -> Option<RawSymbol> {
        self.symbols.get(name)
    }

    /// the original function behind `name`, typed as `F`
    ///
    /// # Safety
    /// `F` must be the function pointer type of the real symbol.
    pub unsafe fn original<F: Copy>(&self, name: &str) -> Option<F> {
        self.symbol(name).map(|sym| sym.cast::<F>())
    }

    /// like [`original`](Self::original), but a name outside this
    /// interceptor's table is an error
    ///
    /// # Safety
    /// `F` must be the function pointer type of the real symbol.
    pub unsafe fn try_original<F: Copy>(&self, name: &str) -> Result<F> {
        self.original(name).ok_or_else(|| StubError::UnknownSymbol {
            method: self.method.clone(),
            symbol: name.to_string(),
        })
    }

    /// the original behind `name`; a wrapper wired to a symbol its table
    /// does not hold terminates the process
    ///
    /// # Safety
    /// `F` must be the function pointer type of the real symbol.
    pub unsafe fn require_original<F: Copy>(&self, name: &str) -> F {
        match self.try_original(name) {
            Ok(original) => original,
            Err(e) => {
                error!(pid = std::process::id(), error = %e, "hook wiring is broken, aborting");
                std::process::exit(1);
            }
        }
    }

    /// replace all firing state; the call counter restarts from zero
    pub fn configure(&self, ignition: Ignition) {
        let unknown = ignition.location.unknown_bits();
        if unknown != 0 {
            warn!(
                method = %self.method,
                location = ignition.location.bits(),
                unknown_bits = unknown,
                "fire location has undefined bits, accepting as given"
            );
        }
        self.state().configure(ignition);
    }

    pub fn reset_state(&self) {
        self.state().reset();
    }

    /// advance the call counter; done once per logical call by the wrapper
    pub fn record_call(&self) -> u64 {
        self.state().record_call()
    }

    pub fn call_count(&self) -> u64 {
        self.state().call_count
    }

    pub fn payload(&self) -> String {
        self.state().payload.clone()
    }

    pub fn should_fire(&self, location: FireLocation) -> bool {
        self.should_fire_tagged(location, None)
    }

    /// like [`should_fire`](Self::should_fire), tagging the notification with `id`
    pub fn should_fire_tagged(&self, location: FireLocation, id: Option<&str>) -> bool {
        let (count, line) = {
            let state = self.state();
            if !state.should_fire(location) {
                return false;
            }
            (
                state.call_count,
                diagnostics::fire_line(location, id, &self.method, &state),
            )
        };
        info!(pid = std::process::id(), method = %self.method, count, "{}", line);
        true
    }

    /// the entry trace line, if debug or trace is on
    pub fn entry_line(&self, id: Option<&str>, message: Option<&str>) -> Option<String> {
        self.call_line(Phase::Enter, id, message)
    }

    /// the exit trace line, if debug or trace is on
    pub fn exit_line(&self, id: Option<&str>, message: Option<&str>) -> Option<String> {
        self.call_line(Phase::Exit, id, message)
    }

    fn call_line(&self, phase: Phase, id: Option<&str>, message: Option<&str>) -> Option<String> {
        let state = self.state();
        diagnostics::tracing_enabled(self.debug_enabled(), &state)
            .then(|| diagnostics::call_line(phase, id, message, &self.method, &state))
    }

    pub fn log_entry(&self, id: Option<&str>, message: Option<&str>) {
        if let Some(line) = self.entry_line(id, message) {
            info!(pid = std::process::id(), method = %self.method, "{}", line);
        }
    }

    pub fn log_exit(&self, id: Option<&str>, message: Option<&str>) {
        if let Some(line) = self.exit_line(id, message) {
            info!(pid = std::process::id(), method = %self.method, "{}", line);
        }
    }

    pub fn snapshot(&self) -> InterceptorSnapshot {
        let mut symbols: Vec<String> = self.symbols.names().map(str::to_string).collect();
        symbols.sort();
        InterceptorSnapshot {
            method: self.method.clone(),
            library: self.library.clone(),
            symbols,
            state: self.state().clone(),
        }
    }

    /// run one hooked call through the fixed wrapper sequence
    ///
    /// count, entry trace, BEFORE, original or SKIP_ORIGINAL, AFTER, exit trace.
    /// the state lock is never held while `substitute` or `original` run, so
    /// either may reconfigure this interceptor. a hooked call made while this
    /// thread is counting, deciding or logging (e.g. the log writer calling a
    /// hooked `write`) goes straight to `original`.
    pub fn invoke<R, S, F>(&self, id: Option<&str>, substitute: &mut S, original: F) -> R
    where
        S: Substitute<R>,
        F: FnOnce() -> R,
    {
        if is_in_intercept() {
            warn!(
                pid = std::process::id(),
                method = %self.method,
                "RECURSION DETECTED: {} called while already intercepting",
                id.unwrap_or(&self.method)
            );
            return original();
        }

        let fire_before = guarded(|| {
            self.record_call();
            self.log_entry(id, None);
            self.should_fire_tagged(FireLocation::BEFORE, id)
        });
        if fire_before {
            substitute.before(self);
        }

        let mut result = if guarded(|| self.should_fire_tagged(FireLocation::SKIP_ORIGINAL, id)) {
            substitute.skip(self)
        } else {
            original()
        };

        if guarded(|| self.should_fire_tagged(FireLocation::AFTER, id)) {
            result = substitute.after(self, result);
        }

        substitute.finish(self);
        guarded(|| self.log_exit(id, None));
        result
    }
}
