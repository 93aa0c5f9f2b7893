//! runtime interception stubs for functions in prebuilt shared libraries
//!
//! a generated entry wrapper per hooked function consults its [`Interceptor`]
//! on every call: the interceptor counts calls, decides whether the test's
//! substitute fires before or after the original (or replaces it), and logs
//! each step. interceptors live in a [`StubRegistry`] that caches the opened
//! libraries and resets all firing state between test cases.

// lets the wrapper macro name this crate by path from inside it
extern crate self as hook_stub;

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod init;
pub mod interceptor;
pub mod registry;
pub mod resolver;
pub mod state;
pub mod substitute;
pub mod types;

#[cfg(test)]
mod test_support;

pub fn version_info() -> String {
    format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

// re-export key types and functions for external use
pub use config::{ArmDirective, EnvConfig};
pub use error::{Result, StubError};
pub use hook_stub_macros::hook_stub;
pub use init::{init_hook_stub, init_tracing, teardown_hook_stub};
pub use interceptor::{Interceptor, InterceptorSnapshot};
pub use registry::{global, StubRegistry};
pub use resolver::{LibraryCache, RawSymbol, SymbolTable};
pub use state::IgnitionState;
pub use substitute::{Substitute, SubstituteFn};
pub use types::{FireLocation, HookEntry, HookTable, Ignition};
