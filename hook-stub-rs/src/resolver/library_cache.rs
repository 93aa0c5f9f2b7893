use libc::c_void;
use libloading::os::unix::{Library, RTLD_NOW};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use super::symbol_table::{RawSymbol, SymbolTable};
use crate::error::{Result, StubError};
use crate::types::HookTable;

/// every distinct library opened on behalf of a registry
///
/// a library is opened at most once; the cache lock is held across
/// open and resolve so concurrent first use cannot open it twice.
#[derive(Debug, Default)]
pub struct LibraryCache {
    libraries: Mutex<BTreeMap<String, Library>>,
    opens: AtomicUsize,
}

impl LibraryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Library>> {
        self.libraries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// open every library the table names and resolve each of its symbols
    pub fn resolve_table(&self, table: &HookTable) -> Result<SymbolTable> {
        let mut libraries = self.lock();
        let mut symbols = SymbolTable::new();

        debug!(pid = std::process::id(), entries = table.len(), "resolving hook table");

        for entry in table {
            if !libraries.contains_key(&entry.library) {
                let library = self.open(&entry.library)?;
                libraries.insert(entry.library.clone(), library);
            }
            let library = &libraries[&entry.library];
            let address = match resolve_symbol(library, &entry.library, &entry.symbol) {
                Ok(address) => address,
                Err(e) => {
                    warn!(
                        pid = std::process::id(),
                        library = %entry.library,
                        symbol = %entry.symbol,
                        error = %e,
                        "dlsym failed"
                    );
                    return Err(e);
                }
            };

            info!(
                pid = std::process::id(),
                library = %entry.library,
                symbol = %entry.symbol,
                method = entry.display_name(),
                address = ?address,
                "dlsym"
            );
            symbols.insert(&entry.symbol, address);
        }

        Ok(symbols)
    }

    fn open(&self, name: &str) -> Result<Library> {
        info!(pid = std::process::id(), library = name, "dlopen");

        // safety: loading runs the library's initialisers, which is the point
        let library = unsafe { Library::open(Some(name), RTLD_NOW) }.map_err(|source| {
            warn!(pid = std::process::id(), library = name, error = %source, "dlopen failed");
            StubError::LibraryOpen {
                library: name.to_string(),
                source,
            }
        })?;

        self.opens.fetch_add(1, Ordering::Relaxed);
        info!(
            pid = std::process::id(),
            library = name,
            handle = ?library,
            "dlopen succeeded"
        );
        Ok(library)
    }

    /// how many times a library was actually opened
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::Relaxed)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// close every cached handle once; failures are logged and skipped
    ///
    /// returns the number of handles closed successfully. addresses resolved
    /// from these libraries are dangling afterwards.
    pub fn close_all(&self) -> usize {
        let libraries = std::mem::take(&mut *self.lock());
        if libraries.is_empty() {
            return 0;
        }

        debug!(pid = std::process::id(), count = libraries.len(), "closing cached libraries");

        let mut closed = 0;
        for (name, library) in libraries {
            match library.close() {
                Ok(()) => {
                    debug!(pid = std::process::id(), library = %name, "dlclose");
                    closed += 1;
                }
                Err(e) => {
                    warn!(pid = std::process::id(), library = %name, error = %e, "dlclose failed");
                }
            }
        }
        closed
    }
}

fn resolve_symbol(library: &Library, library_name: &str, symbol: &str) -> Result<RawSymbol> {
    // safety: the address is only reinterpreted by callers that know its signature
    let raw = unsafe { library.get::<*mut c_void>(symbol.as_bytes()) }
        .map_err(|source| StubError::SymbolResolve {
            library: library_name.to_string(),
            symbol: symbol.to_string(),
            source,
        })?
        .into_raw();

    RawSymbol::new(raw).ok_or_else(|| StubError::NullSymbol {
        library: library_name.to_string(),
        symbol: symbol.to_string(),
    })
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use crate::hook_table;
    use crate::test_support::capture_logs;

    #[test]
    fn shared_library_is_opened_once() {
        let cache = LibraryCache::new();
        let first = cache.resolve_table(&hook_table![("libc.so.6", "abs")]).unwrap();
        let second = cache
            .resolve_table(&hook_table![("libc.so.6", "labs"), ("libc.so.6", "abs")])
            .unwrap();

        assert_eq!(cache.open_count(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(first.get("abs"), second.get("abs"));
        assert!(second.get("labs").is_some());
    }

    #[test]
    fn distinct_libraries_each_open_once() {
        let cache = LibraryCache::new();
        cache
            .resolve_table(&hook_table![
                ("libc.so.6", "abs"),
                ("libm.so.6", "cos"),
                ("libc.so.6", "labs"),
                ("libm.so.6", "sin"),
            ])
            .unwrap();
        assert_eq!(cache.open_count(), 2);
        assert!(cache.contains("libm.so.6"));
    }

    #[test]
    fn every_attempt_leaves_a_trace_line() {
        let cache = LibraryCache::new();
        let (result, logs) = capture_logs(|| {
            cache.resolve_table(&hook_table![("libc.so.6", "abs"), ("libc.so.6", "hook_stub_absent")])
        });
        assert!(result.is_err());
        assert!(logs.contains("dlopen succeeded"));
        assert!(logs.contains("INFO") && logs.contains("symbol=abs"));
        assert!(logs.contains("address="));
        assert!(logs.contains("dlsym failed") && logs.contains("symbol=hook_stub_absent"));
    }

    #[test]
    fn missing_library_is_reported() {
        let cache = LibraryCache::new();
        let err = cache
            .resolve_table(&hook_table![("libhook-stub-missing.so", "foo")])
            .unwrap_err();
        assert!(matches!(err, StubError::LibraryOpen { ref library, .. } if library == "libhook-stub-missing.so"));
        assert!(err.is_environment());
        assert_eq!(cache.open_count(), 0);
    }

    #[test]
    fn missing_symbol_is_reported() {
        let cache = LibraryCache::new();
        let err = cache
            .resolve_table(&hook_table![("libc.so.6", "hook_stub_no_such_symbol")])
            .unwrap_err();
        assert!(matches!(err, StubError::SymbolResolve { ref symbol, .. } if symbol == "hook_stub_no_such_symbol"));
        // the library stays cached even though resolution failed
        assert!(cache.contains("libc.so.6"));
    }

    #[test]
    fn close_all_drains_cache() {
        let cache = LibraryCache::new();
        cache.resolve_table(&hook_table![("libm.so.6", "cos")]).unwrap();
        assert_eq!(cache.close_all(), 1);
        assert!(cache.is_empty());
        assert_eq!(cache.close_all(), 0);
    }
}
