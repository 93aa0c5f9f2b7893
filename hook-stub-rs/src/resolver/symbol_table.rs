use libc::c_void;
use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::ptr::NonNull;
use tracing::debug;

/// address of a resolved symbol inside an opened library
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawSymbol(NonNull<c_void>);

impl RawSymbol {
    pub fn new(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }

    /// reinterpret the address as a function pointer
    ///
    /// # Safety
    /// `F` must be a function pointer type matching the real signature of the
    /// symbol, and the owning library must still be loaded when it is called.
    pub unsafe fn cast<F: Copy>(self) -> F {
        assert_eq!(
            mem::size_of::<F>(),
            mem::size_of::<*mut c_void>(),
            "symbol cast target must be pointer sized"
        );
        mem::transmute_copy(&self.0.as_ptr())
    }
}

// safety: the address is immutable and the library stays loaded until teardown
unsafe impl Send for RawSymbol {}
unsafe impl Sync for RawSymbol {}

impl fmt::Debug for RawSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:p}", self.0.as_ptr())
    }
}

impl fmt::Pointer for RawSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.0.as_ptr(), f)
    }
}

/// mangled symbol name to address, owned by a single interceptor
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, RawSymbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// later entries for the same symbol replace earlier ones
    pub fn insert(&mut self, symbol: &str, address: RawSymbol) {
        if let Some(previous) = self.symbols.insert(symbol.to_string(), address) {
            debug!(symbol, ?previous, replacement = ?address, "symbol resolved twice, keeping latest");
        }
    }

    pub fn get(&self, symbol: &str) -> Option<RawSymbol> {
        self.symbols.get(symbol).copied()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(String::as_str)
    }
}
