//! library handle cache and per-interceptor symbol tables

pub mod library_cache;
pub mod symbol_table;

pub use library_cache::LibraryCache;
pub use symbol_table::{RawSymbol, SymbolTable};
