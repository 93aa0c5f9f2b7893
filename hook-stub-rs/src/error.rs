use thiserror::Error;

/// failures surfaced while preparing or configuring interceptors
#[derive(Debug, Error)]
pub enum StubError {
    #[error("failed to open library {library}: {source}")]
    LibraryOpen {
        library: String,
        #[source]
        source: libloading::Error,
    },

    #[error("failed to resolve {symbol} in {library}: {source}")]
    SymbolResolve {
        library: String,
        symbol: String,
        #[source]
        source: libloading::Error,
    },

    #[error("{symbol} in {library} resolved to a null address")]
    NullSymbol { library: String, symbol: String },

    #[error("{symbol} is not in the hook table of {method}")]
    UnknownSymbol { method: String, symbol: String },

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid directive `{directive}`: {reason}")]
    InvalidDirective { directive: String, reason: String },
}

impl StubError {
    /// environment failures are the ones the fatal policy applies to
    pub fn is_environment(&self) -> bool {
        matches!(
            self,
            Self::LibraryOpen { .. } | Self::SymbolResolve { .. } | Self::NullSymbol { .. }
        )
    }
}

pub type Result<T, E = StubError> = std::result::Result<T, E>;
