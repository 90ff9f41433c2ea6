use std::path::PathBuf;

use bitlink_ffi::{LoadError, OpenError};
use bitlink_jit::{CompileError, JitError};
use bitlink_symbol::{CallError, ContextId, SymbolError};
use thiserror::Error;

/// Every failure the host API can report.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Open(#[from] OpenError),

    #[error(transparent)]
    DuplicateSymbol(#[from] SymbolError),

    #[error("symbol `{symbol}` is not available in `{library}`")]
    MissingSymbol { library: String, symbol: String },

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Call(#[from] CallError),

    #[error("initialization of `{library}` failed")]
    PackageInit {
        library: String,
        #[source]
        source: Box<BridgeError>,
    },

    #[error("no library loaded from {}", path.display())]
    NotLoaded { path: PathBuf },

    #[error("closing `{library}` failed with status {status}")]
    CloseFailed { library: String, status: i32 },

    #[error("execution context {context} has been destroyed")]
    ContextDestroyed { context: ContextId },
}

impl From<LoadError> for BridgeError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::Open(err) => BridgeError::Open(err),
            LoadError::Symbol(err) => BridgeError::DuplicateSymbol(err),
        }
    }
}

impl BridgeError {
    pub(crate) fn from_jit(library: &str, err: JitError) -> Self {
        match err {
            JitError::MissingSymbol { symbol } => BridgeError::MissingSymbol {
                library: library.to_string(),
                symbol,
            },
            JitError::Compile(err) => BridgeError::Compile(err),
        }
    }
}
