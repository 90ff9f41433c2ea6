use thiserror::Error;

/// Diagnostics reported by the compile service. The message is surfaced as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to compile module `{module}`: {message}")]
pub struct CompileError {
    pub module: String,
    pub message: String,
}

impl CompileError {
    pub fn new(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JitError {
    #[error("symbol `{symbol}` is not registered in this context")]
    MissingSymbol { symbol: String },

    #[error(transparent)]
    Compile(#[from] CompileError),
}
