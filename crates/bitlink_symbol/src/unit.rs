use thiserror::Error;

use crate::context::ContextId;
use crate::value::{Value, ValueKind};

/// Failure while invoking a resolved target.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    /// The callee itself failed or trapped.
    #[error("call to `{symbol}` failed: {message}")]
    Failed { symbol: String, message: String },

    #[error("`{symbol}` is not exported by module `{module}`")]
    UnknownSymbol { symbol: String, module: String },

    #[error("cannot pass {kind} argument {index} to native `{symbol}`")]
    Marshal {
        symbol: String,
        index: usize,
        kind: ValueKind,
    },

    #[error("native `{symbol}` called with {got} arguments, at most {max} are supported")]
    Arity {
        symbol: String,
        got: usize,
        max: usize,
    },

    #[error("no native code for `{symbol}` at address {address:#x}")]
    InvalidAddress { symbol: String, address: usize },
}

impl CallError {
    pub fn failed(symbol: impl Into<String>, message: impl Into<String>) -> Self {
        CallError::Failed {
            symbol: symbol.into(),
            message: message.into(),
        }
    }
}

/// The invocable artifact produced by compiling one module.
///
/// A unit is bound to the context that compiled it and must never be invoked from
/// another one.
pub trait CallableUnit: Send + Sync {
    /// Context the unit was compiled in.
    fn context(&self) -> ContextId;

    /// Name of the module the unit was compiled from.
    fn module_name(&self) -> &str;

    /// Invoke one of the module's exported functions.
    fn invoke(&self, symbol: &str, args: &[Value]) -> Result<Value, CallError>;
}
