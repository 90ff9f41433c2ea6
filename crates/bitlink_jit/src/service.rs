use std::sync::Arc;

use bitlink_symbol::{CallableUnit, ContextId, Module};

use crate::error::CompileError;

/// Turns a module's IR payload into a callable unit.
///
/// Compilation is expensive; the bridge calls this at most once per module and
/// context. The returned unit must only be used from `context`.
pub trait CompileService: Send + Sync {
    fn compile(
        &self,
        context: ContextId,
        module: &Module,
    ) -> Result<Arc<dyn CallableUnit>, CompileError>;
}
