use std::sync::Arc;

use bitlink_ffi::{LibraryHandle, ModuleLoader, NativeBackend};
use tracing::{info, warn};

use crate::context::ExecutionContext;
use crate::error::BridgeError;

/// Sets up and tears down the per-context state of the bridge.
pub struct ContextManager {
    loader: Arc<ModuleLoader>,
    native: Arc<dyn NativeBackend>,
}

impl ContextManager {
    pub fn new(loader: Arc<ModuleLoader>, native: Arc<dyn NativeBackend>) -> Self {
        Self { loader, native }
    }

    /// Populate the symbol table of a new context.
    ///
    /// The base library is re-registered from the loader's cache. A fork additionally
    /// receives uncompiled registrations for every other library its parent holds.
    pub fn on_context_created(
        &self,
        ctx: &ExecutionContext,
        parent: Option<&ExecutionContext>,
    ) -> Result<(), BridgeError> {
        let table = ctx.table();
        let base = self.loader.config().base_library.as_str();
        let base_symbols = self.loader.register_base(table)?;

        let adopted = match parent {
            Some(parent) => {
                // Without a cached base, the parent's base registrations are all a
                // fork can get.
                let skip = if table.has_library(base) { base } else { "" };
                table.adopt_uncompiled(parent.table(), skip)?
            }
            None => 0,
        };

        info!(
            context = %ctx.id(),
            kind = ?ctx.kind(),
            base_symbols,
            adopted_modules = adopted,
            "context created"
        );
        Ok(())
    }

    /// Drop everything `ctx` owns and close the native libraries it opened itself.
    /// Call sites still caching its targets re-resolve on their next use.
    pub fn on_context_destroyed(&self, ctx: &ExecutionContext) {
        if !ctx.retire() {
            return;
        }

        let libraries = std::mem::take(&mut *ctx.loaded().write());
        for library in libraries {
            if ctx.is_inherited(&library.path) {
                continue;
            }
            if let LibraryHandle::Native(handle) = library.handle {
                let status = self.native.dlclose(handle);
                if status != 0 {
                    warn!(library = %library.name, status, "failed to close library");
                }
            }
        }

        let symbols = ctx.table().len();
        ctx.table().clear();
        info!(context = %ctx.id(), symbols, "context destroyed");
    }
}
