//! `dlopen`/`dlsym`/`dlclose` over both backends.

use std::path::Path;

use bitlink_ffi::LibraryHandle;
use tracing::debug;

use crate::bridge::Bridge;
use crate::context::ExecutionContext;
use crate::dispatch::{CallAddress, SymbolRef};
use crate::error::BridgeError;

impl Bridge {
    pub fn dlopen(
        &self,
        ctx: &ExecutionContext,
        path: &Path,
        local: bool,
        now: bool,
    ) -> Result<LibraryHandle, BridgeError> {
        ctx.ensure_live()?;
        let handle = self.loader.open(ctx.table(), path, local, now)?;
        debug!(path = %path.display(), %handle, context = %ctx.id(), "opened");
        Ok(handle)
    }

    /// Resolve `name` in the library behind `handle`.
    ///
    /// Bridge handles only see symbols registered by their own library, and a hit is
    /// compiled before returning so the result can be invoked right away.
    pub fn dlsym(
        &self,
        ctx: &ExecutionContext,
        handle: &LibraryHandle,
        name: &str,
    ) -> Result<Option<SymbolRef>, BridgeError> {
        ctx.ensure_live()?;
        match handle {
            LibraryHandle::Bridge(library) => {
                let table = ctx.table();
                if table.get_in_library(library, name).is_none() {
                    return Ok(None);
                }
                self.compiler
                    .ensure_compiled(table, name, true)
                    .map_err(|err| BridgeError::from_jit(library, err))?;
                Ok(Some(SymbolRef {
                    library: library.clone(),
                    name: name.to_string(),
                    address: CallAddress::Bitcode,
                }))
            }
            LibraryHandle::Native(native) => {
                let Some(address) = self.native.dlsym(*native, name) else {
                    return Ok(None);
                };
                let library = ctx
                    .library_name_for(handle)
                    .unwrap_or_else(|| handle.to_string());
                Ok(Some(SymbolRef {
                    library,
                    name: name.to_string(),
                    address: CallAddress::Native(address),
                }))
            }
        }
    }

    /// Compiled state outlives bridge handles, so closing one does nothing.
    pub fn dlclose(&self, handle: &LibraryHandle) -> i32 {
        match handle {
            LibraryHandle::Bridge(_) => 0,
            LibraryHandle::Native(native) => self.native.dlclose(*native),
        }
    }
}
