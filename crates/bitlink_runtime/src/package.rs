//! Package loading: a per-context list of opened libraries with their init hooks.

use std::path::Path;

use bitlink_ffi::library_name;
use bitlink_symbol::Value;
use tracing::{debug, info};

use crate::bridge::Bridge;
use crate::context::{ExecutionContext, LoadedLibrary};
use crate::dispatch::{CallInfo, SymbolRef};
use crate::error::BridgeError;

impl Bridge {
    /// Open the library at `path` and run its initialization entry point.
    ///
    /// A path already loaded in `ctx` is returned as is. The entry point receives the
    /// library name, except on the native path which takes no arguments.
    pub fn load_package(
        &self,
        ctx: &ExecutionContext,
        path: &Path,
        local: bool,
        now: bool,
    ) -> Result<LoadedLibrary, BridgeError> {
        ctx.ensure_live()?;
        if let Some(existing) = ctx.find_library_by_path(path) {
            debug!(library = %existing.name, "package already loaded");
            return Ok(existing);
        }

        let library = LoadedLibrary {
            name: library_name(path)?,
            path: path.to_path_buf(),
            handle: self.dlopen(ctx, path, local, now)?,
        };
        let raced = {
            let mut loaded = ctx.loaded().write();
            match loaded.iter().find(|lib| lib.path == path) {
                Some(existing) => Some(existing.clone()),
                None => {
                    loaded.push(library.clone());
                    None
                }
            }
        };
        if let Some(existing) = raced {
            debug!(library = %existing.name, "package loaded concurrently");
            self.dlclose(&library.handle);
            return Ok(existing);
        }

        if let Err(err) = self.run_init(ctx, &library) {
            ctx.loaded().write().retain(|lib| lib.path != library.path);
            self.dlclose(&library.handle);
            return Err(BridgeError::PackageInit {
                library: library.name,
                source: Box::new(err),
            });
        }

        info!(library = %library.name, handle = %library.handle, context = %ctx.id(), "package loaded");
        Ok(library)
    }

    fn run_init(&self, ctx: &ExecutionContext, library: &LoadedLibrary) -> Result<(), BridgeError> {
        let init = self.config.init_symbol_for(&library.name);
        let Some(symbol) = self.dlsym(ctx, &library.handle, &init)? else {
            debug!(library = %library.name, "no init entry point");
            return Ok(());
        };
        let args = if symbol.is_native() {
            Vec::new()
        } else {
            vec![Value::Str(library.name.clone())]
        };
        self.invoke_void(ctx, &CallInfo::from(symbol), &args)
    }

    /// Close the package loaded from `path` and forget it. A fork only forgets the
    /// packages it inherited; their handles stay with the parent.
    pub fn unload_package(&self, ctx: &ExecutionContext, path: &Path) -> Result<(), BridgeError> {
        let library = {
            let mut loaded = ctx.loaded().write();
            let index = loaded
                .iter()
                .position(|lib| lib.path == path)
                .ok_or_else(|| BridgeError::NotLoaded {
                    path: path.to_path_buf(),
                })?;
            loaded.remove(index)
        };

        if ctx.forget_inherited(&library.path) {
            debug!(library = %library.name, context = %ctx.id(), "forgot inherited package");
            return Ok(());
        }
        let status = self.dlclose(&library.handle);
        if status != 0 {
            return Err(BridgeError::CloseFailed {
                library: library.name,
                status,
            });
        }
        info!(library = %library.name, context = %ctx.id(), "package unloaded");
        Ok(())
    }

    pub fn loaded_libraries(&self, ctx: &ExecutionContext) -> Vec<LoadedLibrary> {
        ctx.loaded_libraries()
    }

    pub fn find_library(&self, ctx: &ExecutionContext, name: &str) -> Option<LoadedLibrary> {
        ctx.find_library(name)
    }

    /// Look `name` up in the loaded library called `library`, or in every loaded
    /// library in load order when `library` is `None`.
    pub fn find_symbol(
        &self,
        ctx: &ExecutionContext,
        name: &str,
        library: Option<&str>,
    ) -> Result<Option<SymbolRef>, BridgeError> {
        Ok(self
            .find_symbol_with_library(ctx, name, library)?
            .map(|(_, symbol)| symbol))
    }

    pub fn find_library_containing_symbol(
        &self,
        ctx: &ExecutionContext,
        name: &str,
    ) -> Result<Option<LoadedLibrary>, BridgeError> {
        Ok(self
            .find_symbol_with_library(ctx, name, None)?
            .map(|(library, _)| library))
    }

    fn find_symbol_with_library(
        &self,
        ctx: &ExecutionContext,
        name: &str,
        library: Option<&str>,
    ) -> Result<Option<(LoadedLibrary, SymbolRef)>, BridgeError> {
        let candidates = ctx
            .loaded_libraries()
            .into_iter()
            .filter(|lib| library.is_none_or(|wanted| lib.name == wanted));
        for candidate in candidates {
            if let Some(symbol) = self.dlsym(ctx, &candidate.handle, name)? {
                return Ok(Some((candidate, symbol)));
            }
        }
        Ok(None)
    }
}
