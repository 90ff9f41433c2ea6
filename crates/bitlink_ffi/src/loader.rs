use std::path::Path;
use std::sync::Arc;

use bitlink_config::{BITCODE_LIBS_ENV, BridgeConfig};
use bitlink_symbol::{Module, SymbolError, SymbolTable};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::container::extract_modules;
use crate::error::LoadError;
use crate::handle::{LibraryHandle, library_name};
use crate::native::NativeBackend;

/// Opens libraries, choosing between bitcode registration and native loading.
///
/// The loader itself holds no per-context state; the symbol table to populate is
/// passed in by the caller. The only thing it remembers is the base library's module
/// list, which every new context needs re-registered.
pub struct ModuleLoader {
    config: BridgeConfig,
    native: Arc<dyn NativeBackend>,
    base_modules: RwLock<Option<Vec<Arc<Module>>>>,
}

impl ModuleLoader {
    pub fn new(config: BridgeConfig, native: Arc<dyn NativeBackend>) -> Self {
        if !config.is_configured() {
            warn!(
                "{BITCODE_LIBS_ENV} is unset, every library will be loaded natively"
            );
        }
        Self {
            config,
            native,
            base_modules: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn native(&self) -> &Arc<dyn NativeBackend> {
        &self.native
    }

    /// Open the library at `path` on behalf of the context owning `table`.
    ///
    /// Bitcode extraction problems are not errors: the library is then loaded
    /// natively. Only a failing native load, or an export clashing with one already
    /// registered in `table`, is reported.
    pub fn open(
        &self,
        table: &SymbolTable,
        path: &Path,
        local: bool,
        now: bool,
    ) -> Result<LibraryHandle, LoadError> {
        let name = library_name(path)?;
        let enabled = self.config.is_bitcode_enabled(&name);
        let modules = if self.wants_bitcode(&name) {
            self.extract(&name, path)
        } else {
            None
        };

        if name == self.config.base_library {
            if let Some(modules) = &modules {
                *self.base_modules.write() = Some(modules.clone());
                // The base library is needed in bitcode form even when it is
                // otherwise loaded natively.
                if !enabled {
                    self.register(table, &name, modules)?;
                }
            }
        }

        match modules {
            Some(modules) if enabled => {
                self.register(table, &name, &modules)?;
                Ok(LibraryHandle::Bridge(name))
            }
            _ => {
                debug!(library = %name, "loading natively");
                let handle = self.native.dlopen(path, local, now)?;
                Ok(LibraryHandle::Native(handle))
            }
        }
    }

    /// Only enabled libraries and the base library are scanned for bitcode.
    fn wants_bitcode(&self, name: &str) -> bool {
        self.config.is_bitcode_enabled(name) || name == self.config.base_library
    }

    fn extract(&self, name: &str, path: &Path) -> Option<Vec<Arc<Module>>> {
        match extract_modules(path) {
            Ok(modules) if modules.is_empty() => None,
            Ok(modules) => Some(modules.into_iter().map(Arc::new).collect()),
            Err(err) => {
                debug!(library = %name, error = %err, "no usable bitcode");
                None
            }
        }
    }

    fn register(
        &self,
        table: &SymbolTable,
        library: &str,
        modules: &[Arc<Module>],
    ) -> Result<usize, SymbolError> {
        if table.has_library(library) {
            debug!(library, context = %table.context(), "library already registered");
            return Ok(0);
        }
        let count = table.register_modules(library, modules)?;
        info!(
            library,
            context = %table.context(),
            modules = modules.len(),
            symbols = count,
            "registered bitcode library"
        );
        Ok(count)
    }

    /// Base library modules cached by the last `open` of the base library.
    pub fn base_modules(&self) -> Vec<Arc<Module>> {
        self.base_modules.read().clone().unwrap_or_default()
    }

    /// Re-register the cached base library into a fresh table, without touching the
    /// library file again.
    pub fn register_base(&self, table: &SymbolTable) -> Result<usize, SymbolError> {
        let modules = self.base_modules();
        if modules.is_empty() {
            return Ok(0);
        }
        self.register(table, &self.config.base_library, &modules)
    }
}
