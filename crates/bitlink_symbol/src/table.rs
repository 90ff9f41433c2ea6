use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use thiserror::Error;

use crate::context::ContextId;
use crate::module::Module;
use crate::unit::CallableUnit;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolError {
    /// Two modules claim the same exported name in one context.
    #[error("symbol `{symbol}` from `{library}` is already registered by `{existing}`")]
    DuplicateSymbol {
        symbol: String,
        library: String,
        existing: String,
    },
}

/// Compile state of one module inside one context.
///
/// Every exported name of the module maps to the same entry, so compilation happens
/// at module granularity. The cell doubles as the per (context, module) compile lock:
/// the first caller runs the compile, concurrent callers block until it finishes and
/// callers arriving afterwards see the unit without waiting.
pub struct SymbolEntry {
    library: String,
    module: Arc<Module>,
    unit: OnceCell<Arc<dyn CallableUnit>>,
}

impl SymbolEntry {
    pub fn new(library: impl Into<String>, module: Arc<Module>) -> Self {
        Self {
            library: library.into(),
            module,
            unit: OnceCell::new(),
        }
    }

    pub fn library(&self) -> &str {
        &self.library
    }

    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    pub fn is_compiled(&self) -> bool {
        self.unit.get().is_some()
    }

    pub fn unit(&self) -> Option<Arc<dyn CallableUnit>> {
        self.unit.get().cloned()
    }

    /// Return the compiled unit, running `compile` if no unit exists yet.
    ///
    /// The boolean is `true` only for the caller whose `compile` produced the unit.
    /// A failed compile leaves the entry uncompiled.
    pub fn get_or_compile<E, F>(&self, compile: F) -> Result<(Arc<dyn CallableUnit>, bool), E>
    where
        F: FnOnce(&Module) -> Result<Arc<dyn CallableUnit>, E>,
    {
        if let Some(unit) = self.unit.get() {
            return Ok((Arc::clone(unit), false));
        }

        let mut performed = false;
        let unit = self.unit.get_or_try_init(|| {
            performed = true;
            compile(&self.module)
        })?;
        Ok((Arc::clone(unit), performed))
    }
}

impl fmt::Debug for SymbolEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolEntry")
            .field("library", &self.library)
            .field("module", &self.module.name())
            .field("compiled", &self.is_compiled())
            .finish()
    }
}

/// Exported name to [`SymbolEntry`] mapping owned by a single execution context.
pub struct SymbolTable {
    context: ContextId,
    entries: RwLock<AHashMap<String, Arc<SymbolEntry>>>,
}

impl SymbolTable {
    pub fn new(context: ContextId) -> Self {
        Self {
            context,
            entries: RwLock::new(AHashMap::new()),
        }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Register every export of `module` under `library`.
    ///
    /// Either all names are inserted or, on a clash, none are.
    pub fn register_module(
        &self,
        library: &str,
        module: Arc<Module>,
    ) -> Result<Arc<SymbolEntry>, SymbolError> {
        let entry = Arc::new(SymbolEntry::new(library, module));
        self.insert_entry(&entry)?;
        Ok(entry)
    }

    /// Register a set of modules, returning the number of names added.
    pub fn register_modules(
        &self,
        library: &str,
        modules: &[Arc<Module>],
    ) -> Result<usize, SymbolError> {
        let mut count = 0;
        for module in modules {
            count += module.exports().len();
            self.register_module(library, Arc::clone(module))?;
        }
        Ok(count)
    }

    fn insert_entry(&self, entry: &Arc<SymbolEntry>) -> Result<(), SymbolError> {
        let mut guard = self.entries.write();
        let mut seen = HashSet::new();
        for export in entry.module.exports() {
            let existing = guard
                .get(export)
                .map(|existing| existing.library.clone())
                .or_else(|| (!seen.insert(export.as_str())).then(|| entry.library.clone()));
            if let Some(existing) = existing {
                return Err(SymbolError::DuplicateSymbol {
                    symbol: export.clone(),
                    library: entry.library.clone(),
                    existing,
                });
            }
        }
        for export in entry.module.exports() {
            guard.insert(export.clone(), Arc::clone(entry));
        }
        Ok(())
    }

    /// Register fresh, uncompiled entries for every module of `parent` whose library
    /// is not `skip_library`. Module payloads are shared, compile state is not.
    pub fn adopt_uncompiled(
        &self,
        parent: &SymbolTable,
        skip_library: &str,
    ) -> Result<usize, SymbolError> {
        let mut adopted = 0;
        for entry in parent.distinct_entries() {
            if entry.library == skip_library {
                continue;
            }
            self.register_module(&entry.library, Arc::clone(&entry.module))?;
            adopted += 1;
        }
        Ok(adopted)
    }

    pub fn get(&self, name: &str) -> Option<Arc<SymbolEntry>> {
        self.entries.read().get(name).cloned()
    }

    /// Look `name` up with library-scoped visibility: a hit registered by another
    /// library is treated as absent.
    pub fn get_in_library(&self, library: &str, name: &str) -> Option<Arc<SymbolEntry>> {
        self.get(name).filter(|entry| entry.library == library)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// `None` when the name is unknown.
    pub fn is_compiled(&self, name: &str) -> Option<bool> {
        self.entries.read().get(name).map(|entry| entry.is_compiled())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// One entry per registered module, in name order of their first export.
    pub fn distinct_entries(&self) -> Vec<Arc<SymbolEntry>> {
        let guard = self.entries.read();
        let mut keys: Vec<&String> = guard.keys().collect();
        keys.sort();

        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for key in keys {
            let entry = &guard[key];
            if seen.insert(Arc::as_ptr(entry)) {
                entries.push(Arc::clone(entry));
            }
        }
        entries
    }

    pub fn has_library(&self, library: &str) -> bool {
        self.entries
            .read()
            .values()
            .any(|entry| entry.library == library)
    }

    /// Number of distinct modules that have been compiled in this context.
    pub fn compiled_module_count(&self) -> usize {
        self.distinct_entries()
            .iter()
            .filter(|entry| entry.is_compiled())
            .count()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolTable")
            .field("context", &self.context)
            .field("symbols", &self.len())
            .finish()
    }
}
