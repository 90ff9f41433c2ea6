use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use bitlink_ffi::LibraryHandle;
use bitlink_symbol::{ContextId, SymbolTable};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};

use crate::error::BridgeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// A context with its own symbol table and its own loaded libraries.
    Isolated,
    /// A read-only fork: starts with the parent's registrations and a copy of its
    /// loaded libraries, but compiles everything afresh. Libraries the fork loads
    /// itself stay invisible to the parent.
    Fork { parent: ContextId },
}

/// A library recorded by package loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedLibrary {
    pub name: String,
    pub path: PathBuf,
    pub handle: LibraryHandle,
}

/// The isolation boundary of the bridge.
///
/// A context owns exactly one symbol table; compiled units live in that table and
/// never leave it.
pub struct ExecutionContext {
    id: ContextId,
    kind: ContextKind,
    table: SymbolTable,
    loaded: RwLock<Vec<LoadedLibrary>>,
    /// Paths copied from the parent at fork time; their handles belong to the parent.
    inherited: Mutex<Vec<PathBuf>>,
    globals: OnceCell<()>,
    live: AtomicBool,
}

impl ExecutionContext {
    pub(crate) fn isolated() -> Self {
        let id = ContextId::next();
        Self {
            id,
            kind: ContextKind::Isolated,
            table: SymbolTable::new(id),
            loaded: RwLock::new(Vec::new()),
            inherited: Mutex::new(Vec::new()),
            globals: OnceCell::new(),
            live: AtomicBool::new(true),
        }
    }

    pub(crate) fn fork_of(parent: &ExecutionContext) -> Self {
        let id = ContextId::next();
        let loaded = parent.loaded_libraries();
        let inherited: Vec<PathBuf> = loaded.iter().map(|lib| lib.path.clone()).collect();
        Self {
            id,
            kind: ContextKind::Fork { parent: parent.id },
            table: SymbolTable::new(id),
            loaded: RwLock::new(loaded),
            inherited: Mutex::new(inherited),
            globals: OnceCell::new(),
            live: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    pub fn is_fork(&self) -> bool {
        matches!(self.kind, ContextKind::Fork { .. })
    }

    pub fn table(&self) -> &SymbolTable {
        &self.table
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_live(&self) -> Result<(), BridgeError> {
        if self.is_live() {
            Ok(())
        } else {
            Err(BridgeError::ContextDestroyed { context: self.id })
        }
    }

    /// Mark the context dead. Returns `false` if it already was.
    pub(crate) fn retire(&self) -> bool {
        self.live.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn globals(&self) -> &OnceCell<()> {
        &self.globals
    }

    pub(crate) fn loaded(&self) -> &RwLock<Vec<LoadedLibrary>> {
        &self.loaded
    }

    /// Whether the library at `path` was copied from the parent rather than opened
    /// by this context.
    pub fn is_inherited(&self, path: &Path) -> bool {
        self.inherited.lock().iter().any(|inherited| inherited == path)
    }

    /// Drop `path` from the inherited set, returning whether it was there. A later
    /// load of the same path is then owned by this context.
    pub(crate) fn forget_inherited(&self, path: &Path) -> bool {
        let mut inherited = self.inherited.lock();
        let before = inherited.len();
        inherited.retain(|inherited| inherited != path);
        inherited.len() != before
    }

    pub fn loaded_libraries(&self) -> Vec<LoadedLibrary> {
        self.loaded.read().clone()
    }

    pub fn find_library(&self, name: &str) -> Option<LoadedLibrary> {
        self.loaded.read().iter().find(|lib| lib.name == name).cloned()
    }

    pub fn find_library_by_path(&self, path: &Path) -> Option<LoadedLibrary> {
        self.loaded.read().iter().find(|lib| lib.path == path).cloned()
    }

    /// Name of the loaded library behind `handle`, if package loading recorded it.
    pub fn library_name_for(&self, handle: &LibraryHandle) -> Option<String> {
        if let Some(name) = handle.bridge_library() {
            return Some(name.to_string());
        }
        self.loaded
            .read()
            .iter()
            .find(|lib| &lib.handle == handle)
            .map(|lib| lib.name.clone())
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("symbols", &self.table.len())
            .field("live", &self.is_live())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitlink_ffi::NativeHandle;

    #[test]
    fn test_fork_copies_loaded_list_but_not_table() {
        let parent = ExecutionContext::isolated();
        parent.loaded().write().push(LoadedLibrary {
            name: "libFoo".into(),
            path: PathBuf::from("/lib/libFoo.so"),
            handle: LibraryHandle::Native(NativeHandle::new(4)),
        });

        let fork = ExecutionContext::fork_of(&parent);
        assert_ne!(fork.id(), parent.id());
        assert_eq!(fork.kind(), ContextKind::Fork { parent: parent.id() });
        assert_eq!(fork.table().context(), fork.id());
        assert!(fork.find_library("libFoo").is_some());
        assert!(fork.is_inherited(Path::new("/lib/libFoo.so")));
        assert!(!parent.is_inherited(Path::new("/lib/libFoo.so")));
        assert_eq!(
            fork.library_name_for(&LibraryHandle::Native(NativeHandle::new(4))),
            Some("libFoo".to_string())
        );

        fork.loaded().write().push(LoadedLibrary {
            name: "libBar".into(),
            path: PathBuf::from("/lib/libBar.so"),
            handle: LibraryHandle::Native(NativeHandle::new(5)),
        });
        assert!(fork.find_library_by_path(Path::new("/lib/libBar.so")).is_some());
        assert!(parent.find_library("libBar").is_none());
        assert_eq!(parent.loaded_libraries().len(), 1);
    }

    #[test]
    fn test_retire() {
        let ctx = ExecutionContext::isolated();
        assert!(ctx.ensure_live().is_ok());
        assert!(ctx.retire());
        assert!(!ctx.retire());
        assert!(matches!(
            ctx.ensure_live(),
            Err(BridgeError::ContextDestroyed { .. })
        ));
    }
}
