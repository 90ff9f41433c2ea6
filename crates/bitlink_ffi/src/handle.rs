use std::fmt;
use std::path::Path;

use crate::error::OpenError;
use crate::native::NativeHandle;

/// Handle returned by `open`.
///
/// A bridge handle carries nothing but the library name: compiled state belongs to
/// the execution context, not to the handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LibraryHandle {
    Native(NativeHandle),
    Bridge(String),
}

impl LibraryHandle {
    pub fn is_native(&self) -> bool {
        matches!(self, LibraryHandle::Native(_))
    }

    pub fn bridge_library(&self) -> Option<&str> {
        match self {
            LibraryHandle::Bridge(name) => Some(name),
            LibraryHandle::Native(_) => None,
        }
    }
}

impl fmt::Display for LibraryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryHandle::Native(handle) => write!(f, "native:{}", handle.id()),
            LibraryHandle::Bridge(name) => write!(f, "bridge:{name}"),
        }
    }
}

/// Base name of a library: its file name without the last extension.
pub fn library_name(path: &Path) -> Result<String, OpenError> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
        .ok_or_else(|| OpenError::InvalidPath {
            path: path.to_path_buf(),
        })
}
