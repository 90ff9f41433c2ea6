//! Library loading for the bridge.
//!
//! A library file may carry bitcode modules next to its native code. The
//! [`ModuleLoader`] extracts those modules and registers their exports in the
//! calling context's symbol table; libraries without bitcode, or not enabled for
//! bitcode dispatch, go through a [`NativeBackend`] instead.

pub mod container;
pub mod error;
pub mod handle;
pub mod loader;
pub mod native;

pub use container::{ContainerWriter, MAGIC, encode_module, extract_modules, parse_modules};
pub use error::{ContainerError, LoadError, OpenError};
pub use handle::{LibraryHandle, library_name};
pub use loader::ModuleLoader;
pub use native::{
    DynamicLibrary, LibloadingBackend, MAX_NATIVE_ARGS, NativeAddress, NativeBackend,
    NativeHandle,
};
