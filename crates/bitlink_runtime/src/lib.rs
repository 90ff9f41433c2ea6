//! Host-facing side of the bridge: execution contexts, call dispatch and the
//! `dlopen`/`dlsym`/`dlclose` emulation over native and compiled libraries.

pub mod bridge;
pub mod context;
pub mod dispatch;
pub mod dll;
pub mod error;
pub mod globals;
pub mod lifecycle;
pub mod package;

pub use bridge::Bridge;
pub use context::{ContextKind, ExecutionContext, LoadedLibrary};
pub use dispatch::{CallAddress, CallInfo, CallSite, CallTarget, Dispatcher, SymbolRef};
pub use error::BridgeError;
pub use globals::{GlobalValues, INITVAR_DOUBLE, INITVAR_INT, INITVAR_OBJ};
pub use lifecycle::ContextManager;

pub use bitlink_config::BridgeConfig;
pub use bitlink_ffi::{LibraryHandle, NativeAddress, NativeBackend, NativeHandle};
pub use bitlink_jit::{CompileError, CompileService};
pub use bitlink_symbol::{CallError, CallableUnit, ContextId, Module, Value};
