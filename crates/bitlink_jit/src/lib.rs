//! Lazy compilation of bitcode modules.
//!
//! Modules are compiled on first need by an external [`CompileService`]; the
//! [`LazyCompiler`] walks the import graph so that a compiled symbol is immediately
//! callable, and the [`CompilationProfiler`] records what each compilation cost.

pub mod compiler;
pub mod error;
pub mod profiler;
pub mod service;

pub use compiler::LazyCompiler;
pub use error::{CompileError, JitError};
pub use profiler::{CompilationEvent, CompilationProfiler, ModuleCompilationStats};
pub use service::CompileService;
