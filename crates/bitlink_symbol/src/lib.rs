//! Shared vocabulary of the bridge: bitcode modules, the values that cross the
//! host boundary, callable units and the per-context symbol table.

pub mod context;
pub mod module;
pub mod table;
pub mod unit;
pub mod value;

pub use context::ContextId;
pub use module::{IrKind, Module};
pub use table::{SymbolEntry, SymbolError, SymbolTable};
pub use unit::{CallError, CallableUnit};
pub use value::{ObjectRef, Value, ValueKind};
