//! Per-context initialization of the base library's global variables.
//!
//! The host provides initial values for a fixed set of numbered slots. Before the
//! first compiled call in a context each value is handed to the base library through
//! the setter matching its kind.

use bitlink_jit::LazyCompiler;
use bitlink_symbol::{CallError, Value};
use tracing::debug;

use crate::context::ExecutionContext;
use crate::error::BridgeError;

pub const INITVAR_OBJ: &str = "bitlink_initvar_obj";
pub const INITVAR_DOUBLE: &str = "bitlink_initvar_double";
pub const INITVAR_INT: &str = "bitlink_initvar_int";

/// Host-provided initial values of the global slots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalValues {
    slots: Vec<(u32, Value)>,
}

impl GlobalValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, slot: u32, value: Value) -> Self {
        self.set(slot, value);
        self
    }

    /// Set the initial value of `slot`, replacing any earlier one.
    pub fn set(&mut self, slot: u32, value: Value) {
        match self.slots.iter_mut().find(|(s, _)| *s == slot) {
            Some((_, existing)) => *existing = value,
            None => self.slots.push((slot, value)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(u32, Value)> {
        self.slots.iter()
    }
}

/// Setter receiving a value of this kind, `None` for values that carry nothing.
pub fn setter_for(value: &Value) -> Option<&'static str> {
    match value {
        Value::Void => None,
        Value::Double(_) => Some(INITVAR_DOUBLE),
        Value::Int(_) => Some(INITVAR_INT),
        Value::Str(_) | Value::Pointer(_) | Value::Object(_) => Some(INITVAR_OBJ),
    }
}

/// Run the setters for every slot in `ctx`, once per context.
pub(crate) fn ensure_initialized(
    ctx: &ExecutionContext,
    values: &GlobalValues,
    compiler: &LazyCompiler,
) -> Result<(), BridgeError> {
    if values.is_empty() {
        return Ok(());
    }
    ctx.globals()
        .get_or_try_init(|| initialize(ctx, values, compiler))
        .map(|_| ())
}

fn initialize(
    ctx: &ExecutionContext,
    values: &GlobalValues,
    compiler: &LazyCompiler,
) -> Result<(), BridgeError> {
    let table = ctx.table();
    for (slot, value) in values.iter() {
        let Some(setter) = setter_for(value) else {
            continue;
        };
        compiler
            .ensure_compiled(table, setter, true)
            .map_err(|err| BridgeError::from_jit("globals", err))?;
        let unit = table
            .get(setter)
            .and_then(|entry| entry.unit())
            .ok_or_else(|| CallError::failed(setter, "setter has no compiled unit"))?;
        unit.invoke(setter, &[Value::Int(i64::from(*slot)), value.clone()])?;
    }
    debug!(context = %ctx.id(), slots = values.len(), "initialized globals");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setter_by_kind() {
        assert_eq!(setter_for(&Value::Double(1.5)), Some(INITVAR_DOUBLE));
        assert_eq!(setter_for(&Value::Int(1)), Some(INITVAR_INT));
        assert_eq!(setter_for(&Value::object(3u8)), Some(INITVAR_OBJ));
        assert_eq!(setter_for(&Value::Str("NA".into())), Some(INITVAR_OBJ));
        assert_eq!(setter_for(&Value::Void), None);
    }

    #[test]
    fn test_set_replaces_slot() {
        let mut values = GlobalValues::new().with(1, Value::Int(1)).with(2, Value::Int(2));
        values.set(1, Value::Double(0.5));
        let slots: Vec<_> = values.iter().cloned().collect();
        assert_eq!(slots, vec![(1, Value::Double(0.5)), (2, Value::Int(2))]);
    }
}
