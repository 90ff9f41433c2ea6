use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Host object passed through the bridge without interpretation.
pub type ObjectRef = Arc<dyn Any + Send + Sync>;

/// A value crossing the boundary between the host runtime and library code.
#[derive(Clone)]
pub enum Value {
    Void,
    Int(i64),
    Double(f64),
    Str(String),
    Pointer(usize),
    Object(ObjectRef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Void,
    Int,
    Double,
    Str,
    Pointer,
    Object,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Void => "void",
            ValueKind::Int => "int",
            ValueKind::Double => "double",
            ValueKind::Str => "str",
            ValueKind::Pointer => "pointer",
            ValueKind::Object => "object",
        };
        f.write_str(name)
    }
}

impl Value {
    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        Value::Object(Arc::new(value))
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Void => ValueKind::Void,
            Value::Int(_) => ValueKind::Int,
            Value::Double(_) => ValueKind::Double,
            Value::Str(_) => ValueKind::Str,
            Value::Pointer(_) => ValueKind::Pointer,
            Value::Object(_) => ValueKind::Object,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn downcast_object<T: Any + Send + Sync>(&self) -> Option<&T> {
        match self {
            Value::Object(obj) => obj.downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "Void"),
            Value::Int(v) => write!(f, "Int({v})"),
            Value::Double(v) => write!(f, "Double({v})"),
            Value::Str(v) => write!(f, "Str({v:?})"),
            Value::Pointer(v) => write!(f, "Pointer({v:#x})"),
            Value::Object(obj) => write!(f, "Object({:p})", Arc::as_ptr(obj)),
        }
    }
}

// Objects compare by identity; the host owns their semantics.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Pointer(a), Value::Pointer(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(val: i64) -> Self {
        Value::Int(val)
    }
}

impl From<f64> for Value {
    fn from(val: f64) -> Self {
        Value::Double(val)
    }
}

impl From<&str> for Value {
    fn from(val: &str) -> Self {
        Value::Str(val.to_owned())
    }
}

impl From<String> for Value {
    fn from(val: String) -> Self {
        Value::Str(val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_and_accessors() {
        assert_eq!(Value::from(3_i64).kind(), ValueKind::Int);
        assert_eq!(Value::from(1.5).as_double(), Some(1.5));
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert!(Value::Void.is_void());
        assert_eq!(Value::Pointer(16).as_int(), None);
    }

    #[test]
    fn test_objects_compare_by_identity() {
        let a = Value::object(7_u32);
        let b = a.clone();
        let c = Value::object(7_u32);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.downcast_object::<u32>(), Some(&7));
        assert_eq!(a.downcast_object::<i64>(), None);
    }
}
