use crate::handle::RawObject;

/// Value passed to or returned from a host invocation.
///
/// `Object` carries a raw local handle; the receiver of a returned object
/// owns it and must wrap it in a [`crate::Local`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum HostValue {
    #[default]
    Void,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Object(RawObject),
}

impl HostValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Void => "void",
            HostValue::Bool(_) => "bool",
            HostValue::Int(_) => "int",
            HostValue::Long(_) => "long",
            HostValue::Double(_) => "double",
            HostValue::Object(_) => "object",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            HostValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Widening read: ints are accepted as longs.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            HostValue::Long(l) => Some(*l),
            HostValue::Int(i) => Some(i64::from(*i)),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            HostValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<RawObject> {
        match self {
            HostValue::Object(obj) => Some(*obj),
            _ => None,
        }
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

impl From<i32> for HostValue {
    fn from(value: i32) -> Self {
        HostValue::Int(value)
    }
}

impl From<i64> for HostValue {
    fn from(value: i64) -> Self {
        HostValue::Long(value)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        HostValue::Double(value)
    }
}

impl From<RawObject> for HostValue {
    fn from(value: RawObject) -> Self {
        HostValue::Object(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_accessor_widens_int() {
        assert_eq!(HostValue::Int(7).as_long(), Some(7));
        assert_eq!(HostValue::Long(-3).as_long(), Some(-3));
        assert_eq!(HostValue::Bool(true).as_long(), None);
    }

    #[test]
    fn test_object_accessor() {
        let raw = RawObject::from_bits(42);
        assert_eq!(HostValue::from(raw).as_object(), Some(raw));
        assert_eq!(HostValue::Void.as_object(), None);
        assert_eq!(HostValue::default().type_name(), "void");
    }
}
