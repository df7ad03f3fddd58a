//! Opaque handles handed out by the host runtime.

use std::fmt;
use std::num::NonZeroU64;

/// Raw host object handle. The null handle is `RawObject::NULL`.
///
/// A raw handle carries no ownership; wrap it in a [`crate::Local`] or
/// [`crate::Durable`] as soon as it is received.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RawObject(u64);

impl RawObject {
    pub const NULL: Self = Self(0);

    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RawObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "{:#x}", self.0)
        }
    }
}

/// Resolved method identifier. Only meaningful while the owning class
/// binding is acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodId(NonZeroU64);

impl MethodId {
    #[inline]
    pub const fn new(bits: u64) -> Option<Self> {
        match NonZeroU64::new(bits) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    #[inline]
    pub const fn to_bits(self) -> u64 {
        self.0.get()
    }
}

/// Resolved field identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldId(NonZeroU64);

impl FieldId {
    #[inline]
    pub const fn new(bits: u64) -> Option<Self> {
        match NonZeroU64::new(bits) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    #[inline]
    pub const fn to_bits(self) -> u64 {
        self.0.get()
    }
}

/// Token returned when a listener is attached to a host task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(u64);

impl ListenerToken {
    #[inline]
    pub const fn new(bits: u64) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn to_bits(self) -> u64 {
        self.0
    }
}

/// Whether a member is looked up on instances or on the type itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Instance,
    Static,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallKind::Instance => write!(f, "instance"),
            CallKind::Static => write!(f, "static"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handle() {
        assert!(RawObject::NULL.is_null());
        assert!(RawObject::default().is_null());
        assert!(!RawObject::from_bits(1).is_null());
        assert_eq!(RawObject::NULL.to_string(), "null");
    }

    #[test]
    fn test_zero_method_id_is_absent() {
        assert!(MethodId::new(0).is_none());
        assert_eq!(MethodId::new(9).map(MethodId::to_bits), Some(9));
        assert!(FieldId::new(0).is_none());
    }
}
