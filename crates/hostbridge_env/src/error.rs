//! Errors reported by the host runtime seam.

use crate::handle::{CallKind, RawObject};

pub type HostResult<T> = Result<T, HostError>;

/// A host exception, already translated out of the host's object model.
///
/// Raw exception objects never leave the seam; only their type name and
/// message do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostException {
    pub class_name: String,
    pub message: String,
}

impl HostException {
    pub fn new(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("class `{0}` not found")]
    ClassNotFound(String),

    #[error("{kind} member `{name}` ({descriptor}) not found")]
    MemberNotFound {
        name: String,
        descriptor: String,
        kind: CallKind,
    },

    #[error("{}: {}", .0.class_name, .0.message)]
    Exception(HostException),

    #[error("native methods already registered on `{0}`")]
    AlreadyRegistered(String),

    #[error("invalid or released handle {0}")]
    InvalidHandle(RawObject),

    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: &'static str, got: String },

    #[error("host rejected request: {0}")]
    Rejected(String),
}

impl HostError {
    pub fn exception(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        HostError::Exception(HostException::new(class_name, message))
    }

    /// Message suitable for surfacing to native callers.
    pub fn message(&self) -> String {
        match self {
            HostError::Exception(exception) => exception.message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_message_strips_class() {
        let err = HostError::exception("host.io.IOException", "disk full");
        assert_eq!(err.message(), "disk full");
        assert_eq!(err.to_string(), "host.io.IOException: disk full");
    }

    #[test]
    fn test_member_not_found_display() {
        let err = HostError::MemberNotFound {
            name: "size".into(),
            descriptor: "()J".into(),
            kind: CallKind::Instance,
        };
        assert_eq!(err.to_string(), "instance member `size` (()J) not found");
    }
}
