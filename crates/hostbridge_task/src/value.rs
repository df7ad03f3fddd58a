use hostbridge_env::Durable;

use crate::error::BridgeError;

/// Decoded result of a bridged task.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TaskValue {
    #[default]
    Void,
    Text(String),
    ByteCount(u64),
    Structured(serde_json::Value),
    Object(Durable),
}

impl TaskValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TaskValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_byte_count(&self) -> Option<u64> {
        match self {
            TaskValue::ByteCount(count) => Some(*count),
            _ => None,
        }
    }

    pub fn as_structured(&self) -> Option<&serde_json::Value> {
        match self {
            TaskValue::Structured(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_object(self) -> Option<Durable> {
        match self {
            TaskValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TaskValue::Void)
    }
}

/// Terminal state of a future.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed(TaskValue),
    Failed(BridgeError),
    Cancelled,
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    pub fn value(&self) -> Option<&TaskValue> {
        match self {
            Outcome::Completed(value) => Some(value),
            _ => None,
        }
    }

    /// Error as seen by callers; cancellation maps to
    /// [`crate::ErrorKind::Cancelled`].
    pub fn error(&self) -> Option<BridgeError> {
        match self {
            Outcome::Completed(_) => None,
            Outcome::Failed(err) => Some(err.clone()),
            Outcome::Cancelled => Some(BridgeError::cancelled()),
        }
    }

    pub fn into_result(self) -> Result<TaskValue, BridgeError> {
        match self {
            Outcome::Completed(value) => Ok(value),
            Outcome::Failed(err) => Err(err),
            Outcome::Cancelled => Err(BridgeError::cancelled()),
        }
    }
}
