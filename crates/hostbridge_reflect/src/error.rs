use hostbridge_env::{CallKind, HostError};

/// Why a class binding could not be acquired.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    #[error("class `{class}` could not be resolved")]
    ClassNotFound { class: String },

    #[error("required {kind} member `{name}` ({descriptor}) missing on `{class}`")]
    MissingMember {
        class: String,
        name: &'static str,
        descriptor: &'static str,
        kind: CallKind,
    },

    #[error("failed to register native methods on `{class}`: {source}")]
    Natives {
        class: String,
        #[source]
        source: HostError,
    },

    #[error("native methods already registered on `{class}`")]
    AlreadyRegistered { class: String },
}

impl BindError {
    pub fn class(&self) -> &str {
        match self {
            BindError::ClassNotFound { class }
            | BindError::MissingMember { class, .. }
            | BindError::Natives { class, .. }
            | BindError::AlreadyRegistered { class } => class,
        }
    }
}
