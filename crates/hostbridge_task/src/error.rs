//! Translation of host failures into native `(kind, message)` pairs.

use std::fmt;

use ahash::AHashMap;
use hostbridge_env::{HostContext, HostError, Local};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Host exception no translator recognised.
    Unknown,
    Cancelled,
    /// Product-specific error code.
    Code(i32),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Unknown => write!(f, "unknown"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
            ErrorKind::Code(code) => write!(f, "code {code}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct BridgeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl BridgeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "cancelled")
    }
}

impl From<HostError> for BridgeError {
    fn from(err: HostError) -> Self {
        Self::unknown(err.message())
    }
}

/// Maps a host exception object to a native error.
///
/// Returning `None` means the exception is not recognised; the bridge then
/// reports [`ErrorKind::Unknown`] with the exception message.
pub trait ErrorTranslator: Send + Sync {
    fn translate(&self, ctx: &HostContext, exception: &Local<'_>) -> Option<BridgeError>;
}

impl<F> ErrorTranslator for F
where
    F: Fn(&HostContext, &Local<'_>) -> Option<BridgeError> + Send + Sync,
{
    fn translate(&self, ctx: &HostContext, exception: &Local<'_>) -> Option<BridgeError> {
        self(ctx, exception)
    }
}

/// Recognises nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnknownErrors;

impl ErrorTranslator for UnknownErrors {
    fn translate(&self, _ctx: &HostContext, _exception: &Local<'_>) -> Option<BridgeError> {
        None
    }
}

/// Maps exceptions by exact host class name.
#[derive(Debug, Clone, Default)]
pub struct ClassErrorTranslator {
    kinds: AHashMap<String, ErrorKind>,
}

impl ClassErrorTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(mut self, class_name: impl Into<String>, kind: ErrorKind) -> Self {
        self.kinds.insert(class_name.into(), kind);
        self
    }
}

impl ErrorTranslator for ClassErrorTranslator {
    fn translate(&self, ctx: &HostContext, exception: &Local<'_>) -> Option<BridgeError> {
        let described = ctx.describe_throwable(exception.raw())?;
        let kind = self.kinds.get(&described.class_name)?;
        Some(BridgeError::new(*kind, described.message))
    }
}

/// Error for a failed task. Never fails itself: anything the translator
/// does not recognise becomes [`ErrorKind::Unknown`].
pub fn translate_failure(
    ctx: &HostContext,
    translator: &dyn ErrorTranslator,
    exception: &Local<'_>,
    fallback: Option<&str>,
) -> BridgeError {
    if !exception.is_null() {
        if let Some(err) = translator.translate(ctx, exception) {
            return err;
        }
        if let Some(described) = ctx.describe_throwable(exception.raw()) {
            tracing::debug!(
                exception = %described.class_name,
                "unrecognised host exception"
            );
            return BridgeError::unknown(described.message);
        }
    }
    BridgeError::unknown(fallback.unwrap_or("unknown host error"))
}
