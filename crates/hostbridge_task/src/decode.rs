//! Runtime-type dispatch of task results.
//!
//! The same completion path serves every result type, so each call site
//! supplies the list of shapes it expects. The first shape whose class the
//! result is an instance of decodes it.

use std::fmt;
use std::sync::Arc;

use hostbridge_env::{Durable, HostContext, HostError, Local, MethodId, RawObject};

use crate::error::{BridgeError, ErrorTranslator, UnknownErrors};
use crate::value::TaskValue;

/// Product callback turning a host object into structured data.
pub type MarshalFn =
    Arc<dyn Fn(&HostContext, &Local<'_>) -> Result<serde_json::Value, BridgeError> + Send + Sync>;

#[derive(Clone)]
pub enum ResultShape {
    /// Host string, read into [`TaskValue::Text`].
    Text { class: Durable },
    /// Object whose `accessor` returns a byte count.
    ByteCount { class: Durable, accessor: MethodId },
    Structured { class: Durable, marshal: MarshalFn },
    /// Kept as a durable reference.
    Object { class: Durable },
    /// Calls `accessor` and decodes the returned object with `inner`.
    Project {
        class: Durable,
        accessor: MethodId,
        inner: Box<ResultShape>,
    },
}

impl ResultShape {
    pub fn text(class: Durable) -> Self {
        Self::Text { class }
    }

    pub fn byte_count(class: Durable, accessor: MethodId) -> Self {
        Self::ByteCount { class, accessor }
    }

    pub fn structured<F>(class: Durable, marshal: F) -> Self
    where
        F: Fn(&HostContext, &Local<'_>) -> Result<serde_json::Value, BridgeError>
            + Send
            + Sync
            + 'static,
    {
        Self::Structured {
            class,
            marshal: Arc::new(marshal),
        }
    }

    pub fn object(class: Durable) -> Self {
        Self::Object { class }
    }

    pub fn project(class: Durable, accessor: MethodId, inner: ResultShape) -> Self {
        Self::Project {
            class,
            accessor,
            inner: Box::new(inner),
        }
    }

    pub fn class(&self) -> RawObject {
        match self {
            ResultShape::Text { class }
            | ResultShape::ByteCount { class, .. }
            | ResultShape::Structured { class, .. }
            | ResultShape::Object { class }
            | ResultShape::Project { class, .. } => class.raw(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ResultShape::Text { .. } => "text",
            ResultShape::ByteCount { .. } => "byte-count",
            ResultShape::Structured { .. } => "structured",
            ResultShape::Object { .. } => "object",
            ResultShape::Project { .. } => "project",
        }
    }

    pub fn matches(&self, ctx: &HostContext, obj: RawObject) -> bool {
        let class = self.class();
        !class.is_null() && ctx.is_instance_of(obj, class)
    }

    fn decode(&self, ctx: &HostContext, obj: &Local<'_>) -> Result<TaskValue, BridgeError> {
        match self {
            ResultShape::Text { .. } => Ok(TaskValue::Text(ctx.read_string(obj.raw())?)),
            ResultShape::ByteCount { accessor, .. } => {
                let value = ctx.call_method(obj.raw(), *accessor, &[])?;
                let count = value.as_long().ok_or_else(|| HostError::TypeMismatch {
                    expected: "long",
                    got: value.type_name().to_owned(),
                })?;
                let count = u64::try_from(count).map_err(|_| HostError::TypeMismatch {
                    expected: "non-negative long",
                    got: count.to_string(),
                })?;
                Ok(TaskValue::ByteCount(count))
            }
            ResultShape::Structured { marshal, .. } => marshal(ctx, obj).map(TaskValue::Structured),
            ResultShape::Object { .. } => Ok(TaskValue::Object(obj.to_durable())),
            ResultShape::Project {
                accessor, inner, ..
            } => {
                let value = ctx.call_method(obj.raw(), *accessor, &[])?;
                let raw = value.as_object().ok_or_else(|| HostError::TypeMismatch {
                    expected: "object",
                    got: value.type_name().to_owned(),
                })?;
                let projected = ctx.local(raw);
                if !projected.is_null() && inner.matches(ctx, projected.raw()) {
                    inner.decode(ctx, &projected)
                } else {
                    Ok(TaskValue::Void)
                }
            }
        }
    }
}

impl fmt::Debug for ResultShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultShape::Project { inner, .. } => f
                .debug_struct("Project")
                .field("class", &self.class())
                .field("inner", inner)
                .finish(),
            other => write!(f, "{}({})", other.name(), other.class()),
        }
    }
}

/// Decodes `result` with the first matching shape. Null results and
/// results no shape matches decode to [`TaskValue::Void`].
pub fn decode(
    ctx: &HostContext,
    shapes: &[ResultShape],
    result: &Local<'_>,
) -> Result<TaskValue, BridgeError> {
    if result.is_null() {
        return Ok(TaskValue::Void);
    }
    match shapes.iter().find(|shape| shape.matches(ctx, result.raw())) {
        Some(shape) => {
            tracing::debug!(shape = shape.name(), "decoding task result");
            shape.decode(ctx, result)
        }
        None => {
            tracing::debug!("no result shape matched, completing without a value");
            Ok(TaskValue::Void)
        }
    }
}

/// How one call site decodes successes and translates failures.
#[derive(Clone)]
pub struct DecodeStrategy {
    shapes: Vec<ResultShape>,
    translator: Arc<dyn ErrorTranslator>,
}

impl Default for DecodeStrategy {
    fn default() -> Self {
        Self {
            shapes: Vec::new(),
            translator: Arc::new(UnknownErrors),
        }
    }
}

impl fmt::Debug for DecodeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeStrategy")
            .field("shapes", &self.shapes)
            .finish_non_exhaustive()
    }
}

impl DecodeStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shape(mut self, shape: ResultShape) -> Self {
        self.shapes.push(shape);
        self
    }

    pub fn translator(mut self, translator: impl ErrorTranslator + 'static) -> Self {
        self.translator = Arc::new(translator);
        self
    }

    pub fn shapes(&self) -> &[ResultShape] {
        &self.shapes
    }

    pub fn error_translator(&self) -> &dyn ErrorTranslator {
        &*self.translator
    }
}
