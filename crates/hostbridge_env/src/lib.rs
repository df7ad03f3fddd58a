//! Host runtime seam for the hostbridge binding layer.
//!
//! Everything that crosses the foreign-function boundary goes through the
//! [`HostEnv`] trait. Native code never reaches for an ambient environment:
//! every operation receives a [`HostContext`] explicitly, and every host
//! object it holds is owned by either a call-scoped [`Local`] or a
//! cross-call [`Durable`] reference.

pub mod context;
pub mod error;
pub mod handle;
pub mod native;
pub mod reference;
pub mod value;

pub use context::{
    CompletionListener, HostContext, HostEnv, HostJob, ProgressCallback, ProgressEvent,
    ProgressKind, TaskCompletion, TaskStatus,
};
pub use error::{HostError, HostException, HostResult};
pub use handle::{CallKind, FieldId, ListenerToken, MethodId, RawObject};
pub use native::{NativeEntry, NativeMethod};
pub use reference::{Durable, Local};
pub use value::HostValue;
