//! Cross-runtime binding layer.
//!
//! Native code uses this crate to call into a garbage-collected host runtime
//! and to receive its asynchronous callbacks:
//!
//! - [`ClassRegistry`] caches host type and member identifiers behind
//!   reference-counted acquire/release.
//! - [`Local`] and [`Durable`] own host object references and release them
//!   exactly once.
//! - [`TaskBridge`] turns host tasks into [`TaskFuture`]s, with progress
//!   delivered through a [`Controller`].
//!
//! [`Runtime`] ties the three together for one host context.

mod runtime;

pub use hostbridge_config::{BridgeConfig, CallbacksConfig, FuturesConfig, LookupConfig};
pub use hostbridge_env::{
    CallKind, CompletionListener, Durable, FieldId, HostContext, HostEnv, HostError,
    HostException, HostJob, HostResult, HostValue, ListenerToken, Local, MethodId, NativeEntry,
    NativeMethod, ProgressCallback, ProgressEvent, ProgressKind, RawObject, TaskCompletion,
    TaskStatus,
};
pub use hostbridge_reflect::{
    BindError, Binding, ClassBinding, ClassRegistry, ClassTable, DefinitionBlob,
    GLOBAL_CLASS_REGISTRY, MemberIndex, MemberSignature, Requirement, TableSpec, bind_class,
};
pub use hostbridge_task::{
    Attachment, BridgeError, BridgeRequest, CallbackRegistry, ClassErrorTranslator, Controller,
    DecodeStrategy, DispatchContext, DispatchHandle, ErrorKind, ErrorTranslator,
    FutureCompletion, FutureHandle, FutureStatus, FutureTable, MarshalFn, Outcome,
    ProgressListener, ResultShape, SnapshotAccessor, TaskBridge, TaskFuture, TaskValue,
    TransferMethods, UnknownErrors,
};
pub use hostbridge_utils::logger::init_logging;
pub use runtime::Runtime;
