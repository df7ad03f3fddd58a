//! Bridges asynchronous host tasks to native futures.
//!
//! A host task is registered with a [`TaskBridge`], which hands back a
//! [`TaskFuture`] immediately. When the host reports completion, the result
//! is decoded by runtime type ([`ResultShape`]), failures are translated to
//! [`BridgeError`]s, and the future completes exactly once.

mod callback;
mod controller;
mod decode;
mod dispatch;
mod error;
mod future;
mod progress;
mod value;

pub use callback::{Attachment, BridgeRequest, CallbackRegistry, FutureCompletion, TaskBridge};
pub use controller::{Controller, SnapshotAccessor, TransferMethods};
pub use decode::{DecodeStrategy, MarshalFn, ResultShape, decode};
pub use dispatch::{
    DispatchContext, DispatchHandle, run_on_background_thread,
    run_on_background_thread_cancellable, run_on_main_thread, run_on_main_thread_cancellable,
};
pub use error::{
    BridgeError, ClassErrorTranslator, ErrorKind, ErrorTranslator, UnknownErrors,
    translate_failure,
};
pub use future::{FutureHandle, FutureStatus, FutureTable, TaskFuture};
pub use progress::ProgressListener;
pub use value::{Outcome, TaskValue};
