//! The [`HostEnv`] seam and the explicit context handle passed to every
//! operation that touches the host runtime.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::error::{HostException, HostResult};
use crate::handle::{CallKind, FieldId, ListenerToken, MethodId, RawObject};
use crate::native::NativeMethod;
use crate::reference::{Durable, Local};
use crate::value::HostValue;

/// Terminal state of a host task as reported by its completion listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Success,
    Failure,
    Cancelled,
}

/// Payload handed to a completion listener.
///
/// `result` is a fresh local reference owned by the listener: the task result
/// on success, the host exception object on failure, null when cancelled.
#[derive(Debug)]
pub struct TaskCompletion {
    pub status: TaskStatus,
    pub result: RawObject,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressKind {
    Progress,
    Paused,
}

/// Repeatable notification from a long-running task.
///
/// `snapshot` is a fresh local reference owned by the callback.
#[derive(Debug)]
pub struct ProgressEvent {
    pub kind: ProgressKind,
    pub snapshot: RawObject,
}

pub type CompletionListener = Box<dyn FnOnce(&HostContext, TaskCompletion) + Send>;
pub type ProgressCallback = Arc<dyn Fn(&HostContext, ProgressEvent) + Send + Sync>;
pub type HostJob = Box<dyn FnOnce(&HostContext) + Send>;

/// Operations a host runtime exposes across the foreign-function boundary.
///
/// Handles returned from `find_class`, `define_class`, `new_object`,
/// `new_string` and object-valued calls are new local references owned by
/// the caller. Pending host exceptions are checked and cleared by the
/// implementation and surface as [`crate::HostError::Exception`].
pub trait HostEnv: Send + Sync {
    fn find_class(&self, name: &str) -> HostResult<RawObject>;

    /// Defines `name` from an in-memory definition blob.
    fn define_class(&self, name: &str, definition: &[u8]) -> HostResult<RawObject>;

    fn method_id(
        &self,
        class: RawObject,
        name: &str,
        descriptor: &str,
        kind: CallKind,
    ) -> HostResult<MethodId>;

    fn field_id(
        &self,
        class: RawObject,
        name: &str,
        descriptor: &str,
        kind: CallKind,
    ) -> HostResult<FieldId>;

    fn register_natives(&self, class: RawObject, natives: &[NativeMethod]) -> HostResult<()>;
    fn unregister_natives(&self, class: RawObject) -> HostResult<()>;

    fn new_local_ref(&self, obj: RawObject) -> RawObject;
    fn delete_local_ref(&self, obj: RawObject);
    fn new_global_ref(&self, obj: RawObject) -> RawObject;
    fn delete_global_ref(&self, obj: RawObject);

    fn is_same_object(&self, a: RawObject, b: RawObject) -> bool;
    fn is_instance_of(&self, obj: RawObject, class: RawObject) -> bool;

    fn new_object(
        &self,
        class: RawObject,
        constructor: MethodId,
        args: &[HostValue],
    ) -> HostResult<RawObject>;
    fn call_method(
        &self,
        obj: RawObject,
        method: MethodId,
        args: &[HostValue],
    ) -> HostResult<HostValue>;
    fn call_static_method(
        &self,
        class: RawObject,
        method: MethodId,
        args: &[HostValue],
    ) -> HostResult<HostValue>;
    fn get_field(&self, obj: RawObject, field: FieldId) -> HostResult<HostValue>;
    fn get_static_field(&self, class: RawObject, field: FieldId) -> HostResult<HostValue>;

    fn new_string(&self, text: &str) -> HostResult<RawObject>;
    fn read_string(&self, obj: RawObject) -> HostResult<String>;

    /// Class name and message of a host exception object, `None` if `obj`
    /// is not one.
    fn describe_throwable(&self, obj: RawObject) -> Option<HostException>;

    /// Attaches a one-shot completion listener. If the task has already
    /// finished the listener may fire before this returns.
    fn add_completion_listener(
        &self,
        task: RawObject,
        listener: CompletionListener,
    ) -> HostResult<ListenerToken>;
    fn add_progress_listener(
        &self,
        task: RawObject,
        callback: ProgressCallback,
    ) -> HostResult<ListenerToken>;
    fn remove_listener(&self, task: RawObject, token: ListenerToken);

    fn post_to_main_thread(&self, job: HostJob) -> HostResult<()>;
    fn post_to_background_thread(&self, job: HostJob) -> HostResult<()>;
}

/// Shared handle to a host runtime, passed explicitly into every operation.
#[derive(Clone)]
pub struct HostContext(Arc<dyn HostEnv>);

impl HostContext {
    pub fn new(env: Arc<dyn HostEnv>) -> Self {
        Self(env)
    }

    /// Whether both contexts refer to the same runtime instance.
    pub fn same_runtime(&self, other: &HostContext) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }

    /// Wraps a raw handle received from the host as a call-scoped reference.
    pub fn local(&self, raw: RawObject) -> Local<'_> {
        Local::new(self, raw)
    }

    /// Wraps a handle that is already a durable host reference.
    pub fn adopt(&self, raw: RawObject) -> Durable {
        Durable::adopt(self, raw)
    }

    pub fn env(&self) -> &Arc<dyn HostEnv> {
        &self.0
    }
}

impl Deref for HostContext {
    type Target = dyn HostEnv;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl fmt::Debug for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HostContext")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}
