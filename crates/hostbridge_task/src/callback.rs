//! Completion records and the registry that routes host callbacks to them.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use ahash::AHashMap;
use hostbridge_env::{
    Durable, HostContext, ListenerToken, Local, MethodId, RawObject, TaskCompletion, TaskStatus,
};
use parking_lot::Mutex;

use crate::controller::{Controller, TransferMethods};
use crate::decode::{DecodeStrategy, decode};
use crate::error::{BridgeError, translate_failure};
use crate::future::{FutureHandle, FutureTable, TaskFuture};
use crate::progress::{ProgressListener, progress_callback};
use crate::value::Outcome;

/// Native-side helper object that lives exactly as long as the bridged call.
#[derive(Debug)]
pub struct Attachment {
    object: Durable,
    discard: Option<MethodId>,
}

impl Attachment {
    pub fn new(object: Durable) -> Self {
        Self {
            object,
            discard: None,
        }
    }

    /// `discard` is invoked on the object before it is released.
    pub fn with_discard(object: Durable, discard: MethodId) -> Self {
        Self {
            object,
            discard: Some(discard),
        }
    }

    fn release(mut self, ctx: &HostContext) {
        if let Some(discard) = self.discard
            && !self.object.is_null()
            && let Err(err) = ctx.call_method(self.object.raw(), discard, &[])
        {
            tracing::warn!(error = %err, "failed to discard attachment");
        }
        self.object.release();
    }
}

/// Everything a call site supplies when bridging a task.
#[derive(Default)]
pub struct BridgeRequest {
    strategy: DecodeStrategy,
    api: Option<String>,
    fn_idx: Option<usize>,
    attachments: Vec<Attachment>,
    progress: Option<(Arc<dyn ProgressListener>, Arc<TransferMethods>)>,
}

impl BridgeRequest {
    pub fn new(strategy: DecodeStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// API identifier the completion is registered under.
    pub fn api(mut self, api: impl Into<String>) -> Self {
        self.api = Some(api.into());
        self
    }

    /// Records the future as the last result of `fn_idx`.
    pub fn function(mut self, fn_idx: usize) -> Self {
        self.fn_idx = Some(fn_idx);
        self
    }

    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn progress(
        mut self,
        listener: Arc<dyn ProgressListener>,
        methods: Arc<TransferMethods>,
    ) -> Self {
        self.progress = Some((listener, methods));
        self
    }
}

impl fmt::Debug for BridgeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeRequest")
            .field("strategy", &self.strategy)
            .field("api", &self.api)
            .field("fn_idx", &self.fn_idx)
            .field("attachments", &self.attachments.len())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Registration record for one pending host task. Consumed exactly once.
pub struct FutureCompletion {
    future: FutureHandle,
    table: FutureTable,
    strategy: DecodeStrategy,
    task: Durable,
    attachments: Vec<Attachment>,
    progress_token: Option<ListenerToken>,
    finished: Arc<AtomicBool>,
}

impl FutureCompletion {
    pub fn future(&self) -> FutureHandle {
        self.future
    }

    pub fn task(&self) -> RawObject {
        self.task.raw()
    }

    fn finish(self, ctx: &HostContext, completion: TaskCompletion) {
        let result = ctx.local(completion.result);
        let outcome = match completion.status {
            TaskStatus::Success => match decode(ctx, self.strategy.shapes(), &result) {
                Ok(value) => Outcome::Completed(value),
                Err(err) => {
                    tracing::warn!(
                        future = %self.future,
                        error = %err,
                        "failed to decode task result"
                    );
                    Outcome::Failed(err)
                }
            },
            TaskStatus::Failure => Outcome::Failed(translate_failure(
                ctx,
                self.strategy.error_translator(),
                &result,
                completion.message.as_deref(),
            )),
            TaskStatus::Cancelled => Outcome::Cancelled,
        };
        drop(result);
        self.settle(ctx, outcome);
    }

    fn settle(self, ctx: &HostContext, outcome: Outcome) {
        self.finished.store(true, Ordering::Release);
        self.table.complete(self.future, outcome);
        self.release(ctx);
    }

    fn release(self, ctx: &HostContext) {
        let Self {
            mut task,
            attachments,
            progress_token,
            ..
        } = self;
        if let Some(token) = progress_token {
            ctx.remove_listener(task.raw(), token);
        }
        for attachment in attachments {
            attachment.release(ctx);
        }
        task.release();
    }
}

impl fmt::Debug for FutureCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FutureCompletion")
            .field("future", &self.future)
            .field("task", &self.task)
            .finish_non_exhaustive()
    }
}

struct PendingCompletion {
    api: String,
    token: Option<ListenerToken>,
    completion: FutureCompletion,
}

/// Pending completions grouped by API identifier.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    pending: Arc<Mutex<AHashMap<u64, PendingCompletion>>>,
    next_id: Arc<AtomicU64>,
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `completion` and attaches a completion listener to `task`.
    ///
    /// The record is in place before the listener is attached, so a task
    /// that has already finished completes during this call.
    pub fn register(
        &self,
        ctx: &HostContext,
        task: RawObject,
        api: &str,
        completion: FutureCompletion,
    ) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.pending.lock().insert(
            id,
            PendingCompletion {
                api: api.to_owned(),
                token: None,
                completion,
            },
        );

        let registry = self.clone();
        let listener = Box::new(move |ctx: &HostContext, completion: TaskCompletion| {
            registry.on_task_complete(ctx, id, completion);
        });
        match ctx.add_completion_listener(task, listener) {
            Ok(token) => {
                if let Some(entry) = self.pending.lock().get_mut(&id) {
                    entry.token = Some(token);
                }
            }
            Err(err) => {
                tracing::error!(api, error = %err, "failed to attach completion listener");
                let entry = self.pending.lock().remove(&id);
                if let Some(entry) = entry {
                    entry.completion.settle(ctx, Outcome::Failed(err.into()));
                }
            }
        }
    }

    fn on_task_complete(&self, ctx: &HostContext, id: u64, completion: TaskCompletion) {
        let entry = self.pending.lock().remove(&id);
        match entry {
            Some(entry) => {
                tracing::debug!(api = %entry.api, status = ?completion.status, "task completed");
                entry.completion.finish(ctx, completion);
            }
            None => {
                tracing::debug!("completion for a callback that was already cancelled");
                drop(Local::new(ctx, completion.result));
            }
        }
    }

    /// Cancels pending completions under `api`, or all of them with `None`.
    /// Their futures complete as cancelled. Returns how many were cancelled.
    pub fn cancel_callbacks(&self, ctx: &HostContext, api: Option<&str>) -> usize {
        let cancelled: Vec<PendingCompletion> = {
            let mut pending = self.pending.lock();
            let ids: Vec<u64> = pending
                .iter()
                .filter(|(_, entry)| api.is_none_or(|api| entry.api == api))
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| pending.remove(&id))
                .collect()
        };
        let count = cancelled.len();
        for entry in cancelled {
            if let Some(token) = entry.token {
                ctx.remove_listener(entry.completion.task(), token);
            }
            entry.completion.settle(ctx, Outcome::Cancelled);
        }
        if count > 0 {
            tracing::debug!(api = api.unwrap_or("*"), count, "cancelled pending callbacks");
        }
        count
    }

    /// Pending completions under `api`, or all of them with `None`.
    pub fn pending(&self, api: Option<&str>) -> usize {
        self.pending
            .lock()
            .values()
            .filter(|entry| api.is_none_or(|api| entry.api == api))
            .count()
    }
}

/// Turns host tasks into [`TaskFuture`]s.
#[derive(Debug, Clone)]
pub struct TaskBridge {
    futures: FutureTable,
    callbacks: CallbackRegistry,
    default_api: String,
}

impl TaskBridge {
    pub fn new(
        futures: FutureTable,
        callbacks: CallbackRegistry,
        default_api: impl Into<String>,
    ) -> Self {
        Self {
            futures,
            callbacks,
            default_api: default_api.into(),
        }
    }

    pub fn futures(&self) -> &FutureTable {
        &self.futures
    }

    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    /// Bridges `task` and returns immediately. The future may already be
    /// complete if the task had finished.
    pub fn bridge(
        &self,
        ctx: &HostContext,
        task: &Local<'_>,
        request: BridgeRequest,
    ) -> TaskFuture {
        let BridgeRequest {
            strategy,
            api,
            fn_idx,
            attachments,
            progress,
        } = request;
        let future = match fn_idx {
            Some(idx) => self.futures.alloc_for(idx),
            None => self.futures.alloc(),
        };
        let finished = Arc::new(AtomicBool::new(false));
        let mut completion = FutureCompletion {
            future: future.handle(),
            table: self.futures.clone(),
            strategy,
            task: task.to_durable(),
            attachments,
            progress_token: None,
            finished: Arc::clone(&finished),
        };

        if task.is_null() {
            tracing::error!("cannot bridge a null task");
            completion.settle(ctx, Outcome::Failed(BridgeError::unknown("null task")));
            return future;
        }

        if let Some((listener, methods)) = progress {
            let controller = Controller::new(completion.task.clone(), methods);
            let callback = progress_callback(listener, controller, finished);
            match ctx.add_progress_listener(task.raw(), callback) {
                Ok(token) => completion.progress_token = Some(token),
                Err(err) => tracing::warn!(error = %err, "failed to attach progress listener"),
            }
        }

        let api = api.as_deref().unwrap_or(&self.default_api);
        self.callbacks.register(ctx, task.raw(), api, completion);
        future
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use hostbridge_env::{CallKind, HostValue};
    use hostbridge_testing::{ClassDef, MockHost, STRING_CLASS, THROWABLE_CLASS};

    use crate::controller::tests::transfer_methods;
    use crate::decode::ResultShape;
    use crate::error::{ClassErrorTranslator, ErrorKind};
    use crate::future::FutureStatus;
    use crate::value::TaskValue;

    const NOT_FOUND_CLASS: &str = "host.storage.ObjectNotFound";

    fn bridge() -> TaskBridge {
        TaskBridge::new(FutureTable::new(), CallbackRegistry::new(), "default")
    }

    fn string_strategy(ctx: &HostContext) -> DecodeStrategy {
        let class = ctx.local(ctx.find_class(STRING_CLASS).unwrap()).to_durable();
        DecodeStrategy::new().shape(ResultShape::text(class))
    }

    #[test]
    fn test_string_result_releases_everything() {
        let host = MockHost::new();
        let ctx = host.context();
        let bridge = bridge();
        let locals = host.live_local_refs();
        let globals = host.live_global_refs();

        let task = ctx.local(host.new_task());
        let future = bridge.bridge(
            &ctx,
            &task,
            BridgeRequest::new(string_strategy(&ctx)).api("storage"),
        );
        assert_eq!(future.status(), FutureStatus::Pending);
        assert_eq!(bridge.callbacks().pending(Some("storage")), 1);

        let result = ctx.local(ctx.new_string("gs://bucket/object").unwrap());
        assert!(host.succeed_task(task.raw(), result.raw()));

        assert_eq!(
            future.outcome(),
            Some(Outcome::Completed(TaskValue::Text("gs://bucket/object".into())))
        );
        assert_eq!(bridge.callbacks().pending(None), 0);
        assert_eq!(host.active_listeners(task.raw()), 0);

        drop(result);
        drop(task);
        assert_eq!(host.live_local_refs(), locals);
        assert_eq!(host.live_global_refs(), globals);
    }

    #[test]
    fn test_failures_are_translated() {
        let host = MockHost::new();
        host.define(ClassDef::new(NOT_FOUND_CLASS).extends(THROWABLE_CLASS));
        let ctx = host.context();
        let bridge = bridge();
        let strategy = || {
            string_strategy(&ctx)
                .translator(ClassErrorTranslator::new().map(NOT_FOUND_CLASS, ErrorKind::Code(404)))
        };

        let known = ctx.local(host.new_task());
        let known_future = bridge.bridge(&ctx, &known, BridgeRequest::new(strategy()));
        let unknown = ctx.local(host.new_task());
        let unknown_future = bridge.bridge(&ctx, &unknown, BridgeRequest::new(strategy()));

        let missing = ctx.local(host.new_throwable(NOT_FOUND_CLASS, "no such object"));
        host.fail_task(known.raw(), missing.raw());
        let crash = ctx.local(host.new_throwable(THROWABLE_CLASS, "socket closed"));
        host.fail_task(unknown.raw(), crash.raw());

        assert_eq!(
            known_future.outcome(),
            Some(Outcome::Failed(BridgeError::new(
                ErrorKind::Code(404),
                "no such object"
            )))
        );
        let err = unknown_future.outcome().and_then(|o| o.error()).unwrap();
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert_eq!(err.message, "socket closed");
        assert_eq!(host.string_reads(), 0);
    }

    #[test]
    fn test_undecodable_result_fails_the_future() {
        let host = MockHost::new();
        host.define(
            ClassDef::new("host.storage.Metadata")
                .method_with("isPublic", "()Z", |_| Ok(HostValue::Bool(true))),
        );
        let ctx = host.context();
        let bridge = bridge();
        let metadata = ctx
            .local(ctx.find_class("host.storage.Metadata").unwrap())
            .to_durable();
        let accessor = ctx
            .method_id(metadata.raw(), "isPublic", "()Z", CallKind::Instance)
            .unwrap();
        let strategy = DecodeStrategy::new().shape(ResultShape::byte_count(metadata, accessor));
        let locals = host.live_local_refs();

        let task = ctx.local(host.new_task());
        let future = bridge.bridge(&ctx, &task, BridgeRequest::new(strategy));
        let result = ctx.local(host.new_instance("host.storage.Metadata"));
        assert!(host.succeed_task(task.raw(), result.raw()));

        let err = future.outcome().and_then(|o| o.error()).unwrap();
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert!(err.message.contains("expected long"), "{err}");
        assert_eq!(bridge.callbacks().pending(None), 0);

        drop(result);
        drop(task);
        assert_eq!(host.live_local_refs(), locals);
    }

    #[test]
    fn test_cancelled_task_skips_decoding() {
        let host = MockHost::new();
        let ctx = host.context();
        let bridge = bridge();

        let task = ctx.local(host.new_task());
        let future = bridge.bridge(&ctx, &task, BridgeRequest::new(string_strategy(&ctx)));
        assert!(host.cancel_task(task.raw()));

        let outcome = future.wait();
        assert!(outcome.is_cancelled());
        assert_eq!(outcome.error().map(|e| e.kind), Some(ErrorKind::Cancelled));
        assert_eq!(host.string_reads(), 0);
    }

    #[test]
    fn test_cancel_callbacks_by_api() {
        let host = MockHost::new();
        let ctx = host.context();
        let bridge = bridge();

        let tasks: Vec<_> = (0..3).map(|_| ctx.local(host.new_task())).collect();
        let futures: Vec<_> = tasks
            .iter()
            .zip(["auth", "auth", "storage"])
            .map(|(task, api)| bridge.bridge(&ctx, task, BridgeRequest::default().api(api)))
            .collect();

        assert_eq!(bridge.callbacks().cancel_callbacks(&ctx, Some("auth")), 2);
        assert!(futures[0].outcome().is_some_and(|o| o.is_cancelled()));
        assert!(futures[1].outcome().is_some_and(|o| o.is_cancelled()));
        assert_eq!(host.active_listeners(tasks[0].raw()), 0);
        assert_eq!(bridge.callbacks().pending(None), 1);

        // Host completion after cancellation changes nothing.
        host.succeed_task(tasks[0].raw(), RawObject::NULL);
        assert!(futures[0].outcome().is_some_and(|o| o.is_cancelled()));

        host.succeed_task(tasks[2].raw(), RawObject::NULL);
        assert_eq!(futures[2].outcome(), Some(Outcome::Completed(TaskValue::Void)));
        assert_eq!(bridge.callbacks().cancel_callbacks(&ctx, None), 0);
    }

    #[derive(Default)]
    struct Recorder {
        progress: Mutex<Vec<i64>>,
        paused: AtomicUsize,
    }

    impl ProgressListener for Recorder {
        fn on_progress(&self, controller: &Controller) {
            self.progress.lock().push(controller.bytes_transferred());
        }

        fn on_paused(&self, controller: &Controller) {
            assert!(controller.is_paused());
            self.paused.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_progress_until_completion() {
        let host = MockHost::new();
        host.install_transfer_classes();
        let ctx = host.context();
        let bridge = bridge();
        let methods = transfer_methods(&ctx);
        let recorder = Arc::new(Recorder::default());

        let task = ctx.local(host.new_transfer_task(false, 1000));
        let future = bridge.bridge(
            &ctx,
            &task,
            BridgeRequest::default().progress(recorder.clone(), Arc::clone(&methods)),
        );
        assert_eq!(host.active_listeners(task.raw()), 2);

        host.set_transferred(task.raw(), 250);
        assert_eq!(host.emit_transfer_progress(task.raw()), 1);
        host.set_transferred(task.raw(), 600);
        assert_eq!(host.emit_transfer_progress(task.raw()), 1);

        ctx.call_method(task.raw(), methods.pause, &[]).unwrap();
        assert_eq!(recorder.paused.load(Ordering::SeqCst), 1);

        host.succeed_task(task.raw(), RawObject::NULL);
        assert!(future.is_complete());
        assert_eq!(host.emit_transfer_progress(task.raw()), 0);
        assert_eq!(*recorder.progress.lock(), vec![250, 600]);
        assert_eq!(host.active_listeners(task.raw()), 0);
    }

    #[test]
    fn test_attachment_discarded_on_completion() {
        let host = MockHost::new();
        host.define(ClassDef::new("host.test.UploadStream").method("close", "()V"));
        let ctx = host.context();
        let bridge = bridge();

        let stream = ctx.local(host.new_instance("host.test.UploadStream"));
        let class = ctx.local(ctx.find_class("host.test.UploadStream").unwrap());
        let close = ctx
            .method_id(class.raw(), "close", "()V", CallKind::Instance)
            .unwrap();
        let globals = host.live_global_refs();
        let attachment = Attachment::with_discard(stream.to_durable(), close);

        let task = ctx.local(host.new_task());
        let future = bridge.bridge(&ctx, &task, BridgeRequest::default().attach(attachment));
        assert_eq!(host.method_calls("close"), 0);

        host.succeed_task(task.raw(), RawObject::NULL);
        assert!(future.is_complete());
        assert_eq!(host.method_calls("close"), 1);
        assert_eq!(host.live_global_refs(), globals);
    }

    #[test]
    fn test_already_finished_task_completes_immediately() {
        let host = MockHost::new();
        let ctx = host.context();
        let bridge = bridge();

        let task = ctx.local(host.new_task());
        let result = ctx.local(ctx.new_string("done").unwrap());
        host.succeed_task(task.raw(), result.raw());

        let future = bridge.bridge(
            &ctx,
            &task,
            BridgeRequest::new(string_strategy(&ctx)).function(3),
        );
        assert_eq!(
            future.outcome().and_then(|o| o.value().and_then(|v| v.as_text().map(str::to_owned))),
            Some("done".to_owned())
        );
        assert_eq!(bridge.callbacks().pending(None), 0);
        assert_eq!(
            bridge.futures().last_result(3).map(|f| f.handle()),
            Some(future.handle())
        );
    }

    #[test]
    fn test_null_task_fails() {
        let host = MockHost::new();
        let ctx = host.context();
        let bridge = bridge();

        let future = bridge.bridge(&ctx, &Local::null(), BridgeRequest::default());
        let err = future.outcome().and_then(|o| o.error()).unwrap();
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert_eq!(bridge.callbacks().pending(None), 0);
    }
}
