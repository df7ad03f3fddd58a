//! Running native work on host-designated threads.
//!
//! A posted job and its cancellation race through a [`DispatchContext`]:
//! the job only runs if it wins the execute/cancel lock, and a cancel only
//! takes effect before the job has started.

use std::fmt;
use std::sync::Arc;

use hostbridge_env::{HostContext, HostJob, HostResult};
use parking_lot::Mutex;

use crate::future::{FutureHandle, FutureTable, TaskFuture};
use crate::value::{Outcome, TaskValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DispatchState {
    Pending,
    Executing,
    /// Running, but past the point where it can be cancelled.
    Released,
    Cancelled,
    Finished,
}

type CancelFn = Box<dyn FnOnce() + Send>;

/// Shared state between a posted job and its caller.
pub struct DispatchContext {
    state: Mutex<DispatchState>,
    on_cancel: Mutex<Option<CancelFn>>,
    table: FutureTable,
    future: FutureHandle,
}

impl fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchContext")
            .field("state", &*self.state.lock())
            .field("future", &self.future)
            .finish()
    }
}

impl DispatchContext {
    /// Claims the job for execution. Returns `false` if it was cancelled.
    pub fn acquire_execute_cancel_lock(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            DispatchState::Pending => {
                *state = DispatchState::Executing;
                true
            }
            _ => false,
        }
    }

    /// Called by running work once it no longer honours cancellation.
    pub fn release_execute_cancel_lock(&self) {
        let mut state = self.state.lock();
        if *state == DispatchState::Executing {
            *state = DispatchState::Released;
        }
    }

    /// Cancels the job if it has not started. Runs the cancel callback and
    /// completes the future as cancelled.
    pub fn cancel(&self) -> bool {
        {
            let mut state = self.state.lock();
            if *state != DispatchState::Pending {
                return false;
            }
            *state = DispatchState::Cancelled;
        }
        let on_cancel = self.on_cancel.lock().take();
        if let Some(on_cancel) = on_cancel {
            on_cancel();
        }
        self.table.complete(self.future, Outcome::Cancelled);
        tracing::debug!(future = %self.future, "dispatched job cancelled");
        true
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.lock() == DispatchState::Cancelled
    }

    fn finish(&self, outcome: Outcome) {
        *self.state.lock() = DispatchState::Finished;
        self.on_cancel.lock().take();
        self.table.complete(self.future, outcome);
    }
}

/// Caller side of a posted job.
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    pub future: TaskFuture,
    pub context: Arc<DispatchContext>,
}

impl DispatchHandle {
    pub fn cancel(&self) -> bool {
        self.context.cancel()
    }
}

/// Posts `work` to the host main thread. The future completes with
/// [`TaskValue::Void`] once the work has run.
pub fn run_on_main_thread<F>(ctx: &HostContext, futures: &FutureTable, work: F) -> DispatchHandle
where
    F: FnOnce(&HostContext, &DispatchContext) + Send + 'static,
{
    dispatch(ctx, futures, work, None, Target::Main)
}

/// Like [`run_on_main_thread`], with `on_cancel` run if the job is
/// cancelled before it starts.
pub fn run_on_main_thread_cancellable<F, C>(
    ctx: &HostContext,
    futures: &FutureTable,
    work: F,
    on_cancel: C,
) -> DispatchHandle
where
    F: FnOnce(&HostContext, &DispatchContext) + Send + 'static,
    C: FnOnce() + Send + 'static,
{
    dispatch(ctx, futures, work, Some(Box::new(on_cancel)), Target::Main)
}

pub fn run_on_background_thread<F>(
    ctx: &HostContext,
    futures: &FutureTable,
    work: F,
) -> DispatchHandle
where
    F: FnOnce(&HostContext, &DispatchContext) + Send + 'static,
{
    dispatch(ctx, futures, work, None, Target::Background)
}

pub fn run_on_background_thread_cancellable<F, C>(
    ctx: &HostContext,
    futures: &FutureTable,
    work: F,
    on_cancel: C,
) -> DispatchHandle
where
    F: FnOnce(&HostContext, &DispatchContext) + Send + 'static,
    C: FnOnce() + Send + 'static,
{
    dispatch(ctx, futures, work, Some(Box::new(on_cancel)), Target::Background)
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Main,
    Background,
}

fn dispatch<F>(
    ctx: &HostContext,
    futures: &FutureTable,
    work: F,
    on_cancel: Option<CancelFn>,
    target: Target,
) -> DispatchHandle
where
    F: FnOnce(&HostContext, &DispatchContext) + Send + 'static,
{
    let future = futures.alloc();
    let context = Arc::new(DispatchContext {
        state: Mutex::new(DispatchState::Pending),
        on_cancel: Mutex::new(on_cancel),
        table: futures.clone(),
        future: future.handle(),
    });

    let job_context = Arc::clone(&context);
    let job: HostJob = Box::new(move |ctx: &HostContext| {
        if !job_context.acquire_execute_cancel_lock() {
            tracing::debug!(future = %job_context.future, "skipping cancelled job");
            return;
        }
        work(ctx, &job_context);
        job_context.finish(Outcome::Completed(TaskValue::Void));
    });

    let posted: HostResult<()> = match target {
        Target::Main => ctx.post_to_main_thread(job),
        Target::Background => ctx.post_to_background_thread(job),
    };
    if let Err(err) = posted {
        tracing::error!(?target, error = %err, "failed to post job");
        context.finish(Outcome::Failed(err.into()));
    }

    DispatchHandle { future, context }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use hostbridge_testing::MockHost;

    use crate::future::FutureStatus;

    #[test]
    fn test_job_runs_on_main_thread() {
        let host = MockHost::new();
        let ctx = host.context();
        let futures = FutureTable::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&ran);
        let handle = run_on_main_thread(&ctx, &futures, move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(handle.future.status(), FutureStatus::Pending);
        assert_eq!(host.run_main_thread(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(
            handle.future.outcome(),
            Some(Outcome::Completed(TaskValue::Void))
        );
        assert!(!handle.cancel());
    }

    #[test]
    fn test_cancel_before_run_skips_work() {
        let host = MockHost::new();
        let ctx = host.context();
        let futures = FutureTable::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let cancelled = Arc::new(AtomicUsize::new(0));

        let work_counter = Arc::clone(&ran);
        let cancel_counter = Arc::clone(&cancelled);
        let handle = run_on_background_thread_cancellable(
            &ctx,
            &futures,
            move |_, _| {
                work_counter.fetch_add(1, Ordering::SeqCst);
            },
            move || {
                cancel_counter.fetch_add(1, Ordering::SeqCst);
            },
        );
        assert!(handle.cancel());
        assert!(handle.context.is_cancelled());
        assert_eq!(host.run_background(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(handle.future.outcome(), Some(Outcome::Cancelled));
    }

    #[test]
    fn test_running_job_cannot_be_cancelled() {
        let host = MockHost::new();
        let ctx = host.context();
        let futures = FutureTable::new();

        let handle = run_on_main_thread_cancellable(
            &ctx,
            &futures,
            |_, dispatch| {
                assert!(!dispatch.cancel());
                dispatch.release_execute_cancel_lock();
                assert!(!dispatch.cancel());
            },
            || panic!("cancel callback must not run"),
        );
        host.run_main_thread();
        assert_eq!(
            handle.future.outcome(),
            Some(Outcome::Completed(TaskValue::Void))
        );
    }

    #[test]
    fn test_rejected_post_fails_future() {
        let host = MockHost::new();
        host.reject_posts(true);
        let ctx = host.context();
        let futures = FutureTable::new();

        let handle = run_on_main_thread(&ctx, &futures, |_, _| {});
        let outcome = handle.future.outcome().unwrap();
        assert!(matches!(outcome, Outcome::Failed(_)));
        assert_eq!(host.pending_main_jobs(), 0);
    }
}
