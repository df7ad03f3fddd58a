use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use hostbridge_env::{HostContext, ProgressCallback, ProgressEvent, ProgressKind};

use crate::controller::Controller;

/// Receives repeatable notifications from a long-running task. Never called
/// after the task's terminal completion has been handled.
pub trait ProgressListener: Send + Sync {
    fn on_progress(&self, controller: &Controller);

    fn on_paused(&self, controller: &Controller) {
        let _ = controller;
    }
}

impl<F> ProgressListener for F
where
    F: Fn(&Controller) + Send + Sync,
{
    fn on_progress(&self, controller: &Controller) {
        self(controller);
    }
}

/// Wraps `listener` as a host progress callback that goes quiet once
/// `finished` is set.
pub(crate) fn progress_callback(
    listener: Arc<dyn ProgressListener>,
    controller: Controller,
    finished: Arc<AtomicBool>,
) -> ProgressCallback {
    Arc::new(move |ctx: &HostContext, event: ProgressEvent| {
        let _snapshot = ctx.local(event.snapshot);
        if finished.load(Ordering::Acquire) {
            tracing::debug!("dropping progress notification after completion");
            return;
        }
        match event.kind {
            ProgressKind::Progress => listener.on_progress(&controller),
            ProgressKind::Paused => listener.on_paused(&controller),
        }
    })
}
