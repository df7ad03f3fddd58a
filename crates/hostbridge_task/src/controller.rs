use std::sync::Arc;

use hostbridge_env::{Durable, HostContext, MethodId, RawObject};

/// Byte counters of one snapshot type.
#[derive(Debug, Clone)]
pub struct SnapshotAccessor {
    pub class: Durable,
    pub bytes_transferred: MethodId,
    pub total_byte_count: MethodId,
}

/// Resolved control surface of a transfer task type.
#[derive(Debug, Clone)]
pub struct TransferMethods {
    pub pause: MethodId,
    pub resume: MethodId,
    pub cancel: MethodId,
    pub is_paused: MethodId,
    pub snapshot: MethodId,
    /// Tried in order against the snapshot's runtime type.
    pub snapshots: Vec<SnapshotAccessor>,
}

/// Handle over an in-flight transfer task.
///
/// Requests are asynchronous: a successful `pause` or `cancel` only means
/// no new progress will be made. A default controller is invalid and every
/// operation on it returns `false` or zero.
#[derive(Debug, Clone, Default)]
pub struct Controller {
    task: Durable,
    methods: Option<Arc<TransferMethods>>,
}

impl Controller {
    pub fn new(task: Durable, methods: Arc<TransferMethods>) -> Self {
        Self {
            task,
            methods: Some(methods),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.task.is_null() && self.methods.is_some()
    }

    pub fn task(&self) -> RawObject {
        self.task.raw()
    }

    pub fn pause(&self) -> bool {
        self.request("pause", |m| m.pause)
    }

    pub fn resume(&self) -> bool {
        self.request("resume", |m| m.resume)
    }

    pub fn cancel(&self) -> bool {
        self.request("cancel", |m| m.cancel)
    }

    pub fn is_paused(&self) -> bool {
        self.request("is_paused", |m| m.is_paused)
    }

    pub fn bytes_transferred(&self) -> i64 {
        self.snapshot_count("bytes_transferred", |s| s.bytes_transferred)
    }

    /// Total size of the transfer; `-1` while the host does not know it.
    pub fn total_byte_count(&self) -> i64 {
        self.snapshot_count("total_byte_count", |s| s.total_byte_count)
    }

    fn parts(&self) -> Option<(&HostContext, &TransferMethods)> {
        match (self.task.context(), &self.methods) {
            (Some(ctx), Some(methods)) if !self.task.is_null() => Some((ctx, methods)),
            _ => None,
        }
    }

    fn request(&self, operation: &'static str, method: fn(&TransferMethods) -> MethodId) -> bool {
        let Some((ctx, methods)) = self.parts() else {
            return false;
        };
        match ctx.call_method(self.task.raw(), method(methods), &[]) {
            Ok(value) => value.as_bool().unwrap_or(false),
            Err(err) => {
                tracing::error!(operation, error = %err, "transfer control request failed");
                false
            }
        }
    }

    fn snapshot_count(
        &self,
        counter: &'static str,
        method: fn(&SnapshotAccessor) -> MethodId,
    ) -> i64 {
        let Some((ctx, methods)) = self.parts() else {
            return 0;
        };
        let snapshot = match ctx.call_method(self.task.raw(), methods.snapshot, &[]) {
            Ok(value) => ctx.local(value.as_object().unwrap_or_default()),
            Err(err) => {
                tracing::error!(counter, error = %err, "failed to read transfer snapshot");
                return 0;
            }
        };
        if snapshot.is_null() {
            return 0;
        }
        let Some(accessor) = methods
            .snapshots
            .iter()
            .find(|s| ctx.is_instance_of(snapshot.raw(), s.class.raw()))
        else {
            tracing::warn!(counter, "transfer snapshot has an unexpected type");
            return 0;
        };
        match ctx.call_method(snapshot.raw(), method(accessor), &[]) {
            Ok(value) => value.as_long().unwrap_or(0),
            Err(err) => {
                tracing::error!(counter, error = %err, "failed to read transfer counter");
                0
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use hostbridge_env::CallKind;
    use hostbridge_testing::{
        DOWNLOAD_SNAPSHOT_CLASS, MockHost, TRANSFER_TASK_CLASS, UPLOAD_SNAPSHOT_CLASS,
    };

    pub(crate) fn transfer_methods(ctx: &HostContext) -> Arc<TransferMethods> {
        let method = |class: RawObject, name: &str, descriptor: &str| {
            ctx.method_id(class, name, descriptor, CallKind::Instance)
                .unwrap()
        };
        let snapshots = [UPLOAD_SNAPSHOT_CLASS, DOWNLOAD_SNAPSHOT_CLASS]
            .into_iter()
            .map(|name| {
                let class = ctx.local(ctx.find_class(name).unwrap());
                SnapshotAccessor {
                    bytes_transferred: method(class.raw(), "getBytesTransferred", "()J"),
                    total_byte_count: method(class.raw(), "getTotalByteCount", "()J"),
                    class: class.to_durable(),
                }
            })
            .collect();
        let task = ctx.local(ctx.find_class(TRANSFER_TASK_CLASS).unwrap());
        Arc::new(TransferMethods {
            pause: method(task.raw(), "pause", "()Z"),
            resume: method(task.raw(), "resume", "()Z"),
            cancel: method(task.raw(), "cancel", "()Z"),
            is_paused: method(task.raw(), "isPaused", "()Z"),
            snapshot: method(task.raw(), "getSnapshot", "()Lhost/storage/Snapshot;"),
            snapshots,
        })
    }

    fn controller_for(
        host: &MockHost,
        ctx: &HostContext,
        download: bool,
        total: i64,
    ) -> Controller {
        let task = ctx.local(host.new_transfer_task(download, total));
        Controller::new(task.to_durable(), transfer_methods(ctx))
    }

    #[test]
    fn test_pause_and_resume() {
        let host = MockHost::new();
        host.install_transfer_classes();
        let ctx = host.context();
        let controller = controller_for(&host, &ctx, false, 100);

        assert!(controller.is_valid());
        assert!(!controller.is_paused());
        assert!(controller.pause());
        assert!(controller.is_paused());
        assert!(controller.resume());
        assert!(!controller.is_paused());
        assert!(!controller.resume());
    }

    #[test]
    fn test_byte_counts_follow_snapshot_type() {
        let host = MockHost::new();
        host.install_transfer_classes();
        let ctx = host.context();

        let upload = controller_for(&host, &ctx, false, 2048);
        host.set_transferred(upload.task(), 512);
        assert_eq!(upload.bytes_transferred(), 512);
        assert_eq!(upload.total_byte_count(), 2048);

        let download = controller_for(&host, &ctx, true, -1);
        host.set_transferred(download.task(), 64);
        assert_eq!(download.bytes_transferred(), 64);
        assert_eq!(download.total_byte_count(), -1);

        assert_eq!(host.live_local_refs(), 0);
    }

    #[test]
    fn test_cancel_finishes_task() {
        let host = MockHost::new();
        host.install_transfer_classes();
        let ctx = host.context();
        let controller = controller_for(&host, &ctx, false, 10);

        assert!(controller.cancel());
        assert!(host.is_task_finished(controller.task()));
        assert!(!controller.pause());
        assert!(!controller.cancel());
    }

    #[test]
    fn test_rejected_requests_report_false() {
        let host = MockHost::new();
        host.install_transfer_classes();
        let ctx = host.context();
        let controller = controller_for(&host, &ctx, false, 10);
        host.break_controls(controller.task());

        assert!(!controller.pause());
        assert!(!controller.resume());
        assert!(!controller.cancel());
        assert!(!host.is_task_finished(controller.task()));
    }

    #[test]
    fn test_default_controller_is_inert() {
        let controller = Controller::default();
        assert!(!controller.is_valid());
        assert!(!controller.pause());
        assert!(!controller.is_paused());
        assert_eq!(controller.bytes_transferred(), 0);
        assert_eq!(controller.total_byte_count(), 0);
    }
}
