//! Fake long-running transfer tasks with pause/resume/cancel controls.

use hostbridge_env::{HostEnv, HostError, HostResult, HostValue, ProgressKind, RawObject};

use crate::class::{ClassDef, MockCall};
use crate::{MockHost, TASK_CLASS};

pub const TRANSFER_TASK_CLASS: &str = "host.storage.TransferTask";
pub const UPLOAD_SNAPSHOT_CLASS: &str = "host.storage.UploadSnapshot";
pub const DOWNLOAD_SNAPSHOT_CLASS: &str = "host.storage.DownloadSnapshot";

pub const STORAGE_EXCEPTION_CLASS: &str = "host.storage.StorageException";

fn ensure_controllable(call: &MockCall<'_>) -> HostResult<()> {
    if call.host.field_value(call.this, "broken") == Some(HostValue::Bool(true)) {
        return Err(HostError::exception(
            STORAGE_EXCEPTION_CLASS,
            "transfer rejected the request",
        ));
    }
    Ok(())
}

fn snapshot_class(byte_counter: &'static str) -> ClassDef {
    ClassDef::new(byte_counter)
        .field("transferred", "J", HostValue::Long(0))
        .field("total", "J", HostValue::Long(-1))
        .method_with("getBytesTransferred", "()J", |call| {
            Ok(call
                .host
                .field_value(call.this, "transferred")
                .unwrap_or_default())
        })
        .method_with("getTotalByteCount", "()J", |call| {
            Ok(call
                .host
                .field_value(call.this, "total")
                .unwrap_or_default())
        })
}

impl MockHost {
    /// Defines the transfer task and snapshot types.
    pub fn install_transfer_classes(&self) {
        self.define(snapshot_class(UPLOAD_SNAPSHOT_CLASS));
        self.define(snapshot_class(DOWNLOAD_SNAPSHOT_CLASS));
        self.define(ClassDef::new(STORAGE_EXCEPTION_CLASS).extends(crate::THROWABLE_CLASS));
        self.define(
            ClassDef::new(TRANSFER_TASK_CLASS)
                .extends(TASK_CLASS)
                .field("paused", "Z", HostValue::Bool(false))
                .field("transferred", "J", HostValue::Long(0))
                .field("total", "J", HostValue::Long(-1))
                .field("download", "Z", HostValue::Bool(false))
                .field("broken", "Z", HostValue::Bool(false))
                .method_with("pause", "()Z", |call| {
                    ensure_controllable(&call)?;
                    if call.host.is_task_finished(call.this) {
                        return Ok(HostValue::Bool(false));
                    }
                    call.host.set_field(call.this, "paused", HostValue::Bool(true));
                    let snapshot = call.host.snapshot(call.this);
                    call.host.emit_progress(call.this, ProgressKind::Paused, snapshot);
                    call.host.delete_local_ref(snapshot);
                    Ok(HostValue::Bool(true))
                })
                .method_with("resume", "()Z", |call| {
                    ensure_controllable(&call)?;
                    let paused =
                        call.host.field_value(call.this, "paused") == Some(HostValue::Bool(true));
                    if !paused || call.host.is_task_finished(call.this) {
                        return Ok(HostValue::Bool(false));
                    }
                    call.host.set_field(call.this, "paused", HostValue::Bool(false));
                    Ok(HostValue::Bool(true))
                })
                .method_with("cancel", "()Z", |call| {
                    ensure_controllable(&call)?;
                    Ok(HostValue::Bool(call.host.cancel_task(call.this)))
                })
                .method_with("isPaused", "()Z", |call| {
                    Ok(call
                        .host
                        .field_value(call.this, "paused")
                        .unwrap_or(HostValue::Bool(false)))
                })
                .method_with("getSnapshot", "()Lhost/storage/Snapshot;", |call| {
                    Ok(HostValue::Object(call.host.snapshot(call.this)))
                }),
        );
    }

    /// New transfer task as a local reference. `install_transfer_classes`
    /// must have been called.
    pub fn new_transfer_task(&self, download: bool, total: i64) -> RawObject {
        let task = self.new_task_of(TRANSFER_TASK_CLASS);
        self.set_field(task, "download", HostValue::Bool(download));
        self.set_field(task, "total", HostValue::Long(total));
        task
    }

    pub fn set_transferred(&self, task: RawObject, bytes: i64) {
        self.set_field(task, "transferred", HostValue::Long(bytes));
    }

    /// Makes every control request on `task` throw.
    pub fn break_controls(&self, task: RawObject) {
        self.set_field(task, "broken", HostValue::Bool(true));
    }

    /// Point-in-time snapshot of a transfer task as a local reference.
    pub fn snapshot(&self, task: RawObject) -> RawObject {
        let download = self.field_value(task, "download") == Some(HostValue::Bool(true));
        let class = if download {
            DOWNLOAD_SNAPSHOT_CLASS
        } else {
            UPLOAD_SNAPSHOT_CLASS
        };
        let snapshot = self.new_instance(class);
        for name in ["transferred", "total"] {
            if let Some(value) = self.field_value(task, name) {
                self.set_field(snapshot, name, value);
            }
        }
        snapshot
    }

    /// Emits a progress notification carrying a fresh snapshot.
    pub fn emit_transfer_progress(&self, task: RawObject) -> usize {
        let snapshot = self.snapshot(task);
        let delivered = self.emit_progress(task, ProgressKind::Progress, snapshot);
        self.delete_local_ref(snapshot);
        delivered
    }
}
