//! An in-process fake host runtime.
//!
//! [`MockHost`] implements every [`hostbridge_env::HostEnv`] operation over a
//! small object heap, and counts the calls tests care about: class
//! resolutions, native registrations, live references, invalid deletes and
//! string reads.

mod class;
mod host;
mod transfer;

pub use class::{Behavior, ClassDef, MockCall};
pub use host::MockHost;
pub use transfer::{
    DOWNLOAD_SNAPSHOT_CLASS, STORAGE_EXCEPTION_CLASS, TRANSFER_TASK_CLASS, UPLOAD_SNAPSHOT_CLASS,
};

pub const STRING_CLASS: &str = "host.lang.String";
pub const THROWABLE_CLASS: &str = "host.lang.Throwable";
pub const TASK_CLASS: &str = "host.tasks.Task";
