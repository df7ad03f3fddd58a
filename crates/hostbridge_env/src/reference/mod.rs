//! Ownership wrappers for host object handles.
//!
//! A [`Local`] is tied to the lifetime of the borrowed [`crate::HostContext`]
//! of the current inbound call and cannot leave the thread. A [`Durable`]
//! owns its own context clone and may be stored and sent anywhere. Both
//! release their host reference on drop, and releasing twice is a no-op.

mod durable;
mod local;

pub use durable::Durable;
pub use local::Local;
