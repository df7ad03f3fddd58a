use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem::{self, ManuallyDrop};

use crate::context::HostContext;
use crate::handle::RawObject;
use crate::reference::Local;

/// Host reference that survives beyond the current inbound call.
///
/// Cloning creates a new host-side reference; each clone is released
/// independently.
#[derive(Default)]
pub struct Durable {
    ctx: Option<HostContext>,
    raw: RawObject,
}

impl Durable {
    /// Wraps a handle that is already a durable host reference.
    pub fn adopt(ctx: &HostContext, raw: RawObject) -> Self {
        Self {
            ctx: (!raw.is_null()).then(|| ctx.clone()),
            raw,
        }
    }

    /// Creates a new durable reference to `raw`, which may be of any kind.
    pub fn promote(ctx: &HostContext, raw: RawObject) -> Self {
        if raw.is_null() {
            return Self::default();
        }
        let global = ctx.new_global_ref(raw);
        if global.is_null() {
            tracing::warn!(object = %raw, "host refused a durable reference");
        }
        Self::adopt(ctx, global)
    }

    #[inline]
    pub fn raw(&self) -> RawObject {
        self.raw
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.raw.is_null()
    }

    pub fn context(&self) -> Option<&HostContext> {
        self.ctx.as_ref()
    }

    /// Creates a call-scoped reference to the same object in `ctx`.
    pub fn to_local<'ctx>(&self, ctx: &'ctx HostContext) -> Local<'ctx> {
        if self.raw.is_null() {
            return Local::null();
        }
        Local::new(ctx, ctx.new_local_ref(self.raw))
    }

    /// Deletes the durable reference. Idempotent.
    pub fn release(&mut self) {
        let raw = mem::take(&mut self.raw);
        if let Some(ctx) = self.ctx.take()
            && !raw.is_null()
        {
            ctx.delete_global_ref(raw);
        }
    }

    /// Moves the reference out, leaving `self` null.
    pub fn take(&mut self) -> Self {
        mem::take(self)
    }

    /// Gives up ownership without deleting the host reference.
    pub fn into_raw(self) -> RawObject {
        let mut this = ManuallyDrop::new(self);
        drop(this.ctx.take());
        this.raw
    }
}

impl Clone for Durable {
    fn clone(&self) -> Self {
        match &self.ctx {
            Some(ctx) if !self.raw.is_null() => Self::promote(ctx, self.raw),
            _ => Self::default(),
        }
    }
}

impl Drop for Durable {
    fn drop(&mut self) {
        self.release();
    }
}

impl PartialEq for Durable {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Durable {}

impl PartialOrd for Durable {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Durable {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl Hash for Durable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl fmt::Debug for Durable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Durable({})", self.raw)
    }
}
