use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::mem::{self, ManuallyDrop};

use crate::context::HostContext;
use crate::handle::RawObject;
use crate::reference::Durable;

/// Call-scoped host reference.
pub struct Local<'ctx> {
    ctx: Option<&'ctx HostContext>,
    raw: RawObject,
    // Local references are only valid on the thread of the inbound call.
    _not_send: PhantomData<*const ()>,
}

impl<'ctx> Local<'ctx> {
    /// Takes ownership of a local reference received from the host.
    pub fn new(ctx: &'ctx HostContext, raw: RawObject) -> Self {
        Self {
            ctx: (!raw.is_null()).then_some(ctx),
            raw,
            _not_send: PhantomData,
        }
    }

    pub const fn null() -> Self {
        Self {
            ctx: None,
            raw: RawObject::NULL,
            _not_send: PhantomData,
        }
    }

    #[inline]
    pub fn raw(&self) -> RawObject {
        self.raw
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.raw.is_null()
    }

    pub fn context(&self) -> Option<&'ctx HostContext> {
        self.ctx
    }

    /// Creates a new durable reference to the same object. `self` stays valid.
    pub fn to_durable(&self) -> Durable {
        match self.ctx {
            Some(ctx) if !self.raw.is_null() => Durable::promote(ctx, self.raw),
            _ => Durable::default(),
        }
    }

    /// Deletes the local reference. Calling this on a null or already
    /// released reference does nothing.
    pub fn release(&mut self) {
        let raw = mem::take(&mut self.raw);
        if let Some(ctx) = self.ctx.take()
            && !raw.is_null()
        {
            ctx.delete_local_ref(raw);
        }
    }

    /// Moves the reference out, leaving `self` null.
    pub fn take(&mut self) -> Self {
        mem::take(self)
    }

    /// Gives up ownership without deleting the host reference, e.g. when
    /// returning it from a native entry point.
    pub fn into_raw(self) -> RawObject {
        let this = ManuallyDrop::new(self);
        this.raw
    }
}

impl Default for Local<'_> {
    fn default() -> Self {
        Self::null()
    }
}

impl Clone for Local<'_> {
    fn clone(&self) -> Self {
        match self.ctx {
            Some(ctx) if !self.raw.is_null() => Self {
                ctx: Some(ctx),
                raw: ctx.new_local_ref(self.raw),
                _not_send: PhantomData,
            },
            _ => Self::null(),
        }
    }
}

impl Drop for Local<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

impl PartialEq for Local<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Local<'_> {}

impl PartialOrd for Local<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Local<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl Hash for Local<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl fmt::Debug for Local<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Local({})", self.raw)
    }
}
