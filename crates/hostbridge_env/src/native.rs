use std::fmt;

/// Address of a native entry point the host may route calls to.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeEntry(*const ());

// Entry points are code addresses; they are never dereferenced as data.
unsafe impl Send for NativeEntry {}
unsafe impl Sync for NativeEntry {}

impl NativeEntry {
    #[inline]
    pub const fn new(ptr: *const ()) -> Self {
        Self(ptr)
    }

    #[inline]
    pub const fn as_ptr(self) -> *const () {
        self.0
    }
}

impl fmt::Debug for NativeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeEntry({:p})", self.0)
    }
}

/// One row of a native callback registration table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeMethod {
    /// Name the host exposes the entry point under.
    pub name: &'static str,
    /// Host type descriptor of the entry point.
    pub descriptor: &'static str,
    pub entry: NativeEntry,
}

impl NativeMethod {
    pub const fn new(name: &'static str, descriptor: &'static str, entry: NativeEntry) -> Self {
        Self {
            name,
            descriptor,
            entry,
        }
    }
}
