use std::marker::PhantomData;

use hostbridge_env::{FieldId, HostContext, Local, MethodId, RawObject};

use crate::error::BindError;
use crate::registry::ClassRegistry;
use crate::signature::{ClassTable, DefinitionBlob, MemberIndex, TableSpec};

/// Typed handle over the registry entry for `T`.
///
/// Copies are free; every acquire must be paired with a release.
pub struct Binding<'r, T: ClassTable> {
    registry: &'r ClassRegistry,
    _table: PhantomData<fn() -> T>,
}

impl<T: ClassTable> Clone for Binding<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ClassTable> Copy for Binding<'_, T> {}

impl<T: ClassTable> std::fmt::Debug for Binding<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("registry", self.registry)
            .finish_non_exhaustive()
    }
}

impl<T: ClassTable> Binding<'static, T> {
    pub fn global() -> Self {
        Self::in_registry(ClassRegistry::global())
    }
}

impl<'r, T: ClassTable> Binding<'r, T> {
    pub fn in_registry(registry: &'r ClassRegistry) -> Self {
        Self {
            registry,
            _table: PhantomData,
        }
    }

    pub fn class_name(&self) -> &'static str {
        T::CLASS_NAME
    }

    pub fn acquire(&self, ctx: &HostContext) -> Result<(), BindError> {
        self.acquire_with_blobs(ctx, &[])
    }

    pub fn acquire_with_blobs(
        &self,
        ctx: &HostContext,
        blobs: &[DefinitionBlob],
    ) -> Result<(), BindError> {
        self.registry.acquire(ctx, &TableSpec::of::<T>(), blobs)
    }

    pub fn release(&self, ctx: &HostContext) {
        self.registry.release(ctx, T::CLASS_NAME);
    }

    pub fn is_acquired(&self) -> bool {
        self.registry.is_acquired(T::CLASS_NAME)
    }

    /// Whether the type was resolved. Always true for required types.
    pub fn is_present(&self) -> bool {
        !self.registry.is_absent(T::CLASS_NAME)
    }

    pub fn class(&self) -> RawObject {
        self.registry.class(T::CLASS_NAME)
    }

    pub fn class_local<'ctx>(&self, ctx: &'ctx HostContext) -> Local<'ctx> {
        self.registry.class_local(ctx, T::CLASS_NAME)
    }

    /// # Panics
    ///
    /// If the binding is not acquired or the member is absent.
    pub fn method(&self, method: T::Method) -> MethodId {
        let sig = &T::METHODS[method.index()];
        self.registry
            .method(T::CLASS_NAME, sig)
            .unwrap_or_else(|| panic!("method `{}` absent on `{}`", sig.name, T::CLASS_NAME))
    }

    pub fn optional_method(&self, method: T::Method) -> Option<MethodId> {
        self.registry
            .method(T::CLASS_NAME, &T::METHODS[method.index()])
    }

    /// # Panics
    ///
    /// If the binding is not acquired or the member is absent.
    pub fn field(&self, field: T::Field) -> FieldId {
        let sig = &T::FIELDS[field.index()];
        self.registry
            .field(T::CLASS_NAME, sig)
            .unwrap_or_else(|| panic!("field `{}` absent on `{}`", sig.name, T::CLASS_NAME))
    }

    pub fn optional_field(&self, field: T::Field) -> Option<FieldId> {
        self.registry.field(T::CLASS_NAME, &T::FIELDS[field.index()])
    }

    /// Runtime type check against the bound type. False when absent.
    pub fn is_instance(&self, ctx: &HostContext, obj: RawObject) -> bool {
        let class = self.class();
        !class.is_null() && !obj.is_null() && ctx.is_instance_of(obj, class)
    }
}
