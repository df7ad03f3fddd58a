use std::sync::Arc;

use hostbridge_env::{CallKind, HostResult, HostValue, RawObject};

use crate::MockHost;

/// Body of a mock method. Runs without the host lock held, so it may call
/// back into the host.
pub type Behavior = Arc<dyn Fn(MockCall<'_>) -> HostResult<HostValue> + Send + Sync>;

/// Arguments of one mock method invocation.
pub struct MockCall<'a> {
    pub host: &'a MockHost,
    /// Receiver handle, or the class handle for static calls.
    pub this: RawObject,
    pub args: &'a [HostValue],
}

#[derive(Clone)]
pub(crate) struct MethodDef {
    pub name: String,
    pub descriptor: String,
    pub kind: CallKind,
    pub behavior: Option<Behavior>,
}

#[derive(Clone)]
pub(crate) struct FieldDef {
    pub name: String,
    pub descriptor: String,
    pub kind: CallKind,
    pub initial: HostValue,
}

/// Builder for a fake host type.
#[derive(Clone)]
pub struct ClassDef {
    pub(crate) name: String,
    pub(crate) superclass: Option<String>,
    pub(crate) methods: Vec<MethodDef>,
    pub(crate) fields: Vec<FieldDef>,
}

impl ClassDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superclass: None,
            methods: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    /// Instance method that returns `Void`.
    pub fn method(self, name: &str, descriptor: &str) -> Self {
        self.push_method(name, descriptor, CallKind::Instance, None)
    }

    pub fn static_method(self, name: &str, descriptor: &str) -> Self {
        self.push_method(name, descriptor, CallKind::Static, None)
    }

    pub fn method_with<F>(self, name: &str, descriptor: &str, behavior: F) -> Self
    where
        F: Fn(MockCall<'_>) -> HostResult<HostValue> + Send + Sync + 'static,
    {
        self.push_method(name, descriptor, CallKind::Instance, Some(Arc::new(behavior)))
    }

    pub fn static_method_with<F>(self, name: &str, descriptor: &str, behavior: F) -> Self
    where
        F: Fn(MockCall<'_>) -> HostResult<HostValue> + Send + Sync + 'static,
    {
        self.push_method(name, descriptor, CallKind::Static, Some(Arc::new(behavior)))
    }

    pub fn field(mut self, name: &str, descriptor: &str, initial: HostValue) -> Self {
        self.fields.push(FieldDef {
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            kind: CallKind::Instance,
            initial,
        });
        self
    }

    pub fn static_field(mut self, name: &str, descriptor: &str, value: HostValue) -> Self {
        self.fields.push(FieldDef {
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            kind: CallKind::Static,
            initial: value,
        });
        self
    }

    fn push_method(
        mut self,
        name: &str,
        descriptor: &str,
        kind: CallKind,
        behavior: Option<Behavior>,
    ) -> Self {
        self.methods.push(MethodDef {
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            kind,
            behavior,
        });
        self
    }

    pub(crate) fn find_method(
        &self,
        name: &str,
        descriptor: &str,
        kind: CallKind,
    ) -> Option<&MethodDef> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor && m.kind == kind)
    }

    pub(crate) fn find_field(
        &self,
        name: &str,
        descriptor: &str,
        kind: CallKind,
    ) -> Option<&FieldDef> {
        self.fields
            .iter()
            .find(|f| f.name == name && f.descriptor == descriptor && f.kind == kind)
    }
}
