//! Declarative signature tables consumed at acquire time.

use hostbridge_env::{CallKind, NativeMethod};

/// Whether a missing class or member fails the acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Requirement {
    #[default]
    Required,
    /// Absent at this host version; callers check before use.
    Optional,
}

/// One `(name, descriptor, call-kind, requirement)` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemberSignature {
    pub name: &'static str,
    pub descriptor: &'static str,
    pub kind: CallKind,
    pub requirement: Requirement,
}

pub(crate) type MemberKey = (&'static str, &'static str, CallKind);

impl MemberSignature {
    pub const fn new(
        name: &'static str,
        descriptor: &'static str,
        kind: CallKind,
        requirement: Requirement,
    ) -> Self {
        Self {
            name,
            descriptor,
            kind,
            requirement,
        }
    }

    pub const fn required(name: &'static str, descriptor: &'static str, kind: CallKind) -> Self {
        Self::new(name, descriptor, kind, Requirement::Required)
    }

    pub const fn optional(name: &'static str, descriptor: &'static str, kind: CallKind) -> Self {
        Self::new(name, descriptor, kind, Requirement::Optional)
    }

    pub const fn is_optional(&self) -> bool {
        matches!(self.requirement, Requirement::Optional)
    }

    pub(crate) const fn key(&self) -> MemberKey {
        (self.name, self.descriptor, self.kind)
    }
}

/// Dense index of a member within its table.
pub trait MemberIndex: Copy {
    fn index(self) -> usize;
}

/// Compile-time description of one host type. Usually generated by
/// [`crate::bind_class!`].
pub trait ClassTable: 'static {
    const CLASS_NAME: &'static str;
    const CLASS_REQUIREMENT: Requirement = Requirement::Required;
    /// Indexed by `Self::Method`.
    const METHODS: &'static [MemberSignature];
    /// Indexed by `Self::Field`.
    const FIELDS: &'static [MemberSignature];

    type Method: MemberIndex;
    type Field: MemberIndex;

    /// Native entry points to register on the type.
    fn natives() -> Vec<NativeMethod> {
        Vec::new()
    }
}

/// Type-erased view of a table handed to the registry.
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub class_name: &'static str,
    pub requirement: Requirement,
    pub methods: &'static [MemberSignature],
    pub fields: &'static [MemberSignature],
    pub natives: Vec<NativeMethod>,
}

impl TableSpec {
    pub fn of<T: ClassTable>() -> Self {
        Self {
            class_name: T::CLASS_NAME,
            requirement: T::CLASS_REQUIREMENT,
            methods: T::METHODS,
            fields: T::FIELDS,
            natives: T::natives(),
        }
    }
}

/// In-memory type definition searched when a class is not visible on the
/// default lookup path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionBlob {
    pub name: String,
    pub data: Vec<u8>,
}

impl DefinitionBlob {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}
