//! Reference-counted cache of host type and member identifiers.
//!
//! Each host type gets one [`ClassBinding`] in a [`ClassRegistry`], shared by
//! every signature table that names it. Identifiers are resolved once, on the
//! first acquire, and stay valid until the last release.

mod binding;
mod error;
mod macros;
mod registry;
mod signature;

pub use binding::Binding;
pub use error::BindError;
pub use hostbridge_env::{CallKind, NativeMethod};
pub use registry::{ClassBinding, ClassRegistry, GLOBAL_CLASS_REGISTRY};
pub use signature::{
    ClassTable, DefinitionBlob, MemberIndex, MemberSignature, Requirement, TableSpec,
};
