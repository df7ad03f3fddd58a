use std::sync::atomic::{AtomicBool, Ordering};

use ahash::AHashMap;
use hostbridge_env::{
    Durable, FieldId, HostContext, HostResult, Local, MethodId, NativeMethod, RawObject,
};
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};

use crate::error::BindError;
use crate::signature::{DefinitionBlob, MemberKey, MemberSignature, Requirement, TableSpec};

/// Process-wide record for one bound host type.
///
/// Cached identifiers are only valid while `ref_count > 0`; the binding is
/// removed from its registry when the count returns to zero.
#[derive(Debug)]
pub struct ClassBinding {
    class: Durable,
    absent: bool,
    methods: AHashMap<MemberKey, Option<MethodId>>,
    fields: AHashMap<MemberKey, Option<FieldId>>,
    natives_registered: bool,
    ref_count: usize,
}

impl ClassBinding {
    pub fn class(&self) -> RawObject {
        self.class.raw()
    }

    /// Whether the type was optional and not found.
    pub fn is_absent(&self) -> bool {
        self.absent
    }

    pub fn natives_registered(&self) -> bool {
        self.natives_registered
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count
    }
}

/// Members resolved by one acquire call, not yet published.
#[derive(Default)]
struct Resolved {
    methods: Vec<(MemberKey, Option<MethodId>)>,
    fields: Vec<(MemberKey, Option<FieldId>)>,
}

/// Registry of class bindings keyed by type name.
pub struct ClassRegistry {
    bindings: RwLock<AHashMap<String, ClassBinding>>,
    // Serializes acquire/release so host calls can run outside `bindings`.
    lifecycle: Mutex<()>,
    resolutions: Mutex<AHashMap<String, usize>>,
    log_members: AtomicBool,
}

impl std::fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassRegistry")
            .field("bindings", &self.bindings.read().len())
            .finish_non_exhaustive()
    }
}

pub static GLOBAL_CLASS_REGISTRY: Lazy<ClassRegistry> = Lazy::new(ClassRegistry::default);

impl Default for ClassRegistry {
    fn default() -> Self {
        Self {
            bindings: RwLock::new(AHashMap::new()),
            lifecycle: Mutex::new(()),
            resolutions: Mutex::new(AHashMap::new()),
            log_members: AtomicBool::new(true),
        }
    }
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static ClassRegistry {
        &GLOBAL_CLASS_REGISTRY
    }

    /// Toggles the per-member debug events emitted during resolution.
    pub fn set_log_members(&self, enabled: bool) {
        self.log_members.store(enabled, Ordering::Relaxed);
    }

    /// Acquires the binding for `table.class_name`.
    ///
    /// The first acquire resolves the type (falling back to `blobs`), every
    /// declared member, and registers `table.natives`. Later acquires only
    /// resolve members no earlier table declared and bump the count. On
    /// failure nothing this call did is left behind.
    pub fn acquire(
        &self,
        ctx: &HostContext,
        table: &TableSpec,
        blobs: &[DefinitionBlob],
    ) -> Result<(), BindError> {
        let _lifecycle = self.lifecycle.lock();

        let existing = self.bindings.read().get(table.class_name).map(|binding| {
            (
                binding.class.raw(),
                binding.absent,
                binding.natives_registered,
            )
        });

        match existing {
            Some((class, absent, natives_registered)) => {
                self.acquire_existing(ctx, table, class, absent, natives_registered)
            }
            None => self.acquire_new(ctx, table, blobs),
        }
    }

    fn acquire_existing(
        &self,
        ctx: &HostContext,
        table: &TableSpec,
        class: RawObject,
        absent: bool,
        natives_registered: bool,
    ) -> Result<(), BindError> {
        if absent && table.requirement == Requirement::Required {
            tracing::error!(class = table.class_name, "required class is absent");
            return Err(BindError::ClassNotFound {
                class: table.class_name.to_owned(),
            });
        }

        let resolved = {
            let bindings = self.bindings.read();
            let binding = bindings.get(table.class_name);
            let methods: Vec<_> = table
                .methods
                .iter()
                .filter(|sig| binding.is_none_or(|b| !b.methods.contains_key(&sig.key())))
                .copied()
                .collect();
            let fields: Vec<_> = table
                .fields
                .iter()
                .filter(|sig| binding.is_none_or(|b| !b.fields.contains_key(&sig.key())))
                .copied()
                .collect();
            (methods, fields)
        };
        let resolved = if absent {
            absent_members(&resolved.0, &resolved.1)
        } else {
            self.resolve_members(ctx, table.class_name, class, &resolved.0, &resolved.1)?
        };

        let register = !absent && !natives_registered && !table.natives.is_empty();
        if register {
            register_on(ctx, table.class_name, class, &table.natives)?;
        }

        let mut bindings = self.bindings.write();
        if let Some(binding) = bindings.get_mut(table.class_name) {
            binding.methods.extend(resolved.methods);
            binding.fields.extend(resolved.fields);
            binding.natives_registered |= register;
            binding.ref_count += 1;
            tracing::debug!(
                class = table.class_name,
                ref_count = binding.ref_count,
                "class binding shared"
            );
        }
        Ok(())
    }

    fn acquire_new(
        &self,
        ctx: &HostContext,
        table: &TableSpec,
        blobs: &[DefinitionBlob],
    ) -> Result<(), BindError> {
        *self
            .resolutions
            .lock()
            .entry(table.class_name.to_owned())
            .or_default() += 1;

        let Some(local) = find_class(ctx, table.class_name, blobs) else {
            if table.requirement == Requirement::Optional {
                tracing::debug!(class = table.class_name, "optional class absent");
                let resolved = absent_members(table.methods, table.fields);
                self.publish(table.class_name, Durable::default(), true, resolved, false);
                return Ok(());
            }
            tracing::error!(class = table.class_name, "failed to resolve class");
            return Err(BindError::ClassNotFound {
                class: table.class_name.to_owned(),
            });
        };
        // Dropping `class` on any early return below releases it.
        let class = local.to_durable();
        drop(local);

        let resolved =
            self.resolve_members(ctx, table.class_name, class.raw(), table.methods, table.fields)?;

        let register = !table.natives.is_empty();
        if register {
            register_on(ctx, table.class_name, class.raw(), &table.natives)?;
        }

        self.publish(table.class_name, class, false, resolved, register);
        Ok(())
    }

    fn publish(
        &self,
        name: &str,
        class: Durable,
        absent: bool,
        resolved: Resolved,
        natives_registered: bool,
    ) {
        tracing::debug!(class = name, absent, natives_registered, "class binding created");
        self.bindings.write().insert(
            name.to_owned(),
            ClassBinding {
                class,
                absent,
                methods: resolved.methods.into_iter().collect(),
                fields: resolved.fields.into_iter().collect(),
                natives_registered,
                ref_count: 1,
            },
        );
    }

    fn resolve_members(
        &self,
        ctx: &HostContext,
        class_name: &str,
        class: RawObject,
        methods: &[MemberSignature],
        fields: &[MemberSignature],
    ) -> Result<Resolved, BindError> {
        let log = self.log_members.load(Ordering::Relaxed);
        let mut resolved = Resolved::default();
        for sig in methods {
            let id = lookup(class_name, sig, log, |s| {
                ctx.method_id(class, s.name, s.descriptor, s.kind)
            })?;
            resolved.methods.push((sig.key(), id));
        }
        for sig in fields {
            let id = lookup(class_name, sig, log, |s| {
                ctx.field_id(class, s.name, s.descriptor, s.kind)
            })?;
            resolved.fields.push((sig.key(), id));
        }
        Ok(resolved)
    }

    /// Drops one reference. At zero the natives are unregistered and the
    /// type reference is released.
    pub fn release(&self, ctx: &HostContext, class_name: &str) {
        let _lifecycle = self.lifecycle.lock();
        let removed = {
            let mut bindings = self.bindings.write();
            let Some(binding) = bindings.get_mut(class_name) else {
                tracing::error!(class = class_name, "release of class that is not bound");
                return;
            };
            binding.ref_count = binding.ref_count.saturating_sub(1);
            if binding.ref_count > 0 {
                return;
            }
            bindings.remove(class_name)
        };
        let Some(mut binding) = removed else {
            return;
        };
        if binding.natives_registered
            && let Err(err) = ctx.unregister_natives(binding.class.raw())
        {
            tracing::warn!(class = class_name, error = %err, "failed to unregister natives");
        }
        binding.class.release();
        tracing::debug!(class = class_name, "class binding released");
    }

    /// Registers natives on an acquired type outside of a table.
    ///
    /// # Panics
    ///
    /// If `class_name` is not acquired.
    pub fn register_natives(
        &self,
        ctx: &HostContext,
        class_name: &str,
        natives: &[NativeMethod],
    ) -> Result<(), BindError> {
        let _lifecycle = self.lifecycle.lock();
        let (class, registered) =
            self.with_binding(class_name, |b| (b.class.raw(), b.natives_registered));
        if registered {
            tracing::warn!(class = class_name, "natives already registered");
            return Err(BindError::AlreadyRegistered {
                class: class_name.to_owned(),
            });
        }
        register_on(ctx, class_name, class, natives)?;
        if let Some(binding) = self.bindings.write().get_mut(class_name) {
            binding.natives_registered = true;
        }
        Ok(())
    }

    /// # Panics
    ///
    /// If `class_name` is not acquired or `sig` was never declared.
    pub fn method(&self, class_name: &str, sig: &MemberSignature) -> Option<MethodId> {
        self.with_binding(class_name, |b| {
            *b.methods.get(&sig.key()).unwrap_or_else(|| {
                panic!("method `{}` was not declared for `{class_name}`", sig.name)
            })
        })
    }

    /// # Panics
    ///
    /// If `class_name` is not acquired or `sig` was never declared.
    pub fn field(&self, class_name: &str, sig: &MemberSignature) -> Option<FieldId> {
        self.with_binding(class_name, |b| {
            *b.fields.get(&sig.key()).unwrap_or_else(|| {
                panic!("field `{}` was not declared for `{class_name}`", sig.name)
            })
        })
    }

    /// Durable type handle, null when the type is optional and absent.
    ///
    /// # Panics
    ///
    /// If `class_name` is not acquired.
    pub fn class(&self, class_name: &str) -> RawObject {
        self.with_binding(class_name, ClassBinding::class)
    }

    /// New call-scoped reference to the bound type.
    pub fn class_local<'ctx>(&self, ctx: &'ctx HostContext, class_name: &str) -> Local<'ctx> {
        self.with_binding(class_name, |b| b.class.to_local(ctx))
    }

    pub fn is_acquired(&self, class_name: &str) -> bool {
        self.bindings
            .read()
            .get(class_name)
            .is_some_and(|b| b.ref_count > 0)
    }

    pub fn is_absent(&self, class_name: &str) -> bool {
        self.with_binding(class_name, ClassBinding::is_absent)
    }

    pub fn ref_count(&self, class_name: &str) -> usize {
        self.bindings
            .read()
            .get(class_name)
            .map_or(0, ClassBinding::ref_count)
    }

    pub fn natives_registered(&self, class_name: &str) -> bool {
        self.bindings
            .read()
            .get(class_name)
            .is_some_and(ClassBinding::natives_registered)
    }

    /// How many times the type itself has been resolved from scratch.
    pub fn resolution_count(&self, class_name: &str) -> usize {
        self.resolutions
            .lock()
            .get(class_name)
            .copied()
            .unwrap_or(0)
    }

    fn with_binding<R>(&self, class_name: &str, f: impl FnOnce(&ClassBinding) -> R) -> R {
        let bindings = self.bindings.read();
        match bindings.get(class_name) {
            Some(binding) if binding.ref_count > 0 => f(binding),
            _ => panic!("class `{class_name}` used while not acquired"),
        }
    }
}

fn find_class<'ctx>(
    ctx: &'ctx HostContext,
    name: &str,
    blobs: &[DefinitionBlob],
) -> Option<Local<'ctx>> {
    match ctx.find_class(name) {
        Ok(raw) => return Some(ctx.local(raw)),
        Err(err) => tracing::debug!(class = name, error = %err, "class not on default path"),
    }
    blobs
        .iter()
        .filter(|blob| blob.name == name)
        .find_map(|blob| match ctx.define_class(name, &blob.data) {
            Ok(raw) => {
                tracing::debug!(class = name, "class defined from embedded blob");
                Some(ctx.local(raw))
            }
            Err(err) => {
                tracing::debug!(class = name, error = %err, "definition blob rejected");
                None
            }
        })
}

fn lookup<Id>(
    class_name: &str,
    sig: &MemberSignature,
    log: bool,
    resolve: impl FnOnce(&MemberSignature) -> HostResult<Id>,
) -> Result<Option<Id>, BindError> {
    let result = resolve(sig);
    if log {
        tracing::debug!(
            class = class_name,
            member = sig.name,
            descriptor = sig.descriptor,
            kind = %sig.kind,
            optional = sig.is_optional(),
            found = result.is_ok(),
            "member lookup"
        );
    }
    match result {
        Ok(id) => Ok(Some(id)),
        Err(_) if sig.is_optional() => Ok(None),
        Err(err) => {
            tracing::error!(
                class = class_name,
                member = sig.name,
                descriptor = sig.descriptor,
                error = %err,
                "required member missing"
            );
            Err(BindError::MissingMember {
                class: class_name.to_owned(),
                name: sig.name,
                descriptor: sig.descriptor,
                kind: sig.kind,
            })
        }
    }
}

fn absent_members(methods: &[MemberSignature], fields: &[MemberSignature]) -> Resolved {
    Resolved {
        methods: methods.iter().map(|sig| (sig.key(), None)).collect(),
        fields: fields.iter().map(|sig| (sig.key(), None)).collect(),
    }
}

fn register_on(
    ctx: &HostContext,
    class_name: &str,
    class: RawObject,
    natives: &[NativeMethod],
) -> Result<(), BindError> {
    ctx.register_natives(class, natives).map_err(|source| {
        tracing::error!(class = class_name, error = %source, "native registration failed");
        BindError::Natives {
            class: class_name.to_owned(),
            source,
        }
    })?;
    tracing::debug!(class = class_name, count = natives.len(), "natives registered");
    Ok(())
}
