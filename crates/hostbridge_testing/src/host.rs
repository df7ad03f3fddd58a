use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use ahash::AHashMap;
use hostbridge_env::{
    CallKind, CompletionListener, FieldId, HostContext, HostEnv, HostError, HostException,
    HostJob, HostResult, HostValue, ListenerToken, MethodId, NativeMethod, ProgressCallback,
    ProgressEvent, ProgressKind, RawObject, TaskCompletion, TaskStatus,
};
use parking_lot::Mutex;

use crate::class::{Behavior, ClassDef, MockCall};
use crate::{STRING_CLASS, TASK_CLASS, THROWABLE_CLASS};

const CLASS_CLASS: &str = "host.lang.Class";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefKind {
    Local,
    Global,
}

enum Payload {
    Plain,
    Text(String),
    Class(String),
    Throwable(String),
    Task,
}

struct Object {
    class: String,
    payload: Payload,
    fields: AHashMap<String, HostValue>,
}

struct ClassEntry {
    def: ClassDef,
    object: u64,
    statics: AHashMap<String, HostValue>,
}

struct MethodEntry {
    class: String,
    name: String,
    behavior: Option<Behavior>,
}

struct FieldEntry {
    class: String,
    name: String,
}

struct Finished {
    status: TaskStatus,
    result: Option<u64>,
    message: Option<String>,
}

#[derive(Default)]
struct TaskState {
    finished: Option<Finished>,
    completion: Vec<(u64, CompletionListener)>,
    progress: Vec<(u64, ProgressCallback)>,
}

#[derive(Default)]
struct Counters {
    find_class: AHashMap<String, usize>,
    define_class: AHashMap<String, usize>,
    member_lookups: usize,
    register_natives: usize,
    unregister_natives: usize,
    method_calls: AHashMap<String, usize>,
    string_reads: usize,
    invalid_deletes: usize,
}

#[derive(Default)]
struct State {
    next_id: u64,
    refs: AHashMap<u64, (u64, RefKind)>,
    objects: AHashMap<u64, Object>,
    classes: AHashMap<String, ClassEntry>,
    embedded: AHashMap<String, (Vec<u8>, ClassDef)>,
    method_keys: AHashMap<(String, String, String, CallKind), u64>,
    field_keys: AHashMap<(String, String, String, CallKind), u64>,
    methods: AHashMap<u64, MethodEntry>,
    fields: AHashMap<u64, FieldEntry>,
    natives: AHashMap<String, Vec<NativeMethod>>,
    tasks: AHashMap<u64, TaskState>,
    main_jobs: VecDeque<HostJob>,
    background_jobs: VecDeque<HostJob>,
    reject_posts: bool,
    counters: Counters,
}

impl State {
    fn alloc(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn new_ref(&mut self, object: u64, kind: RefKind) -> RawObject {
        let handle = self.alloc();
        self.refs.insert(handle, (object, kind));
        RawObject::from_bits(handle)
    }

    fn object_of(&self, handle: RawObject) -> Option<u64> {
        self.refs.get(&handle.to_bits()).map(|(object, _)| *object)
    }

    fn object(&self, handle: RawObject) -> HostResult<&Object> {
        self.object_of(handle)
            .and_then(|id| self.objects.get(&id))
            .ok_or(HostError::InvalidHandle(handle))
    }

    fn object_mut(&mut self, handle: RawObject) -> HostResult<&mut Object> {
        let id = self
            .object_of(handle)
            .ok_or(HostError::InvalidHandle(handle))?;
        self.objects
            .get_mut(&id)
            .ok_or(HostError::InvalidHandle(handle))
    }

    fn class_name(&self, handle: RawObject) -> HostResult<String> {
        match &self.object(handle)?.payload {
            Payload::Class(name) => Ok(name.clone()),
            _ => Err(HostError::TypeMismatch {
                expected: "class",
                got: self.object(handle)?.class.clone(),
            }),
        }
    }

    fn insert_object(&mut self, class: &str, payload: Payload) -> u64 {
        let mut fields = AHashMap::new();
        for def in self.lineage(class) {
            for field in &def.fields {
                if field.kind == CallKind::Instance {
                    fields.entry(field.name.clone()).or_insert(field.initial);
                }
            }
        }
        let id = self.alloc();
        self.objects.insert(
            id,
            Object {
                class: class.to_owned(),
                payload,
                fields,
            },
        );
        id
    }

    fn define(&mut self, def: ClassDef) -> u64 {
        if let Some(entry) = self.classes.get(&def.name) {
            return entry.object;
        }
        let object = self.alloc();
        self.objects.insert(
            object,
            Object {
                class: CLASS_CLASS.to_owned(),
                payload: Payload::Class(def.name.clone()),
                fields: AHashMap::new(),
            },
        );
        let statics = def
            .fields
            .iter()
            .filter(|field| field.kind == CallKind::Static)
            .map(|field| (field.name.clone(), field.initial))
            .collect();
        self.classes.insert(
            def.name.clone(),
            ClassEntry {
                def,
                object,
                statics,
            },
        );
        object
    }

    /// The class and its ancestors, nearest first.
    fn lineage(&self, class: &str) -> Vec<&ClassDef> {
        let mut chain = Vec::new();
        let mut current = Some(class);
        while let Some(name) = current {
            let Some(entry) = self.classes.get(name) else {
                break;
            };
            chain.push(&entry.def);
            current = entry.def.superclass.as_deref();
        }
        chain
    }

    fn is_subclass(&self, class: &str, ancestor: &str) -> bool {
        class == ancestor || self.lineage(class).iter().any(|def| def.name == ancestor)
    }

    fn count_live(&self, kind: RefKind) -> usize {
        self.refs.values().filter(|(_, k)| *k == kind).count()
    }

    fn delete_ref(&mut self, handle: RawObject, kind: RefKind) {
        if handle.is_null() {
            return;
        }
        let owned = self
            .refs
            .get(&handle.to_bits())
            .is_some_and(|(_, existing)| *existing == kind);
        if owned {
            self.refs.remove(&handle.to_bits());
        } else {
            tracing::warn!(handle = %handle, ?kind, "invalid reference delete");
            self.counters.invalid_deletes += 1;
        }
    }
}

/// Fake host runtime.
pub struct MockHost {
    me: Weak<MockHost>,
    state: Mutex<State>,
}

impl MockHost {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| {
            let mut state = State::default();
            state.define(ClassDef::new(STRING_CLASS));
            state.define(ClassDef::new(THROWABLE_CLASS));
            state.define(ClassDef::new(TASK_CLASS));
            Self {
                me: me.clone(),
                state: Mutex::new(state),
            }
        })
    }

    pub fn context(&self) -> HostContext {
        let me = self
            .me
            .upgrade()
            .unwrap_or_else(|| panic!("MockHost used after it was dropped"));
        HostContext::new(me)
    }

    /// Makes a type visible on the default lookup path.
    pub fn define(&self, def: ClassDef) {
        self.state.lock().define(def);
    }

    /// Makes a type loadable only through `define_class` with `blob`.
    pub fn embed(&self, def: ClassDef, blob: impl Into<Vec<u8>>) {
        self.state
            .lock()
            .embedded
            .insert(def.name.clone(), (blob.into(), def));
    }

    pub fn is_defined(&self, class: &str) -> bool {
        self.state.lock().classes.contains_key(class)
    }

    /// New instance of `class` as a local reference.
    pub fn new_instance(&self, class: &str) -> RawObject {
        let mut state = self.state.lock();
        assert!(state.classes.contains_key(class), "unknown class {class}");
        let id = state.insert_object(class, Payload::Plain);
        state.new_ref(id, RefKind::Local)
    }

    pub fn new_throwable(&self, class: &str, message: &str) -> RawObject {
        let mut state = self.state.lock();
        assert!(
            state.is_subclass(class, THROWABLE_CLASS),
            "{class} is not a throwable"
        );
        let id = state.insert_object(class, Payload::Throwable(message.to_owned()));
        state.new_ref(id, RefKind::Local)
    }

    pub fn new_task(&self) -> RawObject {
        self.new_task_of(TASK_CLASS)
    }

    pub fn new_task_of(&self, class: &str) -> RawObject {
        let mut state = self.state.lock();
        assert!(
            state.is_subclass(class, TASK_CLASS),
            "{class} is not a task type"
        );
        let id = state.insert_object(class, Payload::Task);
        state.tasks.insert(id, TaskState::default());
        state.new_ref(id, RefKind::Local)
    }

    pub fn object_class(&self, obj: RawObject) -> Option<String> {
        self.state.lock().object(obj).ok().map(|o| o.class.clone())
    }

    pub fn field_value(&self, obj: RawObject, name: &str) -> Option<HostValue> {
        self.state
            .lock()
            .object(obj)
            .ok()
            .and_then(|o| o.fields.get(name).copied())
    }

    pub fn set_field(&self, obj: RawObject, name: &str, value: HostValue) {
        assert!(
            !matches!(value, HostValue::Object(_)),
            "object-valued fields are not supported"
        );
        let mut state = self.state.lock();
        if let Ok(object) = state.object_mut(obj) {
            object.fields.insert(name.to_owned(), value);
        }
    }

    /// Finishes a task and fires its completion listeners. Returns `false`
    /// if the task had already finished.
    pub fn complete_task(
        &self,
        task: RawObject,
        status: TaskStatus,
        result: RawObject,
        message: Option<&str>,
    ) -> bool {
        let ctx = self.context();
        let (fired, retired) = {
            let mut state = self.state.lock();
            let Some(task_id) = state.object_of(task) else {
                return false;
            };
            let result_id = state.object_of(result);
            let Some(entry) = state.tasks.get_mut(&task_id) else {
                return false;
            };
            if entry.finished.is_some() {
                return false;
            }
            entry.finished = Some(Finished {
                status,
                result: result_id,
                message: message.map(str::to_owned),
            });
            let retired = std::mem::take(&mut entry.progress);
            let listeners = std::mem::take(&mut entry.completion);
            let fired = listeners
                .into_iter()
                .map(|(_, listener)| {
                    let handle = result_id
                        .map_or(RawObject::NULL, |id| state.new_ref(id, RefKind::Local));
                    (listener, handle)
                })
                .collect::<Vec<_>>();
            (fired, retired)
        };
        // Callbacks may own references; drop them with the lock released.
        drop(retired);
        for (listener, handle) in fired {
            listener(
                &ctx,
                TaskCompletion {
                    status,
                    result: handle,
                    message: message.map(str::to_owned),
                },
            );
        }
        true
    }

    pub fn succeed_task(&self, task: RawObject, result: RawObject) -> bool {
        self.complete_task(task, TaskStatus::Success, result, None)
    }

    pub fn fail_task(&self, task: RawObject, exception: RawObject) -> bool {
        let message = self.describe_throwable(exception).map(|e| e.message);
        self.complete_task(task, TaskStatus::Failure, exception, message.as_deref())
    }

    pub fn cancel_task(&self, task: RawObject) -> bool {
        self.complete_task(task, TaskStatus::Cancelled, RawObject::NULL, None)
    }

    pub fn is_task_finished(&self, task: RawObject) -> bool {
        let state = self.state.lock();
        state
            .object_of(task)
            .and_then(|id| state.tasks.get(&id))
            .is_some_and(|t| t.finished.is_some())
    }

    /// Delivers a progress notification. Returns the number of callbacks
    /// that received it.
    pub fn emit_progress(&self, task: RawObject, kind: ProgressKind, snapshot: RawObject) -> usize {
        let ctx = self.context();
        let delivered = {
            let mut state = self.state.lock();
            let Some(task_id) = state.object_of(task) else {
                return 0;
            };
            let snapshot_id = state.object_of(snapshot);
            let callbacks = state
                .tasks
                .get(&task_id)
                .map(|t| t.progress.iter().map(|(_, cb)| Arc::clone(cb)).collect::<Vec<_>>())
                .unwrap_or_default();
            callbacks
                .into_iter()
                .map(|cb| {
                    let handle = snapshot_id
                        .map_or(RawObject::NULL, |id| state.new_ref(id, RefKind::Local));
                    (cb, handle)
                })
                .collect::<Vec<_>>()
        };
        let count = delivered.len();
        for (callback, handle) in delivered {
            callback(
                &ctx,
                ProgressEvent {
                    kind,
                    snapshot: handle,
                },
            );
        }
        count
    }

    /// Completion plus progress listeners currently attached to `task`.
    pub fn active_listeners(&self, task: RawObject) -> usize {
        let state = self.state.lock();
        state
            .object_of(task)
            .and_then(|id| state.tasks.get(&id))
            .map_or(0, |t| t.completion.len() + t.progress.len())
    }

    pub fn reject_posts(&self, reject: bool) {
        self.state.lock().reject_posts = reject;
    }

    /// Runs queued main-thread jobs, including any they enqueue.
    pub fn run_main_thread(&self) -> usize {
        self.drain(|state| state.main_jobs.pop_front())
    }

    pub fn run_background(&self) -> usize {
        self.drain(|state| state.background_jobs.pop_front())
    }

    pub fn pending_main_jobs(&self) -> usize {
        self.state.lock().main_jobs.len()
    }

    fn drain(&self, mut next: impl FnMut(&mut State) -> Option<HostJob>) -> usize {
        let ctx = self.context();
        let mut ran = 0;
        loop {
            let job = next(&mut self.state.lock());
            let Some(job) = job else {
                break ran;
            };
            job(&ctx);
            ran += 1;
        }
    }

    pub fn find_class_calls(&self, class: &str) -> usize {
        self.state
            .lock()
            .counters
            .find_class
            .get(class)
            .copied()
            .unwrap_or(0)
    }

    pub fn define_class_calls(&self, class: &str) -> usize {
        self.state
            .lock()
            .counters
            .define_class
            .get(class)
            .copied()
            .unwrap_or(0)
    }

    pub fn member_lookups(&self) -> usize {
        self.state.lock().counters.member_lookups
    }

    pub fn register_natives_calls(&self) -> usize {
        self.state.lock().counters.register_natives
    }

    pub fn unregister_natives_calls(&self) -> usize {
        self.state.lock().counters.unregister_natives
    }

    pub fn natives(&self, class: &str) -> Option<Vec<NativeMethod>> {
        self.state.lock().natives.get(class).cloned()
    }

    pub fn method_calls(&self, name: &str) -> usize {
        self.state
            .lock()
            .counters
            .method_calls
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn string_reads(&self) -> usize {
        self.state.lock().counters.string_reads
    }

    pub fn invalid_deletes(&self) -> usize {
        self.state.lock().counters.invalid_deletes
    }

    pub fn live_local_refs(&self) -> usize {
        self.state.lock().count_live(RefKind::Local)
    }

    pub fn live_global_refs(&self) -> usize {
        self.state.lock().count_live(RefKind::Global)
    }

    fn invoke(
        &self,
        this: RawObject,
        receiver_class: String,
        method: MethodId,
        args: &[HostValue],
    ) -> HostResult<HostValue> {
        let behavior = {
            let mut state = self.state.lock();
            let entry = state
                .methods
                .get(&method.to_bits())
                .ok_or_else(|| {
                    HostError::Rejected(format!("unknown method id {}", method.to_bits()))
                })?;
            if !state.is_subclass(&receiver_class, &entry.class) {
                return Err(HostError::TypeMismatch {
                    expected: "receiver of declaring class",
                    got: receiver_class,
                });
            }
            let name = entry.name.clone();
            let behavior = entry.behavior.clone();
            *state.counters.method_calls.entry(name).or_default() += 1;
            behavior
        };
        match behavior {
            Some(behavior) => behavior(MockCall {
                host: self,
                this,
                args,
            }),
            None => Ok(HostValue::Void),
        }
    }
}

impl HostEnv for MockHost {
    fn find_class(&self, name: &str) -> HostResult<RawObject> {
        let mut state = self.state.lock();
        *state
            .counters
            .find_class
            .entry(name.to_owned())
            .or_default() += 1;
        let object = state
            .classes
            .get(name)
            .map(|entry| entry.object)
            .ok_or_else(|| HostError::ClassNotFound(name.to_owned()))?;
        Ok(state.new_ref(object, RefKind::Local))
    }

    fn define_class(&self, name: &str, definition: &[u8]) -> HostResult<RawObject> {
        let mut state = self.state.lock();
        *state
            .counters
            .define_class
            .entry(name.to_owned())
            .or_default() += 1;
        let def = match state.embedded.get(name) {
            Some((blob, def)) if blob.as_slice() == definition => def.clone(),
            _ => return Err(HostError::ClassNotFound(name.to_owned())),
        };
        let object = state.define(def);
        Ok(state.new_ref(object, RefKind::Local))
    }

    fn method_id(
        &self,
        class: RawObject,
        name: &str,
        descriptor: &str,
        kind: CallKind,
    ) -> HostResult<MethodId> {
        let mut state = self.state.lock();
        state.counters.member_lookups += 1;
        let class_name = state.class_name(class)?;
        let declaring = state
            .lineage(&class_name)
            .into_iter()
            .find_map(|def| {
                def.find_method(name, descriptor, kind)
                    .map(|m| (def.name.clone(), m.behavior.clone()))
            });
        let Some((declaring, behavior)) = declaring else {
            return Err(HostError::MemberNotFound {
                name: name.to_owned(),
                descriptor: descriptor.to_owned(),
                kind,
            });
        };
        let key = (
            declaring.clone(),
            name.to_owned(),
            descriptor.to_owned(),
            kind,
        );
        let id = match state.method_keys.get(&key) {
            Some(id) => *id,
            None => {
                let id = state.alloc();
                state.method_keys.insert(key, id);
                state.methods.insert(
                    id,
                    MethodEntry {
                        class: declaring,
                        name: name.to_owned(),
                        behavior,
                    },
                );
                id
            }
        };
        MethodId::new(id).ok_or_else(|| HostError::Rejected("zero method id".to_owned()))
    }

    fn field_id(
        &self,
        class: RawObject,
        name: &str,
        descriptor: &str,
        kind: CallKind,
    ) -> HostResult<FieldId> {
        let mut state = self.state.lock();
        state.counters.member_lookups += 1;
        let class_name = state.class_name(class)?;
        let declaring = state
            .lineage(&class_name)
            .into_iter()
            .find(|def| def.find_field(name, descriptor, kind).is_some())
            .map(|def| def.name.clone());
        let Some(declaring) = declaring else {
            return Err(HostError::MemberNotFound {
                name: name.to_owned(),
                descriptor: descriptor.to_owned(),
                kind,
            });
        };
        let key = (
            declaring.clone(),
            name.to_owned(),
            descriptor.to_owned(),
            kind,
        );
        let id = match state.field_keys.get(&key) {
            Some(id) => *id,
            None => {
                let id = state.alloc();
                state.field_keys.insert(key, id);
                state.fields.insert(
                    id,
                    FieldEntry {
                        class: declaring,
                        name: name.to_owned(),
                    },
                );
                id
            }
        };
        FieldId::new(id).ok_or_else(|| HostError::Rejected("zero field id".to_owned()))
    }

    fn register_natives(&self, class: RawObject, natives: &[NativeMethod]) -> HostResult<()> {
        let mut state = self.state.lock();
        let name = state.class_name(class)?;
        if state.natives.contains_key(&name) {
            return Err(HostError::AlreadyRegistered(name));
        }
        state.counters.register_natives += 1;
        state.natives.insert(name, natives.to_vec());
        Ok(())
    }

    fn unregister_natives(&self, class: RawObject) -> HostResult<()> {
        let mut state = self.state.lock();
        let name = state.class_name(class)?;
        state.counters.unregister_natives += 1;
        state.natives.remove(&name);
        Ok(())
    }

    fn new_local_ref(&self, obj: RawObject) -> RawObject {
        let mut state = self.state.lock();
        match state.object_of(obj) {
            Some(id) => state.new_ref(id, RefKind::Local),
            None => RawObject::NULL,
        }
    }

    fn delete_local_ref(&self, obj: RawObject) {
        self.state.lock().delete_ref(obj, RefKind::Local);
    }

    fn new_global_ref(&self, obj: RawObject) -> RawObject {
        let mut state = self.state.lock();
        match state.object_of(obj) {
            Some(id) => state.new_ref(id, RefKind::Global),
            None => RawObject::NULL,
        }
    }

    fn delete_global_ref(&self, obj: RawObject) {
        self.state.lock().delete_ref(obj, RefKind::Global);
    }

    fn is_same_object(&self, a: RawObject, b: RawObject) -> bool {
        let state = self.state.lock();
        state.object_of(a) == state.object_of(b)
    }

    fn is_instance_of(&self, obj: RawObject, class: RawObject) -> bool {
        let state = self.state.lock();
        let (Ok(object), Ok(class_name)) = (state.object(obj), state.class_name(class)) else {
            return false;
        };
        state.is_subclass(&object.class, &class_name)
    }

    fn new_object(
        &self,
        class: RawObject,
        constructor: MethodId,
        args: &[HostValue],
    ) -> HostResult<RawObject> {
        let (handle, class_name) = {
            let mut state = self.state.lock();
            let class_name = state.class_name(class)?;
            let id = state.insert_object(&class_name, Payload::Plain);
            (state.new_ref(id, RefKind::Local), class_name)
        };
        if let Err(err) = self.invoke(handle, class_name, constructor, args) {
            self.delete_local_ref(handle);
            return Err(err);
        }
        Ok(handle)
    }

    fn call_method(
        &self,
        obj: RawObject,
        method: MethodId,
        args: &[HostValue],
    ) -> HostResult<HostValue> {
        let class = self.state.lock().object(obj)?.class.clone();
        self.invoke(obj, class, method, args)
    }

    fn call_static_method(
        &self,
        class: RawObject,
        method: MethodId,
        args: &[HostValue],
    ) -> HostResult<HostValue> {
        let class_name = self.state.lock().class_name(class)?;
        self.invoke(class, class_name, method, args)
    }

    fn get_field(&self, obj: RawObject, field: FieldId) -> HostResult<HostValue> {
        let state = self.state.lock();
        let entry = state
            .fields
            .get(&field.to_bits())
            .ok_or_else(|| HostError::Rejected(format!("unknown field id {}", field.to_bits())))?;
        let object = state.object(obj)?;
        Ok(object.fields.get(&entry.name).copied().unwrap_or_default())
    }

    fn get_static_field(&self, class: RawObject, field: FieldId) -> HostResult<HostValue> {
        let state = self.state.lock();
        let entry = state
            .fields
            .get(&field.to_bits())
            .ok_or_else(|| HostError::Rejected(format!("unknown field id {}", field.to_bits())))?;
        state.class_name(class)?;
        Ok(state
            .classes
            .get(&entry.class)
            .and_then(|c| c.statics.get(&entry.name).copied())
            .unwrap_or_default())
    }

    fn new_string(&self, text: &str) -> HostResult<RawObject> {
        let mut state = self.state.lock();
        let id = state.insert_object(STRING_CLASS, Payload::Text(text.to_owned()));
        Ok(state.new_ref(id, RefKind::Local))
    }

    fn read_string(&self, obj: RawObject) -> HostResult<String> {
        let mut state = self.state.lock();
        state.counters.string_reads += 1;
        let object = state.object(obj)?;
        match &object.payload {
            Payload::Text(text) => Ok(text.clone()),
            _ => Err(HostError::TypeMismatch {
                expected: "string",
                got: object.class.clone(),
            }),
        }
    }

    fn describe_throwable(&self, obj: RawObject) -> Option<HostException> {
        let state = self.state.lock();
        let object = state.object(obj).ok()?;
        match &object.payload {
            Payload::Throwable(message) => {
                Some(HostException::new(object.class.clone(), message.clone()))
            }
            _ => None,
        }
    }

    fn add_completion_listener(
        &self,
        task: RawObject,
        listener: CompletionListener,
    ) -> HostResult<ListenerToken> {
        let immediate = {
            let mut state = self.state.lock();
            let task_id = state
                .object_of(task)
                .ok_or(HostError::InvalidHandle(task))?;
            let token = state.alloc();
            let Some(entry) = state.tasks.get_mut(&task_id) else {
                return Err(HostError::TypeMismatch {
                    expected: "task",
                    got: format!("{task}"),
                });
            };
            match &entry.finished {
                None => {
                    entry.completion.push((token, listener));
                    return Ok(ListenerToken::new(token));
                }
                Some(finished) => {
                    let status = finished.status;
                    let message = finished.message.clone();
                    let result = finished.result;
                    let handle =
                        result.map_or(RawObject::NULL, |id| state.new_ref(id, RefKind::Local));
                    (token, listener, status, handle, message)
                }
            }
        };
        let (token, listener, status, result, message) = immediate;
        listener(
            &self.context(),
            TaskCompletion {
                status,
                result,
                message,
            },
        );
        Ok(ListenerToken::new(token))
    }

    fn add_progress_listener(
        &self,
        task: RawObject,
        callback: ProgressCallback,
    ) -> HostResult<ListenerToken> {
        let mut state = self.state.lock();
        let task_id = state
            .object_of(task)
            .ok_or(HostError::InvalidHandle(task))?;
        let token = state.alloc();
        let entry = state
            .tasks
            .get_mut(&task_id)
            .ok_or(HostError::InvalidHandle(task))?;
        if entry.finished.is_none() {
            entry.progress.push((token, callback));
        }
        Ok(ListenerToken::new(token))
    }

    fn remove_listener(&self, task: RawObject, token: ListenerToken) {
        let mut removed_completion = Vec::new();
        let mut removed_progress = Vec::new();
        {
            let mut state = self.state.lock();
            let Some(task_id) = state.object_of(task) else {
                return;
            };
            if let Some(entry) = state.tasks.get_mut(&task_id) {
                let (gone, kept) = std::mem::take(&mut entry.completion)
                    .into_iter()
                    .partition(|(t, _)| *t == token.to_bits());
                entry.completion = kept;
                removed_completion = gone;
                let (gone, kept) = std::mem::take(&mut entry.progress)
                    .into_iter()
                    .partition(|(t, _)| *t == token.to_bits());
                entry.progress = kept;
                removed_progress = gone;
            }
        }
        drop(removed_completion);
        drop(removed_progress);
    }

    fn post_to_main_thread(&self, job: HostJob) -> HostResult<()> {
        let mut state = self.state.lock();
        if state.reject_posts {
            return Err(HostError::Rejected("main thread is shutting down".to_owned()));
        }
        state.main_jobs.push_back(job);
        Ok(())
    }

    fn post_to_background_thread(&self, job: HostJob) -> HostResult<()> {
        let mut state = self.state.lock();
        if state.reject_posts {
            return Err(HostError::Rejected("background executor is shutting down".to_owned()));
        }
        state.background_jobs.push_back(job);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_and_global_ref_accounting() {
        let host = MockHost::new();
        let text = host.new_string("hi").unwrap();
        assert_eq!(host.live_local_refs(), 1);

        let global = host.new_global_ref(text);
        assert_eq!(host.live_global_refs(), 1);
        assert!(host.is_same_object(text, global));

        host.delete_local_ref(text);
        assert_eq!(host.read_string(global).unwrap(), "hi");
        host.delete_global_ref(global);
        assert_eq!(host.live_local_refs() + host.live_global_refs(), 0);
        assert_eq!(host.invalid_deletes(), 0);

        host.delete_global_ref(global);
        assert_eq!(host.invalid_deletes(), 1);
    }

    #[test]
    fn test_inherited_method_lookup() {
        let host = MockHost::new();
        host.define(ClassDef::new("Base").method_with("size", "()J", |_| Ok(HostValue::Long(4))));
        host.define(ClassDef::new("Derived").extends("Base"));

        let derived = host.find_class("Derived").unwrap();
        let size = host
            .method_id(derived, "size", "()J", CallKind::Instance)
            .unwrap();
        let obj = host.new_instance("Derived");
        assert_eq!(host.call_method(obj, size, &[]).unwrap(), HostValue::Long(4));
        assert_eq!(host.method_calls("size"), 1);
        assert!(
            host.method_id(derived, "size", "()J", CallKind::Static)
                .is_err()
        );
    }

    #[test]
    fn test_embedded_class_requires_matching_blob() {
        let host = MockHost::new();
        host.embed(ClassDef::new("Helper"), b"helper-v1".to_vec());

        assert!(host.find_class("Helper").is_err());
        assert!(host.define_class("Helper", b"other").is_err());
        assert!(host.define_class("Helper", b"helper-v1").is_ok());
        assert!(host.find_class("Helper").is_ok());
    }

    #[test]
    fn test_listener_on_finished_task_fires_immediately() {
        let host = MockHost::new();
        let task = host.new_task();
        let text = host.new_string("done").unwrap();
        assert!(host.succeed_task(task, text));
        assert!(!host.cancel_task(task));

        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        host.add_completion_listener(
            task,
            Box::new(move |ctx: &HostContext, completion: TaskCompletion| {
                *sink.lock() = Some(ctx.read_string(completion.result).unwrap());
                ctx.delete_local_ref(completion.result);
            }),
        )
        .unwrap();
        assert_eq!(seen.lock().as_deref(), Some("done"));
    }
}
