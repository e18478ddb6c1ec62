//! The bridge context.
//!
//! A [`Bridge`] owns everything one interpreter instance needs to talk to the
//! host: the type registry, the handle table, and the member, adapter and
//! proxy caches. There are no process-wide singletons; two bridges never
//! share state.
//!
//! The bridge is built on `Rc`/`RefCell` and is therefore neither `Send` nor
//! `Sync`. Re-entrant use from one thread (host calls script calls host) is
//! supported: no interior borrow is held across a call into script or host
//! code.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;

use hostbridge_core::{
    BridgeError, CallContext, ConversionError, HandleTable, HostArray, HostFault, HostHandle, HostRef, HostValue,
    IntoHost, NativeFn, NativeFunction, RegistrationError, RegistryRef, ReleaseQueue, ScriptFunction, ScriptStack,
    ScriptTable, ScriptUserData, TypeHash, TypeRef, ValueTag, WeakHostRef, builtin,
};
use hostbridge_registry::{Member, MemberFilter, MethodEntry, TypeRegistry, parse_method};

use crate::config::BridgeConfig;
use crate::dispatch::{MARKER, TypeProxy};
use crate::extract::Extractor;
use crate::proxy;

/// Member cache key: type, filter bits, requested name.
type MemberKey = (TypeHash, u8, Box<str>);

/// Bridge between one interpreter instance and the host type registry.
pub struct Bridge {
    pub(crate) registry: TypeRegistry,
    pub(crate) config: BridgeConfig,
    pub(crate) handles: RefCell<HandleTable>,
    /// Resolved members, including misses.
    members: RefCell<FxHashMap<MemberKey, Option<Member>>>,
    /// Delegate/interface adapter extractors per type.
    pub(crate) adapters: RefCell<FxHashMap<TypeHash, Option<Extractor>>>,
    /// Live proxies per (adapted type, script value identity).
    pub(crate) proxies: RefCell<FxHashMap<(TypeHash, usize), WeakHostRef>>,
    pub(crate) type_proxies: RefCell<FxHashMap<TypeHash, HostRef>>,
    /// Weak-valued table mapping handles to their userdata.
    pub(crate) object_cache: Cell<RegistryRef>,
    pub(crate) releases: Rc<ReleaseQueue>,
    pub(crate) this: Weak<Bridge>,
}

/// Recover the bridge from a weak reference held by an installed function.
pub(crate) fn upgrade(bridge: &Weak<Bridge>) -> Result<Rc<Bridge>, BridgeError> {
    bridge
        .upgrade()
        .ok_or_else(|| BridgeError::script("host bridge has been dropped"))
}

fn register_builtins(registry: &mut TypeRegistry) -> Result<(), RegistrationError> {
    if !registry.contains(builtin::array()) {
        registry
            .class::<HostArray>(builtin::ARRAY)
            .property("i32 Length", |array: &HostArray| array.len() as i32)?
            .build()?;
    }
    if !registry.contains(builtin::type_proxy()) {
        registry.class::<TypeProxy>(builtin::TYPE_PROXY).build()?;
    }
    if !registry.contains(builtin::event_handle()) {
        proxy::register_event_handle(registry)?;
    }
    Ok(())
}

impl Bridge {
    pub fn new(registry: TypeRegistry) -> Result<Rc<Self>, RegistrationError> {
        Self::with_config(registry, BridgeConfig::default())
    }

    pub fn with_config(mut registry: TypeRegistry, config: BridgeConfig) -> Result<Rc<Self>, RegistrationError> {
        register_builtins(&mut registry)?;
        Ok(Rc::new_cyclic(|this| Bridge {
            registry,
            config,
            handles: RefCell::new(HandleTable::new()),
            members: RefCell::default(),
            adapters: RefCell::default(),
            proxies: RefCell::default(),
            type_proxies: RefCell::default(),
            object_cache: Cell::new(RegistryRef::NIL),
            releases: ReleaseQueue::new(),
            this: this.clone(),
        }))
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Common work at every entry point from script or host.
    pub(crate) fn enter(&self, stack: &mut dyn ScriptStack) {
        self.drain_releases(stack);
    }

    /// Release registry references of dropped script values. Returns how many.
    pub fn drain_releases(&self, stack: &mut dyn ScriptStack) -> usize {
        let pending = self.releases.take();
        for &reference in &pending {
            stack.unreference(reference);
        }
        pending.len()
    }

    // ------------------------------------------------------------------
    // Members
    // ------------------------------------------------------------------

    /// Resolve a member, memoized per (type, filter, name).
    pub(crate) fn lookup_member(&self, hash: TypeHash, name: &str, filter: MemberFilter) -> Option<Member> {
        let filter = if self.config.case_insensitive_members {
            filter | MemberFilter::IGNORE_CASE
        } else {
            filter
        };
        let key: MemberKey = (hash, filter.bits(), name.into());
        if let Some(cached) = self.members.borrow().get(&key) {
            return cached.clone();
        }
        let member = self.registry.find_member(hash, name, filter);
        self.members.borrow_mut().insert(key, member.clone());
        member
    }

    /// Human-readable type name, with registered names resolved.
    pub(crate) fn describe(&self, ty: &TypeRef) -> String {
        match ty {
            TypeRef::Named(hash) => self.registry.type_name(*hash),
            TypeRef::Nullable(inner) => format!("{}?", self.describe(inner)),
            TypeRef::ByRef(inner) => self.describe(inner),
            TypeRef::Array(element) => format!("{}[]", self.describe(element)),
            other => other.to_string(),
        }
    }

    pub(crate) fn mismatch(&self, ty: &TypeRef, actual: ValueTag) -> BridgeError {
        ConversionError::TypeMismatch {
            expected: self.describe(ty),
            actual: actual.name().to_owned(),
        }
        .into()
    }

    // ------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------

    /// Anchor the value at `index` in the registry.
    pub(crate) fn anchor(&self, stack: &mut dyn ScriptStack, index: i32) -> RegistryRef {
        stack.push_value(index);
        stack.reference()
    }

    /// Push a host value: scalars by value, script references by reference,
    /// host objects through the handle table.
    pub fn push(&self, stack: &mut dyn ScriptStack, value: &HostValue) -> Result<(), BridgeError> {
        if !stack.check_stack(1) {
            return Err(BridgeError::StackOverflow { needed: 1 });
        }
        match value {
            HostValue::Null => stack.push_nil(),
            HostValue::Bool(b) => stack.push_boolean(*b),
            HostValue::String(s) => stack.push_string(s),
            HostValue::Object(object) => return self.push_object(stack, object),
            HostValue::Function(function) => stack.push_reference(function.reference()),
            HostValue::Table(table) => stack.push_reference(table.reference()),
            HostValue::UserData(userdata) => stack.push_reference(userdata.reference()),
            number => match number.as_f64() {
                Some(n) => stack.push_number(n),
                None => stack.push_nil(),
            },
        }
        Ok(())
    }

    /// Read the value at `index` by its runtime tag.
    ///
    /// Userdata created by this bridge yields the host object; a userdata
    /// whose handle has been reclaimed yields `Null`.
    pub fn get_object(&self, stack: &mut dyn ScriptStack, index: i32) -> HostValue {
        let index = stack.abs_index(index);
        match stack.type_of(index) {
            ValueTag::None | ValueTag::Nil => HostValue::Null,
            ValueTag::Boolean => HostValue::Bool(stack.to_boolean(index)),
            ValueTag::Number => HostValue::F64(stack.to_number(index).unwrap_or_default()),
            ValueTag::String => stack.to_str(index).map(HostValue::String).unwrap_or_default(),
            ValueTag::Function => {
                let reference = self.anchor(stack, index);
                HostValue::Function(ScriptFunction::new(reference, &self.releases))
            }
            ValueTag::Table => {
                let reference = self.anchor(stack, index);
                HostValue::Table(ScriptTable::new(reference, &self.releases))
            }
            ValueTag::UserData => match self.resolve_userdata(stack, index) {
                Ok(Some(object)) => HostValue::Object(object),
                Ok(None) => {
                    let reference = self.anchor(stack, index);
                    HostValue::UserData(ScriptUserData::new(reference, &self.releases))
                }
                Err(err) => {
                    log::warn!("reading a host object: {err}");
                    HostValue::Null
                }
            },
        }
    }

    /// Whether the value at `index` is a userdata created by this bridge.
    pub(crate) fn is_ours(&self, stack: &mut dyn ScriptStack, index: i32) -> bool {
        let index = stack.abs_index(index);
        if stack.type_of(index) != ValueTag::UserData || !stack.get_metatable(index) {
            return false;
        }
        stack.raw_get_field(-1, MARKER);
        let ours = stack.to_boolean(-1);
        stack.pop(2);
        ours
    }

    /// The host object behind a bridge userdata.
    ///
    /// `Ok(None)` when the value is not one of ours, `Err(StaleHandle)` when
    /// its handle no longer resolves.
    pub(crate) fn resolve_userdata(
        &self,
        stack: &mut dyn ScriptStack,
        index: i32,
    ) -> Result<Option<HostRef>, BridgeError> {
        if !self.is_ours(stack, index) {
            return Ok(None);
        }
        let Some(payload) = stack.to_userdata(index) else {
            return Ok(None);
        };
        self.handles
            .borrow()
            .resolve(HostHandle(payload))
            .map(Some)
            .ok_or(BridgeError::StaleHandle { handle: payload })
    }

    // ------------------------------------------------------------------
    // Handles
    // ------------------------------------------------------------------

    /// Handle currently assigned to `object`.
    pub fn handle_of(&self, object: &HostRef) -> Option<HostHandle> {
        self.handles.borrow().lookup(object)
    }

    /// Object behind a live handle.
    pub fn resolve(&self, handle: HostHandle) -> Option<HostRef> {
        self.handles.borrow().resolve(handle)
    }

    /// Number of live handles.
    pub fn live_handles(&self) -> usize {
        self.handles.borrow().len()
    }

    /// Reclaim a handle explicitly. Idempotent.
    pub fn release(&self, handle: HostHandle) -> bool {
        self.handles.borrow_mut().reclaim(handle)
    }

    /// Detach a host object from script: its handle is reclaimed and its
    /// cached userdata forgotten, so existing script references go stale.
    pub fn detach(&self, stack: &mut dyn ScriptStack, object: &HostRef) -> Option<HostHandle> {
        let handle = self.handles.borrow_mut().reclaim_by_object(object)?;
        let cache = self.object_cache.get();
        if !cache.is_nil() {
            stack.push_reference(cache);
            stack.push_number(handle.as_u64() as f64);
            stack.push_nil();
            stack.raw_set(-3);
            stack.pop(1);
        }
        log::debug!("detached {object:?} (handle {})", handle.as_u64());
        Some(handle)
    }

    /// Invalidate every handle and forget state-bound caches (interpreter teardown).
    pub fn invalidate(&self) {
        self.handles.borrow_mut().invalidate_all();
        self.object_cache.set(RegistryRef::NIL);
        self.type_proxies.borrow_mut().clear();
        self.proxies.borrow_mut().clear();
        // queued references belong to the torn-down state
        self.releases.take();
        log::debug!("bridge invalidated");
    }

    // ------------------------------------------------------------------
    // Globals
    // ------------------------------------------------------------------

    /// Read a global by dotted path (`"a.b.c"`). A missing intermediate yields `Null`.
    pub fn get_global(&self, stack: &mut dyn ScriptStack, path: &str) -> Result<HostValue, BridgeError> {
        self.enter(stack);
        let base = stack.get_top();
        stack.push_globals();
        for segment in path.split('.') {
            if stack.type_of(-1).is_nil_or_none() {
                stack.set_top(base);
                return Ok(HostValue::Null);
            }
            if let Err(err) = stack.get_field(-1, segment) {
                stack.set_top(base);
                return Err(err);
            }
            stack.remove(-2);
        }
        let value = self.get_object(stack, -1);
        stack.set_top(base);
        Ok(value)
    }

    /// Assign a global by dotted path, creating missing intermediate tables.
    pub fn set_global(&self, stack: &mut dyn ScriptStack, path: &str, value: &HostValue) -> Result<(), BridgeError> {
        self.enter(stack);
        let base = stack.get_top();
        self.push(stack, value)?;
        let result = self.assign_path(stack, path);
        stack.set_top(base);
        result
    }

    /// Assign the value on top of the stack to a dotted path. Leaves the stack dirty.
    fn assign_path(&self, stack: &mut dyn ScriptStack, path: &str) -> Result<(), BridgeError> {
        let value = stack.get_top();
        let (parents, last) = match path.rsplit_once('.') {
            Some((parents, last)) => (Some(parents), last),
            None => (None, path),
        };
        stack.push_globals();
        for segment in parents.into_iter().flat_map(|p| p.split('.')) {
            stack.get_field(-1, segment)?;
            if stack.type_of(-1).is_nil_or_none() {
                stack.pop(1);
                stack.new_table();
                stack.push_value(-1);
                stack.set_field(-3, segment)?;
            }
            stack.remove(-2);
        }
        stack.push_value(value);
        stack.set_field(-2, last)
    }

    // ------------------------------------------------------------------
    // Function registration
    // ------------------------------------------------------------------

    /// Expose the overloads of a host method as a script function at `path`.
    ///
    /// With a receiver the instance overloads are bound to it; without one
    /// the static overloads are exposed.
    pub fn register_function(
        &self,
        stack: &mut dyn ScriptStack,
        path: &str,
        receiver: Option<HostRef>,
        type_name: &str,
        method_name: &str,
    ) -> Result<(), BridgeError> {
        let hash = TypeHash::from_name(type_name);
        if !self.registry.contains(hash) {
            return Err(BridgeError::TypeNotFound(type_name.to_owned()));
        }
        if let Some(receiver) = &receiver
            && !self.registry.is_assignable(receiver.type_hash(), hash)
        {
            return Err(ConversionError::TypeMismatch {
                expected: type_name.to_owned(),
                actual: self.registry.type_name(receiver.type_hash()),
            }
            .into());
        }

        let unknown = || BridgeError::UnknownMember {
            type_name: type_name.to_owned(),
            member: method_name.to_owned(),
        };
        let group = self.registry.method_group(hash, method_name).ok_or_else(unknown)?;
        let candidates = if receiver.is_some() {
            group.instances()
        } else {
            group.statics()
        };
        if candidates.is_empty() {
            return Err(unknown());
        }

        let function = self.bound_function(format!("{type_name}.{}", group.name), candidates.into(), receiver);
        self.install(stack, path, function)
    }

    /// Expose a host closure, described by a declaration such as
    /// `"i32 add(i32 a, i32 b)"`, as a script function at `path`.
    pub fn register_native<F, R>(
        &self,
        stack: &mut dyn ScriptStack,
        path: &str,
        decl: &str,
        f: F,
    ) -> Result<(), BridgeError>
    where
        F: Fn(&mut CallContext<'_>) -> Result<R, HostFault> + 'static,
        R: IntoHost,
    {
        let parsed = parse_method(decl)?;
        let implementation: NativeFn = Rc::new(move |ctx: &mut CallContext<'_>| f(ctx).map(IntoHost::into_host));
        let method = Rc::new(MethodEntry {
            name: parsed.name,
            signature: parsed.signature,
            is_static: true,
            declaring_type: TypeHash::EMPTY,
            implementation: Some(implementation),
        });
        let function = self.bound_function(method.name.clone(), Rc::from([method]), None);
        self.install(stack, path, function)
    }

    fn install(&self, stack: &mut dyn ScriptStack, path: &str, function: NativeFunction) -> Result<(), BridgeError> {
        self.enter(stack);
        let base = stack.get_top();
        stack.push_function(function);
        let result = self.assign_path(stack, path);
        stack.set_top(base);
        log::debug!("registered function {path}");
        result
    }

    /// Script function resolving `candidates` against all of its arguments.
    fn bound_function(
        &self,
        member: String,
        candidates: Rc<[Rc<MethodEntry>]>,
        receiver: Option<HostRef>,
    ) -> NativeFunction {
        let weak = self.this.clone();
        Rc::new(move |stack: &mut dyn ScriptStack| {
            let bridge = upgrade(&weak)?;
            bridge.enter(stack);
            let top = stack.get_top();
            let binding = bridge.resolve_overload(stack, &member, &candidates, 1, top)?;
            bridge.invoke_binding(stack, receiver.clone(), binding)
        })
    }

    // ------------------------------------------------------------------
    // Tables
    // ------------------------------------------------------------------

    /// `table[key]`, honouring metamethods.
    pub fn table_get(
        &self,
        stack: &mut dyn ScriptStack,
        table: &ScriptTable,
        key: &HostValue,
    ) -> Result<HostValue, BridgeError> {
        self.enter(stack);
        let base = stack.get_top();
        stack.push_reference(table.reference());
        let result = self.push(stack, key).and_then(|()| stack.get_table(-2));
        let value = result.map(|()| self.get_object(stack, -1));
        stack.set_top(base);
        value
    }

    /// `table[key] = value`, honouring metamethods.
    pub fn table_set(
        &self,
        stack: &mut dyn ScriptStack,
        table: &ScriptTable,
        key: &HostValue,
        value: &HostValue,
    ) -> Result<(), BridgeError> {
        self.enter(stack);
        let base = stack.get_top();
        stack.push_reference(table.reference());
        let result = self
            .push(stack, key)
            .and_then(|()| self.push(stack, value))
            .and_then(|()| stack.set_table(-3));
        stack.set_top(base);
        result
    }
}
