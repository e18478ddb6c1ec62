//! Script-side dispatch for host objects and host types.
//!
//! Every host object pushed into script becomes a full userdata carrying its
//! handle. Userdata of one concrete host type share a metatable, created on
//! first push and registered under `metatable_prefix + qualified name`:
//!
//! | field          | purpose                                          |
//! |----------------|--------------------------------------------------|
//! | `__hostbridge` | marks userdata created by the bridge             |
//! | `__index`      | member lookup (see [`member`])                   |
//! | `__newindex`   | member assignment                                |
//! | `__call`       | delegates: invoke; type proxies: construct       |
//! | `__gc`         | reclaims the handle before the slot is freed     |
//! | `__tostring`   | diagnostic name                                  |
//! | `__cache`      | method-group functions, created once per name    |
//!
//! A weak-valued cache table maps handles back to their userdata so that
//! pushing the same object twice yields the same script value.

mod member;

use std::rc::Rc;

use hostbridge_core::{BridgeError, HostHandle, HostRef, NativeFunction, RegistryRef, ScriptStack, TypeHash, ValueTag, builtin};
use hostbridge_registry::ClassKind;

use crate::bridge::{Bridge, upgrade};

/// Metatable field marking bridge userdata.
pub(crate) const MARKER: &str = "__hostbridge";
const METHOD_CACHE: &str = "__cache";

/// Payload of a type proxy: the script-side handle on a host type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeProxy {
    target: TypeHash,
}

impl TypeProxy {
    pub fn target(&self) -> TypeHash {
        self.target
    }
}

type Metamethod = fn(&Bridge, &mut dyn ScriptStack) -> Result<i32, BridgeError>;

impl Bridge {
    /// Push a host object as userdata, reusing the live userdata if any.
    pub(crate) fn push_object(&self, stack: &mut dyn ScriptStack, object: &HostRef) -> Result<(), BridgeError> {
        if !stack.check_stack(4) {
            return Err(BridgeError::StackOverflow { needed: 4 });
        }
        let cache = self.object_cache(stack);
        let handle = self
            .handles
            .borrow_mut()
            .intern(object)
            .ok_or_else(|| BridgeError::script("host object handle space exhausted"))?;
        let key = handle.as_u64() as f64;

        stack.push_reference(cache);
        let cache_index = stack.get_top();
        stack.push_number(key);
        stack.raw_get(cache_index);
        if stack.to_userdata(-1) == Some(handle.as_u64()) {
            stack.remove(cache_index);
            return Ok(());
        }
        stack.pop(1);

        stack.push_userdata(handle.as_u64());
        self.push_metatable(stack, object.type_hash());
        stack.set_metatable(-2);
        stack.push_number(key);
        stack.push_value(-2);
        stack.raw_set(cache_index);
        stack.remove(cache_index);
        Ok(())
    }

    fn object_cache(&self, stack: &mut dyn ScriptStack) -> RegistryRef {
        let cache = self.object_cache.get();
        if !cache.is_nil() {
            return cache;
        }
        stack.new_table();
        stack.new_table();
        stack.push_string("v");
        stack.raw_set_field(-2, "__mode");
        stack.set_metatable(-2);
        let cache = stack.reference();
        self.object_cache.set(cache);
        cache
    }

    fn metatable_name(&self, hash: TypeHash) -> String {
        format!("{}{}", self.config.metatable_prefix, self.registry.type_name(hash))
    }

    /// Push the shared metatable of a host type, creating it on first use.
    fn push_metatable(&self, stack: &mut dyn ScriptStack, hash: TypeHash) {
        let name = self.metatable_name(hash);
        if !stack.new_metatable(&name) {
            return;
        }
        log::debug!("created metatable {name}");

        stack.push_boolean(true);
        stack.raw_set_field(-2, MARKER);
        stack.new_table();
        stack.raw_set_field(-2, METHOD_CACHE);

        let mut metamethods: Vec<(&str, Metamethod)> = vec![
            ("__gc", Bridge::collect_object),
            ("__tostring", Bridge::object_to_string),
        ];
        if hash == builtin::type_proxy() {
            metamethods.extend([
                ("__index", Bridge::type_index as Metamethod),
                ("__newindex", Bridge::type_newindex),
                ("__call", Bridge::type_call),
            ]);
        } else {
            metamethods.extend([
                ("__index", Bridge::instance_index as Metamethod),
                ("__newindex", Bridge::instance_newindex),
            ]);
            if self.registry.kind_of(hash) == Some(ClassKind::Delegate) {
                metamethods.push(("__call", Bridge::delegate_call));
            }
        }
        for (field, method) in metamethods {
            stack.push_function(self.metamethod(method));
            stack.raw_set_field(-2, field);
        }
    }

    fn metamethod(&self, method: Metamethod) -> NativeFunction {
        let weak = self.this.clone();
        Rc::new(move |stack: &mut dyn ScriptStack| {
            let bridge = upgrade(&weak)?;
            bridge.enter(stack);
            method(&*bridge, stack)
        })
    }

    /// Push the function cached under `key` in the metatable of `hash`,
    /// creating it with `make` on first use.
    fn push_cached_function(
        &self,
        stack: &mut dyn ScriptStack,
        hash: TypeHash,
        key: &str,
        make: impl FnOnce() -> NativeFunction,
    ) {
        self.push_metatable(stack, hash);
        stack.raw_get_field(-1, METHOD_CACHE);
        stack.raw_get_field(-1, key);
        if stack.type_of(-1) != ValueTag::Function {
            stack.pop(1);
            stack.push_function(make());
            stack.push_value(-1);
            stack.raw_set_field(-3, key);
        }
        stack.insert(-3);
        stack.pop(2);
    }

    /// The host object at `index`, required to be one of ours and live.
    pub(crate) fn receiver(&self, stack: &mut dyn ScriptStack, index: i32) -> Result<HostRef, BridgeError> {
        match self.resolve_userdata(stack, index)? {
            Some(object) => Ok(object),
            None => Err(BridgeError::script(format!(
                "expected a host object, got {}",
                stack.type_of(index)
            ))),
        }
    }

    /// Target type of the type proxy at `index`.
    fn type_target(&self, stack: &mut dyn ScriptStack, index: i32) -> Result<TypeHash, BridgeError> {
        let object = self.receiver(stack, index)?;
        let target = object.borrow::<TypeProxy>().map(|proxy| proxy.target);
        target.ok_or_else(|| BridgeError::script("expected a host type"))
    }

    /// Whether the value at `index` is the type proxy of `hash`.
    fn is_type_proxy_of(&self, stack: &mut dyn ScriptStack, index: i32, hash: TypeHash) -> bool {
        match self.resolve_userdata(stack, index) {
            Ok(Some(object)) => object.borrow::<TypeProxy>().is_some_and(|proxy| proxy.target == hash),
            _ => false,
        }
    }

    /// Push the type proxy of a registered type.
    pub fn push_type(&self, stack: &mut dyn ScriptStack, hash: TypeHash) -> Result<(), BridgeError> {
        if !self.registry.contains(hash) {
            return Err(BridgeError::TypeNotFound(hash.to_string()));
        }
        let proxy = self
            .type_proxies
            .borrow_mut()
            .entry(hash)
            .or_insert_with(|| HostRef::new(builtin::type_proxy(), TypeProxy { target: hash }))
            .clone();
        self.push_object(stack, &proxy)
    }

    /// Push the type proxy of the type named `qualified_name`.
    pub fn import_type(&self, stack: &mut dyn ScriptStack, qualified_name: &str) -> Result<(), BridgeError> {
        self.enter(stack);
        let hash = TypeHash::from_name(qualified_name);
        if !self.registry.contains(hash) {
            return Err(BridgeError::TypeNotFound(qualified_name.to_owned()));
        }
        self.push_type(stack, hash)
    }

    // ------------------------------------------------------------------
    // Shared metamethods
    // ------------------------------------------------------------------

    /// `__gc`: reclaim the handle unless a newer userdata already stands for it.
    fn collect_object(&self, stack: &mut dyn ScriptStack) -> Result<i32, BridgeError> {
        let Some(payload) = stack.to_userdata(1) else {
            return Ok(0);
        };
        let cache = self.object_cache.get();
        if !cache.is_nil() {
            stack.push_reference(cache);
            stack.push_number(payload as f64);
            stack.raw_get(-2);
            let replaced = stack.type_of(-1) == ValueTag::UserData && !stack.raw_equal(-1, 1);
            stack.pop(2);
            if replaced {
                return Ok(0);
            }
        }
        if self.handles.borrow_mut().reclaim(HostHandle(payload)) {
            log::debug!("reclaimed handle {payload} on collection");
        }
        Ok(0)
    }

    fn object_to_string(&self, stack: &mut dyn ScriptStack) -> Result<i32, BridgeError> {
        let payload = stack.to_userdata(1).unwrap_or_default();
        let text = match self.resolve_userdata(stack, 1) {
            Ok(Some(object)) => match object.borrow::<TypeProxy>().map(|proxy| proxy.target) {
                Some(target) => format!("type {}", self.registry.type_name(target)),
                None => format!("{}: {payload:#x}", self.registry.type_name(object.type_hash())),
            },
            Ok(None) => "userdata".to_owned(),
            Err(_) => format!("stale object {payload:#x}"),
        };
        stack.push_string(&text);
        Ok(1)
    }
}
