//! Member resolution for instance and type metatables.
//!
//! Instance `__index` precedence:
//! 1. a member of the receiver's runtime type (exact name, then case-insensitive)
//! 2. an element, when the receiver is a host array and the key a number
//! 3. a `get_Item` indexer accepting the key
//! 4. a static member of the runtime type
//!
//! `__newindex` follows the same order with setters and `set_Item`.
//! Anything else raises [`BridgeError::UnknownMember`]; a missing member is
//! never reported as `nil`.

use std::rc::Rc;

use hostbridge_core::{
    BridgeError, HostArray, HostRef, HostValue, NativeFunction, ScriptFunction, ScriptStack, TypeHash, ValueTag,
    builtin,
};
use hostbridge_registry::{ClassKind, Member, MemberFilter, MethodEntry, MethodGroup, PropertyEntry};

use crate::bridge::{Bridge, upgrade};
use crate::extract::Extractor;
use crate::proxy::EventHandle;

/// How a method-group function treats its first argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallKind {
    /// First argument is the receiver.
    Instance,
    /// No receiver; static overloads only.
    Static,
}

impl CallKind {
    fn cache_key(self, name: &str) -> String {
        match self {
            CallKind::Instance => name.to_owned(),
            CallKind::Static => format!("static:{name}"),
        }
    }
}

/// String key at `index`, if it is a string.
fn string_key(stack: &dyn ScriptStack, index: i32) -> Option<String> {
    match stack.type_of(index) {
        ValueTag::String => stack.to_str(index),
        _ => None,
    }
}

fn key_display(stack: &dyn ScriptStack, index: i32) -> String {
    stack
        .to_str(index)
        .unwrap_or_else(|| format!("<{}>", stack.type_of(index)))
}

/// 0-based array position for an integral number key.
fn array_position(stack: &dyn ScriptStack, index: i32, len: usize) -> Result<usize, BridgeError> {
    let key = stack.to_number(index).unwrap_or(f64::NAN);
    if key.fract() != 0.0 || key < 0.0 || key >= len as f64 {
        return Err(BridgeError::script(format!(
            "array index {key} out of range (length {len})"
        )));
    }
    Ok(key as usize)
}

impl Bridge {
    fn unknown_member(&self, hash: TypeHash, member: String) -> BridgeError {
        BridgeError::UnknownMember {
            type_name: self.registry.type_name(hash),
            member,
        }
    }

    // ------------------------------------------------------------------
    // Reading members
    // ------------------------------------------------------------------

    /// `__index` of host objects: (object, key).
    pub(super) fn instance_index(&self, stack: &mut dyn ScriptStack) -> Result<i32, BridgeError> {
        let object = self.receiver(stack, 1)?;
        let hash = object.type_hash();
        let name = string_key(stack, 2);

        if let Some(name) = &name
            && let Some(member) = self.lookup_member(hash, name, MemberFilter::INSTANCE)
        {
            return self.push_member(stack, Some(&object), hash, member, CallKind::Instance);
        }

        if stack.type_of(2) == ValueTag::Number {
            let element = match object.borrow::<HostArray>() {
                Some(array) => Some(array_position(stack, 2, array.len()).map(|i| array.items()[i].clone())?),
                None => None,
            };
            if let Some(element) = element {
                self.push(stack, &element)?;
                return Ok(1);
            }
        }

        if let Some(Member::Methods(group)) = self.lookup_member(hash, "get_Item", MemberFilter::INSTANCE)
            && let Some(binding) = self.first_match(stack, &group.instances(), 2, 1)
        {
            return self.invoke_binding(stack, Some(object), binding);
        }

        if self.config.static_via_instance
            && let Some(name) = &name
            && let Some(member) = self.lookup_member(hash, name, MemberFilter::STATIC)
        {
            return self.push_member(stack, None, hash, member, CallKind::Static);
        }

        Err(self.unknown_member(hash, key_display(stack, 2)))
    }

    /// `__index` of type proxies: (proxy, key).
    pub(super) fn type_index(&self, stack: &mut dyn ScriptStack) -> Result<i32, BridgeError> {
        let target = self.type_target(stack, 1)?;
        let Some(name) = string_key(stack, 2) else {
            return Err(self.unknown_member(target, key_display(stack, 2)));
        };

        if let Some(member) = self.lookup_member(target, &name, MemberFilter::STATIC) {
            return self.push_member(stack, None, target, member, CallKind::Static);
        }
        if name == "new" {
            self.push_cached_function(stack, target, "ctor:new", || self.constructor_function(target));
            return Ok(1);
        }
        Err(self.unknown_member(target, name))
    }

    /// Push the script view of a resolved member.
    fn push_member(
        &self,
        stack: &mut dyn ScriptStack,
        this: Option<&HostRef>,
        hash: TypeHash,
        member: Member,
        kind: CallKind,
    ) -> Result<i32, BridgeError> {
        match member {
            Member::Property(property) => {
                let getter = property.getter.as_ref().ok_or_else(|| {
                    BridgeError::script(format!("property '{}' is write-only", property.name))
                })?;
                let value = getter(this)?;
                self.push(stack, &value)?;
            }
            Member::Event(event) => {
                let handle = HostRef::new(builtin::event_handle(), EventHandle::new(this.cloned(), event));
                self.push_object(stack, &handle)?;
            }
            Member::Methods(group) => {
                let key = kind.cache_key(&group.name);
                self.push_cached_function(stack, hash, &key, || self.method_function(hash, group, kind));
            }
            Member::NestedType(nested) => self.push_type(stack, nested)?,
        }
        Ok(1)
    }

    // ------------------------------------------------------------------
    // Writing members
    // ------------------------------------------------------------------

    /// `__newindex` of host objects: (object, key, value).
    pub(super) fn instance_newindex(&self, stack: &mut dyn ScriptStack) -> Result<i32, BridgeError> {
        let object = self.receiver(stack, 1)?;
        let hash = object.type_hash();
        let name = string_key(stack, 2);

        if let Some(name) = &name
            && let Some(member) = self.lookup_member(hash, name, MemberFilter::INSTANCE)
        {
            self.assign_member(stack, Some(&object), name, member)?;
            return Ok(0);
        }

        if stack.type_of(2) == ValueTag::Number && object.is::<HostArray>() {
            self.assign_element(stack, &object)?;
            return Ok(0);
        }

        if let Some(Member::Methods(group)) = self.lookup_member(hash, "set_Item", MemberFilter::INSTANCE)
            && let Some(binding) = self.first_match(stack, &group.instances(), 2, 2)
        {
            self.invoke_binding(stack, Some(object), binding)?;
            return Ok(0);
        }

        if self.config.static_via_instance
            && let Some(name) = &name
            && let Some(member) = self.lookup_member(hash, name, MemberFilter::STATIC)
        {
            self.assign_member(stack, None, name, member)?;
            return Ok(0);
        }

        Err(self.unknown_member(hash, key_display(stack, 2)))
    }

    /// `__newindex` of type proxies: (proxy, key, value).
    pub(super) fn type_newindex(&self, stack: &mut dyn ScriptStack) -> Result<i32, BridgeError> {
        let target = self.type_target(stack, 1)?;
        let name = string_key(stack, 2);
        match name
            .as_deref()
            .and_then(|name| self.lookup_member(target, name, MemberFilter::STATIC))
        {
            Some(member) => {
                self.assign_member(stack, None, name.as_deref().unwrap_or_default(), member)?;
                Ok(0)
            }
            None => Err(self.unknown_member(target, key_display(stack, 2))),
        }
    }

    /// Convert the value at index 3 and hand it to a property setter.
    fn assign_member(
        &self,
        stack: &mut dyn ScriptStack,
        this: Option<&HostRef>,
        name: &str,
        member: Member,
    ) -> Result<(), BridgeError> {
        let property: Rc<PropertyEntry> = match member {
            Member::Property(property) => property,
            Member::Event(_) => {
                return Err(BridgeError::script(format!(
                    "cannot assign to event '{name}'; use its add/remove methods"
                )));
            }
            Member::Methods(_) | Member::NestedType(_) => {
                return Err(BridgeError::script(format!("cannot assign to member '{name}'")));
            }
        };
        let setter = property
            .setter
            .as_ref()
            .ok_or_else(|| BridgeError::script(format!("property '{}' is read-only", property.name)))?;
        let extractor = self
            .check_and_get_extractor(stack, 3, &property.ty)
            .ok_or_else(|| self.mismatch(&property.ty, stack.type_of(3)))?;
        let value = extractor.extract(self, stack, 3)?;
        setter(this, value)?;
        Ok(())
    }

    fn assign_element(&self, stack: &mut dyn ScriptStack, object: &HostRef) -> Result<(), BridgeError> {
        let (element_type, len) = match object.borrow::<HostArray>() {
            Some(array) => (array.element_type().clone(), array.len()),
            None => return Err(BridgeError::script("expected a host array")),
        };
        let position = array_position(stack, 2, len)?;
        let extractor = self
            .check_and_get_extractor(stack, 3, &element_type)
            .ok_or_else(|| self.mismatch(&element_type, stack.type_of(3)))?;
        let value = extractor.extract(self, stack, 3)?;
        match object.borrow_mut::<HostArray>() {
            Some(mut array) => {
                array.set(position, value);
                Ok(())
            }
            None => Err(BridgeError::script("host array is in use")),
        }
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    /// Script function dispatching a method group.
    fn method_function(&self, hash: TypeHash, group: MethodGroup, kind: CallKind) -> NativeFunction {
        let weak = self.this.clone();
        let member = format!("{}.{}", self.registry.type_name(hash), group.name);
        let candidates: Rc<[Rc<MethodEntry>]> = match kind {
            CallKind::Instance => group.instances().into(),
            CallKind::Static => group.statics().into(),
        };
        Rc::new(move |stack: &mut dyn ScriptStack| {
            let bridge = upgrade(&weak)?;
            bridge.enter(stack);
            match kind {
                CallKind::Instance => bridge.call_instance(stack, hash, &member, &candidates),
                CallKind::Static => bridge.call_static(stack, hash, &member, &candidates),
            }
        })
    }

    /// `object:method(...)`: the receiver is argument 1.
    fn call_instance(
        &self,
        stack: &mut dyn ScriptStack,
        hash: TypeHash,
        member: &str,
        candidates: &[Rc<MethodEntry>],
    ) -> Result<i32, BridgeError> {
        let this = match self.resolve_userdata(stack, 1)? {
            Some(this) if self.registry.is_assignable(this.type_hash(), hash) => this,
            _ => {
                return Err(BridgeError::script(format!(
                    "method '{member}' needs an instance receiver; call it with ':'"
                )));
            }
        };
        let top = stack.get_top();
        let binding = self.resolve_overload(stack, member, candidates, 2, top - 1)?;
        self.invoke_binding(stack, Some(this), binding)
    }

    /// `Type.method(...)`, or a static reached through an instance.
    ///
    /// Every argument is bound. `Type:method(...)` skips the type proxy. When
    /// binding fails but would succeed without a leading instance of the
    /// type, the call used instance syntax for a static member.
    fn call_static(
        &self,
        stack: &mut dyn ScriptStack,
        hash: TypeHash,
        member: &str,
        candidates: &[Rc<MethodEntry>],
    ) -> Result<i32, BridgeError> {
        let top = stack.get_top();
        let first = if top >= 1 && self.is_type_proxy_of(stack, 1, hash) { 2 } else { 1 };
        if let Some(binding) = self.first_match(stack, candidates, first, top - first + 1) {
            return self.invoke_binding(stack, None, binding);
        }

        if first == 1
            && top >= 1
            && let Ok(Some(object)) = self.resolve_userdata(stack, 1)
            && self.registry.is_assignable(object.type_hash(), hash)
            && self.first_match(stack, candidates, 2, top - 1).is_some()
        {
            return Err(BridgeError::StaticCallViaInstance {
                type_name: self.registry.type_name(hash),
                member: member.rsplit('.').next().unwrap_or(member).to_owned(),
            });
        }
        Err(self.no_overload(stack, member, first, top - first + 1))
    }

    fn constructor_function(&self, hash: TypeHash) -> NativeFunction {
        let weak = self.this.clone();
        Rc::new(move |stack: &mut dyn ScriptStack| {
            let bridge = upgrade(&weak)?;
            bridge.enter(stack);
            let first = if bridge.is_type_proxy_of(stack, 1, hash) { 2 } else { 1 };
            bridge.construct(stack, hash, first)
        })
    }

    /// `__call` of type proxies: (proxy, args...).
    pub(super) fn type_call(&self, stack: &mut dyn ScriptStack) -> Result<i32, BridgeError> {
        let target = self.type_target(stack, 1)?;
        self.construct(stack, target, 2)
    }

    /// Create an instance from the arguments at `first..=top`.
    ///
    /// Classes bind a constructor. Delegate types adapt a script function
    /// and interfaces a script table.
    fn construct(&self, stack: &mut dyn ScriptStack, hash: TypeHash, first: i32) -> Result<i32, BridgeError> {
        let top = stack.get_top();
        let count = top - first + 1;
        let entry = self
            .registry
            .get(hash)
            .ok_or_else(|| BridgeError::TypeNotFound(self.registry.type_name(hash)))?;
        let member = format!("{}.new", entry.qualified_name);

        match entry.kind {
            ClassKind::Class => {
                if entry.constructors.is_empty() {
                    return Err(self.unknown_member(hash, "new".to_owned()));
                }
                let binding = self.resolve_overload(stack, &member, &entry.constructors, first, count)?;
                self.invoke_binding(stack, None, binding)
            }
            ClassKind::Delegate if count == 1 && stack.type_of(first) == ValueTag::Function => {
                let reference = self.anchor(stack, first);
                let function = ScriptFunction::new(reference, &self.releases);
                let proxy = self.adapt_function(stack, hash, &function)?;
                self.push_object(stack, &proxy)?;
                Ok(1)
            }
            ClassKind::Interface if count == 1 && stack.type_of(first) == ValueTag::Table => {
                let value = match self.adapter_for(hash) {
                    Some(extractor @ Extractor::Interface(_)) => extractor.extract(self, stack, first)?,
                    _ => return Err(self.no_overload(stack, &member, first, count)),
                };
                self.push(stack, &value)?;
                Ok(1)
            }
            ClassKind::Delegate | ClassKind::Interface => Err(self.no_overload(stack, &member, first, count)),
        }
    }

    /// `__call` of delegate instances: (delegate, args...).
    pub(super) fn delegate_call(&self, stack: &mut dyn ScriptStack) -> Result<i32, BridgeError> {
        let object = self.receiver(stack, 1)?;
        let hash = object.type_hash();
        let signature = self
            .registry
            .get(hash)
            .and_then(|entry| entry.invoke.clone())
            .ok_or_else(|| BridgeError::NotCallable(self.registry.type_name(hash)))?;
        let invoke = Rc::new(MethodEntry {
            name: "Invoke".to_owned(),
            signature,
            is_static: false,
            declaring_type: hash,
            implementation: None,
        });
        let member = format!("{}.Invoke", self.registry.type_name(hash));
        let top = stack.get_top();
        let binding = self.resolve_overload(stack, &member, &[invoke], 2, top - 1)?;
        self.invoke_binding(stack, Some(object), binding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryState;
    use hostbridge_core::{HostFault, TypeRef};
    use hostbridge_registry::TypeRegistry;

    #[derive(Default)]
    struct Account {
        balance: i64,
        owner: String,
        items: Vec<f64>,
    }

    thread_local! {
        static BANK_NAME: std::cell::RefCell<String> = std::cell::RefCell::new("First".into());
    }

    fn bridge() -> Rc<Bridge> {
        let mut registry = TypeRegistry::new();
        registry
            .class::<Account>("Bank.Account")
            .constructor("()", |_| Ok(Account::default()))
            .unwrap()
            .constructor("(string owner)", |ctx| {
                Ok(Account {
                    owner: ctx.arg(0)?,
                    ..Default::default()
                })
            })
            .unwrap()
            .field("i64 Balance", |a: &Account| a.balance, |a, v| a.balance = v)
            .unwrap()
            .property("string Owner", |a: &Account| a.owner.clone())
            .unwrap()
            .method("void deposit(i64 amount)", |ctx| {
                let amount: i64 = ctx.arg(0)?;
                if amount <= 0 {
                    return Err(HostFault::new("ArgumentError", "amount must be positive"));
                }
                ctx.this_mut::<Account>()?.balance += amount;
                Ok(())
            })
            .unwrap()
            .method("f64 get_Item(i32 index)", |ctx| {
                let index: i32 = ctx.arg(0)?;
                let account = ctx.this_ref::<Account>()?;
                account
                    .items
                    .get(index as usize)
                    .copied()
                    .ok_or_else(|| HostFault::new("IndexError", "no such item"))
            })
            .unwrap()
            .method("void set_Item(i32 index, f64 value)", |ctx| {
                let index = ctx.arg::<i32>(0)? as usize;
                let value: f64 = ctx.arg(1)?;
                let mut account = ctx.this_mut::<Account>()?;
                if account.items.len() <= index {
                    account.items.resize(index + 1, 0.0);
                }
                account.items[index] = value;
                Ok(())
            })
            .unwrap()
            .method("static Bank.Account open(string owner)", |ctx| {
                let account = Account {
                    owner: ctx.arg(0)?,
                    ..Default::default()
                };
                Ok(HostRef::named("Bank.Account", account))
            })
            .unwrap()
            .method("static string describe(Bank.Account account)", |ctx| {
                let account: HostRef = ctx.arg(0)?;
                let owner = account.borrow::<Account>().map(|a| a.owner.clone()).unwrap_or_default();
                Ok(format!("account of {owner}"))
            })
            .unwrap()
            .static_field(
                "string BankName",
                || BANK_NAME.with(|n| n.borrow().clone()),
                |v: String| BANK_NAME.with(|n| *n.borrow_mut() = v),
            )
            .unwrap()
            .build()
            .unwrap();
        registry.class::<()>("Bank.Account.Kind").nested_in("Bank.Account").build().unwrap();
        Bridge::new(registry).unwrap()
    }

    /// Push `Bank.Account` as global `Account` and an instance as global `acct`.
    fn setup() -> (Rc<Bridge>, MemoryState) {
        let bridge = bridge();
        let mut s = MemoryState::new();
        bridge.import_type(&mut s, "Bank.Account").unwrap();
        s.set_global("Account").unwrap();
        s.get_global("Account").unwrap();
        s.push_string("ada");
        s.pcall(1, 1).unwrap();
        s.set_global("acct").unwrap();
        (bridge, s)
    }

    fn call_method(s: &mut MemoryState, object: &str, method: &str, args: &[f64]) -> Result<(), BridgeError> {
        s.get_global(object)?;
        s.get_field(-1, method)?;
        s.insert(-2);
        for &arg in args {
            s.push_number(arg);
        }
        s.pcall(args.len() as i32 + 1, 1)
    }

    #[test]
    fn fields_properties_and_methods() {
        let (_bridge, mut s) = setup();
        call_method(&mut s, "acct", "deposit", &[25.0]).unwrap();
        s.get_global("acct").unwrap();
        s.get_field(-1, "Balance").unwrap();
        assert_eq!(s.to_number(-1), Some(25.0));
        s.get_field(-2, "owner").unwrap();
        assert_eq!(s.to_str(-1).as_deref(), Some("ada"));

        s.push_number(5.0);
        s.set_field(-4, "balance").unwrap();
        s.get_field(-4, "Balance").unwrap();
        assert_eq!(s.to_number(-1), Some(5.0));
    }

    #[test]
    fn host_faults_surface_unwrapped() {
        let (_bridge, mut s) = setup();
        let err = call_method(&mut s, "acct", "deposit", &[-1.0]).unwrap_err();
        let fault = err.host_fault().expect("host fault");
        assert_eq!(fault.type_name(), "ArgumentError");
        assert_eq!(fault.message(), "amount must be positive");
    }

    #[test]
    fn unknown_members_raise() {
        let (_bridge, mut s) = setup();
        s.get_global("acct").unwrap();
        let err = s.get_field(-1, "totallyMissingField").unwrap_err();
        assert_eq!(
            err,
            BridgeError::UnknownMember {
                type_name: "Bank.Account".into(),
                member: "totallyMissingField".into()
            }
        );
        s.set_top(0);
        s.get_global("acct").unwrap();
        s.push_number(1.0);
        assert!(s.set_field(-2, "nope").is_err());
    }

    #[test]
    fn read_only_property_rejects_assignment() {
        let (_bridge, mut s) = setup();
        s.get_global("acct").unwrap();
        s.push_string("eve");
        let err = s.set_field(-2, "Owner").unwrap_err();
        assert_eq!(err, BridgeError::script("property 'Owner' is read-only"));
    }

    #[test]
    fn indexers() {
        let (_bridge, mut s) = setup();
        s.get_global("acct").unwrap();
        s.push_number(2.0);
        s.push_number(7.5);
        s.set_table(1).unwrap();
        s.push_number(2.0);
        s.get_table(1).unwrap();
        assert_eq!(s.to_number(-1), Some(7.5));
        s.push_number(9.0);
        let err = s.get_table(1).unwrap_err();
        assert_eq!(err.host_fault().map(|f| f.type_name()), Some("IndexError"));
    }

    #[test]
    fn statics_through_type_and_instance() {
        let (bridge, mut s) = setup();
        s.get_global("Account").unwrap();
        s.get_field(-1, "BankName").unwrap();
        assert_eq!(s.to_str(-1).as_deref(), Some("First"));
        s.set_top(0);

        // static property via an instance
        s.get_global("acct").unwrap();
        s.push_string("Second");
        s.set_field(-2, "BankName").unwrap();
        assert_eq!(bridge.get_global(&mut s, "Account.BankName").unwrap(), HostValue::from("Second"));
        s.set_top(0);

        // Account.open("bob")
        s.get_global("Account").unwrap();
        s.get_field(-1, "open").unwrap();
        s.push_string("bob");
        s.pcall(1, 1).unwrap();
        s.get_field(-1, "Owner").unwrap();
        assert_eq!(s.to_str(-1).as_deref(), Some("bob"));
    }

    #[test]
    fn static_called_with_instance_syntax() {
        let (_bridge, mut s) = setup();
        // acct:open("x") passes acct as the first argument
        s.get_global("acct").unwrap();
        s.get_field(-1, "open").unwrap();
        s.insert(-2);
        s.push_string("x");
        let err = s.pcall(2, 1).unwrap_err();
        assert!(matches!(err, BridgeError::StaticCallViaInstance { ref member, .. } if member == "open"));

        // a static taking the instance explicitly is fine
        s.get_global("Account").unwrap();
        s.get_field(-1, "describe").unwrap();
        s.get_global("acct").unwrap();
        s.pcall(1, 1).unwrap();
        assert_eq!(s.to_str(-1).as_deref(), Some("account of ada"));
    }

    #[test]
    fn instance_method_needs_receiver() {
        let (_bridge, mut s) = setup();
        s.get_global("acct").unwrap();
        s.get_field(-1, "deposit").unwrap();
        s.push_number(1.0);
        assert!(matches!(s.pcall(1, 0), Err(BridgeError::Script(_))));
    }

    #[test]
    fn constructors_via_new_and_call() {
        let (_bridge, mut s) = setup();
        s.get_global("Account").unwrap();
        s.get_field(-1, "new").unwrap();
        s.pcall(0, 1).unwrap();
        s.get_field(-1, "Balance").unwrap();
        assert_eq!(s.to_number(-1), Some(0.0));

        // Account:new("x")
        s.set_top(0);
        s.get_global("Account").unwrap();
        s.get_field(-1, "new").unwrap();
        s.insert(-2);
        s.push_string("x");
        s.pcall(2, 1).unwrap();
        s.get_field(-1, "Owner").unwrap();
        assert_eq!(s.to_str(-1).as_deref(), Some("x"));

        s.set_top(0);
        s.get_global("Account").unwrap();
        s.push_boolean(true);
        assert!(matches!(s.pcall(1, 1), Err(BridgeError::NoOverloadMatched { .. })));
    }

    #[test]
    fn nested_types_resolve_by_qualified_name() {
        let (bridge, mut s) = setup();
        s.get_global("Account").unwrap();
        s.get_field(-1, "Kind").unwrap();
        match bridge.get_object(&mut s, -1) {
            HostValue::Object(proxy) => {
                let target = proxy.borrow::<crate::dispatch::TypeProxy>().map(|p| p.target());
                assert_eq!(target, Some(hostbridge_core::TypeHash::from_name("Bank.Account.Kind")));
            }
            other => panic!("expected type proxy, got {other:?}"),
        }
    }

    #[test]
    fn arrays_are_zero_based() {
        let bridge = bridge();
        let mut s = MemoryState::new();
        let array = HostArray::new(
            TypeRef::Primitive(hostbridge_core::PrimitiveKind::I32),
            vec![HostValue::I32(10), HostValue::I32(20)],
        )
        .into_host_ref();
        bridge.push(&mut s, &HostValue::Object(array.clone())).unwrap();
        s.push_number(1.0);
        s.get_table(1).unwrap();
        assert_eq!(s.to_number(-1), Some(20.0));
        s.get_field(1, "Length").unwrap();
        assert_eq!(s.to_number(-1), Some(2.0));

        s.push_number(0.0);
        s.push_number(99.9);
        s.set_table(1).unwrap();
        assert_eq!(array.borrow::<HostArray>().map(|a| a.items()[0].clone()), Some(HostValue::I32(99)));

        s.push_number(5.0);
        assert!(s.get_table(1).is_err());
        s.push_number(0.0);
        s.push_string("x");
        assert!(matches!(s.set_table(1), Err(BridgeError::Conversion(_))));
    }

    #[test]
    fn method_functions_are_cached_per_type() {
        let (_bridge, mut s) = setup();
        s.get_global("acct").unwrap();
        s.get_field(1, "deposit").unwrap();
        s.get_field(1, "deposit").unwrap();
        assert!(s.raw_equal(-1, -2));
    }

    #[test]
    fn stale_receivers_are_errors() {
        let (bridge, mut s) = setup();
        s.get_global("acct").unwrap();
        let HostValue::Object(account) = bridge.get_object(&mut s, 1) else {
            panic!("expected object");
        };
        let handle = bridge.detach(&mut s, &account).unwrap();
        assert!(bridge.resolve(handle).is_none());
        let err = s.get_field(1, "Balance").unwrap_err();
        assert!(err.is_member_not_found());
        assert_eq!(bridge.get_object(&mut s, 1), HostValue::Null);
    }
}
