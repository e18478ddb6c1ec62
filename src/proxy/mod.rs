//! Script functions and tables adapted to host delegate and interface types.
//!
//! An adapter is built once per host type from its reflected signatures: a
//! list of `(direction, type)` pairs plus a return type per method. A proxy
//! couples an adapter with one script value and is what host code holds:
//!
//! - [`DelegateProxy`]: a script function behind a delegate type
//! - [`InterfaceProxy`]: a script table behind an interface type; methods
//!   are looked up on the table by name and called with the table as their
//!   first argument
//!
//! Invoking a proxy pushes the script callable and the `in`/`ref` arguments,
//! runs it in protected mode, converts the first result to the return type
//! and the following results to the `ref`/`out` slots, in parameter order.
//! One proxy exists per (adapted type, script value) while host code holds it.

mod event;

use std::rc::Rc;

use rustc_hash::FxHashMap;

use hostbridge_core::{
    BridgeError, HostRef, HostValue, MULTRET, ParamDirection, RegistrationError, RegistryRef, ScriptFunction, ScriptHost,
    ScriptStack, ScriptTable, Signature, TypeHash, TypeRef, ValueTag,
};
use hostbridge_registry::ClassKind;

use crate::bridge::Bridge;
use crate::extract::Extractor;

pub use event::EventHandle;
pub(crate) use event::register_event_handle;

/// Shape of one adapted callable.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterSignature {
    pub name: String,
    /// Direction and (dereferenced) type of every declared parameter.
    pub params: Vec<(ParamDirection, TypeRef)>,
    pub return_type: TypeRef,
}

impl AdapterSignature {
    pub fn from_signature(name: impl Into<String>, signature: &Signature) -> Self {
        Self {
            name: name.into(),
            params: signature
                .params
                .iter()
                .map(|param| (param.direction, param.ty.strip_ref().clone()))
                .collect(),
            return_type: signature.return_type.clone(),
        }
    }

    /// Number of values passed to script.
    fn input_count(&self) -> usize {
        self.params
            .iter()
            .filter(|(direction, _)| *direction != ParamDirection::Out)
            .count()
    }
}

#[derive(Debug)]
pub struct DelegateAdapter {
    delegate_type: TypeHash,
    signature: AdapterSignature,
}

impl DelegateAdapter {
    pub fn delegate_type(&self) -> TypeHash {
        self.delegate_type
    }

    pub fn signature(&self) -> &AdapterSignature {
        &self.signature
    }
}

#[derive(Debug)]
pub struct InterfaceAdapter {
    interface: TypeHash,
    methods: FxHashMap<String, AdapterSignature>,
}

impl InterfaceAdapter {
    pub fn interface(&self) -> TypeHash {
        self.interface
    }

    pub fn method(&self, name: &str) -> Option<&AdapterSignature> {
        self.methods.get(name)
    }
}

/// Host-side handle on a script function adapted to a delegate type.
#[derive(Debug)]
pub struct DelegateProxy {
    adapter: Rc<DelegateAdapter>,
    function: ScriptFunction,
}

impl DelegateProxy {
    pub fn adapter(&self) -> &Rc<DelegateAdapter> {
        &self.adapter
    }

    pub fn function(&self) -> &ScriptFunction {
        &self.function
    }
}

/// Host-side handle on a script table implementing an interface.
#[derive(Debug)]
pub struct InterfaceProxy {
    adapter: Rc<InterfaceAdapter>,
    table: ScriptTable,
}

impl InterfaceProxy {
    pub fn adapter(&self) -> &Rc<InterfaceAdapter> {
        &self.adapter
    }

    pub fn table(&self) -> &ScriptTable {
        &self.table
    }
}

/// What a proxy call runs.
enum Callee<'a> {
    Function(&'a ScriptFunction),
    /// `table[name](table, ...)`
    Method { table: &'a ScriptTable, name: &'a str },
}

impl Bridge {
    /// The adapter extractor for a delegate or interface type, built on
    /// first use.
    pub(crate) fn adapter_for(&self, hash: TypeHash) -> Option<Extractor> {
        if let Some(cached) = self.adapters.borrow().get(&hash) {
            return cached.clone();
        }
        let entry = self.registry.get(hash)?;
        let extractor = match entry.kind {
            ClassKind::Delegate => entry.invoke.as_ref().map(|invoke| {
                Extractor::Delegate(Rc::new(DelegateAdapter {
                    delegate_type: hash,
                    signature: AdapterSignature::from_signature("Invoke", invoke),
                }))
            }),
            ClassKind::Interface => {
                let mut methods = FxHashMap::default();
                for ty in self.registry.hierarchy(hash) {
                    for method in ty.methods.iter().filter(|m| !m.is_static) {
                        methods
                            .entry(method.name.clone())
                            .or_insert_with(|| AdapterSignature::from_signature(&method.name, &method.signature));
                    }
                }
                Some(Extractor::Interface(Rc::new(InterfaceAdapter {
                    interface: hash,
                    methods,
                })))
            }
            ClassKind::Class => None,
        };
        log::debug!("built adapter for {}", entry.qualified_name);
        self.adapters.borrow_mut().insert(hash, extractor.clone());
        extractor
    }

    /// The live proxy of `hash` for the script value at `index`, or a new
    /// one anchoring that value.
    fn cached_proxy(
        &self,
        stack: &mut dyn ScriptStack,
        index: i32,
        hash: TypeHash,
        make: impl FnOnce(&Self, RegistryRef) -> HostRef,
    ) -> HostRef {
        let key = (hash, stack.to_pointer(index));
        let live = self.proxies.borrow().get(&key).and_then(|weak| weak.upgrade());
        if let Some(proxy) = live {
            return proxy;
        }
        let reference = self.anchor(stack, index);
        let proxy = make(self, reference);
        let mut proxies = self.proxies.borrow_mut();
        proxies.retain(|_, weak| weak.upgrade().is_some());
        proxies.insert(key, proxy.downgrade());
        proxy
    }

    pub(crate) fn delegate_proxy(
        &self,
        stack: &mut dyn ScriptStack,
        index: i32,
        adapter: &Rc<DelegateAdapter>,
    ) -> Result<HostRef, BridgeError> {
        let hash = adapter.delegate_type;
        Ok(self.cached_proxy(stack, index, hash, |bridge, reference| {
            let proxy = DelegateProxy {
                adapter: adapter.clone(),
                function: ScriptFunction::new(reference, &bridge.releases),
            };
            HostRef::new(hash, proxy)
        }))
    }

    pub(crate) fn interface_proxy(
        &self,
        stack: &mut dyn ScriptStack,
        index: i32,
        adapter: &Rc<InterfaceAdapter>,
    ) -> Result<HostRef, BridgeError> {
        let hash = adapter.interface;
        Ok(self.cached_proxy(stack, index, hash, |bridge, reference| {
            let proxy = InterfaceProxy {
                adapter: adapter.clone(),
                table: ScriptTable::new(reference, &bridge.releases),
            };
            HostRef::new(hash, proxy)
        }))
    }

    /// Adapt a script function to a delegate type.
    pub fn adapt_function(
        &self,
        stack: &mut dyn ScriptStack,
        delegate_type: TypeHash,
        function: &ScriptFunction,
    ) -> Result<HostRef, BridgeError> {
        self.enter(stack);
        let Some(Extractor::Delegate(adapter)) = self.adapter_for(delegate_type) else {
            return Err(RegistrationError::WrongKind {
                type_name: self.registry.type_name(delegate_type),
                expected: "a delegate type".to_owned(),
            }
            .into());
        };
        let base = stack.get_top();
        stack.push_reference(function.reference());
        let proxy = self.delegate_proxy(stack, -1, &adapter);
        stack.set_top(base);
        proxy
    }

    /// Invoke a delegate proxy (`method` is `None` or `"Invoke"`) or a method
    /// of an interface proxy. `ref`/`out` slots of `args` receive the values
    /// script returned for them.
    pub fn invoke_proxy(
        &self,
        stack: &mut dyn ScriptStack,
        target: &HostRef,
        method: Option<&str>,
        args: &mut [HostValue],
    ) -> Result<HostValue, BridgeError> {
        self.enter(stack);
        let type_name = || self.registry.type_name(target.type_hash());

        let delegate = target
            .borrow::<DelegateProxy>()
            .map(|proxy| (proxy.adapter.clone(), proxy.function.clone()));
        if let Some((adapter, function)) = delegate {
            if let Some(name) = method
                && name != "Invoke"
            {
                return Err(BridgeError::UnknownMember {
                    type_name: type_name(),
                    member: name.to_owned(),
                });
            }
            return self.call_adapted(stack, Callee::Function(&function), &adapter.signature, args);
        }

        let interface = target
            .borrow::<InterfaceProxy>()
            .map(|proxy| (proxy.adapter.clone(), proxy.table.clone()));
        if let Some((adapter, table)) = interface {
            let name = method.ok_or_else(|| BridgeError::NotCallable(type_name()))?;
            let signature = adapter.method(name).ok_or_else(|| BridgeError::UnknownMember {
                type_name: type_name(),
                member: name.to_owned(),
            })?;
            return self.call_adapted(stack, Callee::Method { table: &table, name }, signature, args);
        }

        Err(BridgeError::NotCallable(type_name()))
    }

    fn call_adapted(
        &self,
        stack: &mut dyn ScriptStack,
        callee: Callee<'_>,
        signature: &AdapterSignature,
        args: &mut [HostValue],
    ) -> Result<HostValue, BridgeError> {
        if args.len() != signature.params.len() {
            return Err(BridgeError::script(format!(
                "'{}' takes {} arguments, {} given",
                signature.name,
                signature.params.len(),
                args.len()
            )));
        }
        let needed = signature.input_count() + 2;
        if !stack.check_stack(needed + self.config.stack_reserve) {
            return Err(BridgeError::StackOverflow { needed });
        }

        let base = stack.get_top();
        let outcome = self.run_callee(stack, callee, signature, args, base);
        stack.set_top(base);
        outcome
    }

    fn run_callee(
        &self,
        stack: &mut dyn ScriptStack,
        callee: Callee<'_>,
        signature: &AdapterSignature,
        args: &mut [HostValue],
        base: i32,
    ) -> Result<HostValue, BridgeError> {
        let mut nargs = 0;
        match callee {
            Callee::Function(function) => stack.push_reference(function.reference()),
            Callee::Method { table, name } => {
                stack.push_reference(table.reference());
                stack.get_field(-1, name)?;
                if stack.type_of(-1).is_nil_or_none() {
                    return Err(BridgeError::UnknownMember {
                        type_name: "script table".to_owned(),
                        member: name.to_owned(),
                    });
                }
                stack.insert(-2);
                nargs = 1;
            }
        }
        for ((direction, _), value) in signature.params.iter().zip(args.iter()) {
            if *direction != ParamDirection::Out {
                self.push(stack, value)?;
                nargs += 1;
            }
        }
        stack.pcall(nargs, MULTRET)?;

        let top = stack.get_top();
        let mut position = base + 1;
        let result = if signature.return_type.is_void() {
            HostValue::Null
        } else {
            let value = self.convert_result(stack, position, top, &signature.return_type)?;
            position += 1;
            value
        };
        for ((direction, ty), slot) in signature.params.iter().zip(args.iter_mut()) {
            if *direction != ParamDirection::In {
                *slot = self.convert_result(stack, position, top, ty)?;
                position += 1;
            }
        }
        Ok(result)
    }

    /// Convert the script result at `position` (absent past `top`).
    fn convert_result(
        &self,
        stack: &mut dyn ScriptStack,
        position: i32,
        top: i32,
        ty: &TypeRef,
    ) -> Result<HostValue, BridgeError> {
        if position > top {
            return if ty.accepts_nil() {
                Ok(HostValue::Null)
            } else {
                Err(self.mismatch(ty, ValueTag::None))
            };
        }
        let extractor = self
            .check_and_get_extractor(stack, position, ty)
            .ok_or_else(|| self.mismatch(ty, stack.type_of(position)))?;
        extractor.extract(self, stack, position)
    }

    /// Call a script function with host arguments, returning every result.
    pub fn call_function(
        &self,
        stack: &mut dyn ScriptStack,
        function: &ScriptFunction,
        args: &[HostValue],
    ) -> Result<Vec<HostValue>, BridgeError> {
        self.enter(stack);
        let needed = args.len() + 1;
        if !stack.check_stack(needed + self.config.stack_reserve) {
            return Err(BridgeError::StackOverflow { needed });
        }
        let base = stack.get_top();
        let outcome = self.run_function(stack, function, args, base);
        stack.set_top(base);
        outcome
    }

    fn run_function(
        &self,
        stack: &mut dyn ScriptStack,
        function: &ScriptFunction,
        args: &[HostValue],
        base: i32,
    ) -> Result<Vec<HostValue>, BridgeError> {
        stack.push_reference(function.reference());
        for arg in args {
            self.push(stack, arg)?;
        }
        stack.pcall(args.len() as i32, MULTRET)?;
        let top = stack.get_top();
        Ok((base + 1..=top).map(|index| self.get_object(stack, index)).collect())
    }
}

impl ScriptHost for Bridge {
    fn invoke_proxy(
        &self,
        stack: &mut dyn ScriptStack,
        target: &HostRef,
        method: Option<&str>,
        args: &mut [HostValue],
    ) -> Result<HostValue, BridgeError> {
        Bridge::invoke_proxy(self, stack, target, method, args)
    }

    fn adapt_function(
        &self,
        stack: &mut dyn ScriptStack,
        delegate_type: TypeHash,
        function: &ScriptFunction,
    ) -> Result<HostRef, BridgeError> {
        Bridge::adapt_function(self, stack, delegate_type, function)
    }

    fn call_function(
        &self,
        stack: &mut dyn ScriptStack,
        function: &ScriptFunction,
        args: &[HostValue],
    ) -> Result<Vec<HostValue>, BridgeError> {
        Bridge::call_function(self, stack, function, args)
    }
}
