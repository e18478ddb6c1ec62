//! ClassBuilder: fluent registration of host classes and interfaces.
//!
//! # Example
//!
//! ```ignore
//! registry.class::<Counter>("Demo.Counter")
//!     .constructor("(i32 start)", |ctx| Ok(Counter { n: ctx.arg(0)? }))?
//!     .method("i32 add(i32 a, i32 b)", |ctx| Ok(ctx.arg::<i32>(0)? + ctx.arg::<i32>(1)?))?
//!     .field("i32 n", |c: &Counter| c.n, |c, v| c.n = v)?
//!     .build()?;
//! ```

use std::any::Any;
use std::marker::PhantomData;
use std::rc::Rc;

use hostbridge_core::{
    CallContext, FromHost, HostFault, HostRef, HostValue, IntoHost, NativeFn, NativeGetter, NativeSetter,
    RegistrationError, TypeHash, TypeRef,
};

use crate::decl;
use crate::entries::{ClassEntry, ClassKind, EventEntry, MethodEntry, PropertyEntry, PropertyKind};
use crate::registry::TypeRegistry;

/// Builder for a class or interface entry.
///
/// Created by [`TypeRegistry::class`] or [`TypeRegistry::interface`].
pub struct ClassBuilder<'r, T: Any> {
    registry: &'r mut TypeRegistry,
    entry: ClassEntry,
    _marker: PhantomData<T>,
}

fn receiver_fault<T>() -> HostFault {
    HostFault::new(
        "InvalidReceiver",
        format!("receiver is not an accessible {}", std::any::type_name::<T>()),
    )
}

impl<'r, T: Any> ClassBuilder<'r, T> {
    pub(crate) fn new(registry: &'r mut TypeRegistry, entry: ClassEntry) -> Self {
        Self {
            registry,
            entry,
            _marker: PhantomData,
        }
    }

    /// Set the base class.
    pub fn base(mut self, qualified_name: &str) -> Self {
        self.entry.base = Some(TypeHash::from_name(qualified_name));
        self
    }

    /// Declare an implemented (or, for interfaces, inherited) interface.
    pub fn implements(mut self, qualified_name: &str) -> Self {
        self.entry.interfaces.push(TypeHash::from_name(qualified_name));
        self
    }

    /// Declare this type as nested inside `outer`.
    pub fn nested_in(mut self, outer: &str) -> Self {
        self.entry.declaring_type = Some(TypeHash::from_name(outer));
        self
    }

    fn check_class(&self, what: &str) -> Result<(), RegistrationError> {
        if self.entry.kind == ClassKind::Class {
            Ok(())
        } else {
            Err(RegistrationError::WrongKind {
                type_name: self.entry.qualified_name.clone(),
                expected: format!("a class (only classes have {what})"),
            })
        }
    }

    fn push_method(&mut self, decl: &str, implementation: Option<NativeFn>) -> Result<(), RegistrationError> {
        let parsed = decl::parse_method(decl)?;
        self.entry.methods.push(Rc::new(MethodEntry {
            name: parsed.name,
            signature: parsed.signature,
            is_static: parsed.is_static,
            declaring_type: self.entry.type_hash,
            implementation,
        }));
        Ok(())
    }

    /// Add a constructor, e.g. `"(f64 x, f64 y)"`.
    pub fn constructor<F>(mut self, decl: &str, f: F) -> Result<Self, RegistrationError>
    where
        F: Fn(&mut CallContext<'_>) -> Result<T, HostFault> + 'static,
    {
        self.check_class("constructors")?;
        let hash = self.entry.type_hash;
        let signature = decl::parse_constructor(decl, TypeRef::Named(hash))?;
        let implementation: NativeFn = Rc::new(move |ctx: &mut CallContext<'_>| {
            f(ctx).map(|value| HostValue::Object(HostRef::new(hash, value)))
        });
        self.entry.constructors.push(Rc::new(MethodEntry {
            name: ".ctor".to_owned(),
            signature,
            is_static: true,
            declaring_type: hash,
            implementation: Some(implementation),
        }));
        Ok(self)
    }

    /// Add a method, e.g. `"i32 add(i32 a, i32 b)"` or `"static Point origin()"`.
    pub fn method<F, R>(mut self, decl: &str, f: F) -> Result<Self, RegistrationError>
    where
        F: Fn(&mut CallContext<'_>) -> Result<R, HostFault> + 'static,
        R: IntoHost,
    {
        let implementation: NativeFn = Rc::new(move |ctx: &mut CallContext<'_>| f(ctx).map(IntoHost::into_host));
        self.push_method(decl, Some(implementation))?;
        Ok(self)
    }

    /// Add a method without an implementation (interface members).
    pub fn abstract_method(mut self, decl: &str) -> Result<Self, RegistrationError> {
        self.push_method(decl, None)?;
        Ok(self)
    }

    fn push_property(
        &mut self,
        decl: &str,
        kind: PropertyKind,
        getter: Option<NativeGetter>,
        setter: Option<NativeSetter>,
    ) -> Result<(), RegistrationError> {
        let parsed = decl::parse_field(decl)?;
        self.entry.properties.push(Rc::new(PropertyEntry {
            name: parsed.name,
            ty: parsed.ty,
            kind,
            is_static: parsed.is_static,
            getter,
            setter,
        }));
        Ok(())
    }

    fn instance_getter<V, G>(get: G) -> NativeGetter
    where
        V: IntoHost,
        G: Fn(&T) -> V + 'static,
    {
        Rc::new(move |this: Option<&HostRef>| {
            let this = this.ok_or_else(receiver_fault::<T>)?;
            let payload = this.borrow::<T>().ok_or_else(receiver_fault::<T>)?;
            Ok(get(&payload).into_host())
        })
    }

    fn instance_setter<V, S>(set: S) -> NativeSetter
    where
        V: FromHost,
        S: Fn(&mut T, V) + 'static,
    {
        Rc::new(move |this: Option<&HostRef>, value: HostValue| {
            let value = V::from_host(&value)?;
            let this = this.ok_or_else(receiver_fault::<T>)?;
            let mut payload = this.borrow_mut::<T>().ok_or_else(receiver_fault::<T>)?;
            set(&mut payload, value);
            Ok(())
        })
    }

    /// Add a read/write field, e.g. `"i32 count"`.
    pub fn field<V, G, S>(mut self, decl: &str, get: G, set: S) -> Result<Self, RegistrationError>
    where
        V: IntoHost + FromHost,
        G: Fn(&T) -> V + 'static,
        S: Fn(&mut T, V) + 'static,
    {
        self.check_class("fields")?;
        let getter = Self::instance_getter(get);
        let setter = Self::instance_setter(set);
        self.push_property(decl, PropertyKind::Field, Some(getter), Some(setter))?;
        Ok(self)
    }

    /// Add a read-only property.
    pub fn property<V, G>(mut self, decl: &str, get: G) -> Result<Self, RegistrationError>
    where
        V: IntoHost,
        G: Fn(&T) -> V + 'static,
    {
        self.check_class("properties")?;
        let getter = Self::instance_getter(get);
        self.push_property(decl, PropertyKind::Property, Some(getter), None)?;
        Ok(self)
    }

    /// Add a read/write property whose setter may reject a value.
    pub fn property_rw<V, G, S>(mut self, decl: &str, get: G, set: S) -> Result<Self, RegistrationError>
    where
        V: IntoHost + FromHost,
        G: Fn(&T) -> V + 'static,
        S: Fn(&mut T, V) -> Result<(), HostFault> + 'static,
    {
        self.check_class("properties")?;
        let getter = Self::instance_getter(get);
        let setter: NativeSetter = Rc::new(move |this: Option<&HostRef>, value: HostValue| {
            let value = V::from_host(&value)?;
            let this = this.ok_or_else(receiver_fault::<T>)?;
            let mut payload = this.borrow_mut::<T>().ok_or_else(receiver_fault::<T>)?;
            set(&mut payload, value)
        });
        self.push_property(decl, PropertyKind::Property, Some(getter), Some(setter))?;
        Ok(self)
    }

    /// Add a static field, e.g. `"static string Greeting"`.
    pub fn static_field<V, G, S>(mut self, decl: &str, get: G, set: S) -> Result<Self, RegistrationError>
    where
        V: IntoHost + FromHost,
        G: Fn() -> V + 'static,
        S: Fn(V) + 'static,
    {
        let getter: NativeGetter = Rc::new(move |_: Option<&HostRef>| Ok(get().into_host()));
        let setter: NativeSetter = Rc::new(move |_: Option<&HostRef>, value: HostValue| {
            set(V::from_host(&value)?);
            Ok(())
        });
        let decl = if decl.trim_start().starts_with("static ") {
            decl.to_owned()
        } else {
            format!("static {decl}")
        };
        self.push_property(&decl, PropertyKind::Field, Some(getter), Some(setter))?;
        Ok(self)
    }

    /// Add an event of the given delegate type.
    ///
    /// `add` receives the delegate adapter to store; `remove` the one to drop.
    pub fn event<A, D>(mut self, name: &str, delegate_type: &str, add: A, remove: D) -> Result<Self, RegistrationError>
    where
        A: Fn(&mut T, HostRef) + 'static,
        D: Fn(&mut T, &HostRef) + 'static,
    {
        self.check_class("events")?;
        let add = move |this: Option<&HostRef>, handler: &HostRef| -> Result<(), HostFault> {
            let this = this.ok_or_else(receiver_fault::<T>)?;
            let mut payload = this.borrow_mut::<T>().ok_or_else(receiver_fault::<T>)?;
            add(&mut payload, handler.clone());
            Ok(())
        };
        let remove = move |this: Option<&HostRef>, handler: &HostRef| -> Result<(), HostFault> {
            let this = this.ok_or_else(receiver_fault::<T>)?;
            let mut payload = this.borrow_mut::<T>().ok_or_else(receiver_fault::<T>)?;
            remove(&mut payload, handler);
            Ok(())
        };
        self.entry.events.push(Rc::new(EventEntry {
            name: name.to_owned(),
            delegate_type: TypeHash::from_name(delegate_type),
            is_static: false,
            add: Rc::new(add),
            remove: Rc::new(remove),
        }));
        Ok(self)
    }

    /// Finish and register the type.
    pub fn build(self) -> Result<TypeHash, RegistrationError> {
        self.registry.register(self.entry)
    }
}
