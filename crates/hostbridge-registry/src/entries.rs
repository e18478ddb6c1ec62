//! Registry entries: what the bridge knows about a host type.

use std::any::TypeId;
use std::fmt;
use std::rc::Rc;

use hostbridge_core::{EventAccessor, NativeFn, NativeGetter, NativeSetter, Signature, TypeHash, TypeRef};

/// Kind of host type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Interface,
    Delegate,
}

/// A method or constructor.
pub struct MethodEntry {
    pub name: String,
    pub signature: Signature,
    pub is_static: bool,
    /// Type that declared the method.
    pub declaring_type: TypeHash,
    /// `None` for interface (abstract) methods.
    pub implementation: Option<NativeFn>,
}

impl MethodEntry {
    pub fn is_abstract(&self) -> bool {
        self.implementation.is_none()
    }
}

impl fmt::Debug for MethodEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodEntry")
            .field("name", &self.name)
            .field("signature", &self.signature.to_string())
            .field("is_static", &self.is_static)
            .field("abstract", &self.is_abstract())
            .finish()
    }
}

/// Whether a data member is a plain field or an accessor-backed property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Field,
    Property,
}

/// A field or property.
pub struct PropertyEntry {
    pub name: String,
    pub ty: TypeRef,
    pub kind: PropertyKind,
    pub is_static: bool,
    pub getter: Option<NativeGetter>,
    pub setter: Option<NativeSetter>,
}

impl fmt::Debug for PropertyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyEntry")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("kind", &self.kind)
            .field("is_static", &self.is_static)
            .field("readable", &self.getter.is_some())
            .field("writable", &self.setter.is_some())
            .finish()
    }
}

/// An event: subscribe/unsubscribe accessors for a delegate type.
pub struct EventEntry {
    pub name: String,
    pub delegate_type: TypeHash,
    pub is_static: bool,
    pub add: EventAccessor,
    pub remove: EventAccessor,
}

impl fmt::Debug for EventEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEntry")
            .field("name", &self.name)
            .field("delegate_type", &self.delegate_type)
            .field("is_static", &self.is_static)
            .finish()
    }
}

/// A registered host type.
#[derive(Debug)]
pub struct ClassEntry {
    /// Last segment of the qualified name.
    pub name: String,
    pub qualified_name: String,
    pub type_hash: TypeHash,
    pub kind: ClassKind,
    pub base: Option<TypeHash>,
    pub interfaces: Vec<TypeHash>,
    /// Enclosing type for nested types.
    pub declaring_type: Option<TypeHash>,
    pub constructors: Vec<Rc<MethodEntry>>,
    /// Methods in declaration order.
    pub methods: Vec<Rc<MethodEntry>>,
    pub properties: Vec<Rc<PropertyEntry>>,
    pub events: Vec<Rc<EventEntry>>,
    /// Simple names of nested types.
    pub nested: Vec<String>,
    /// Invoke signature of a delegate type.
    pub invoke: Option<Signature>,
    /// Rust payload type of instances, when known.
    pub rust_type: Option<TypeId>,
}

impl ClassEntry {
    pub fn new(qualified_name: impl Into<String>, kind: ClassKind) -> Self {
        let qualified_name = qualified_name.into();
        let name = qualified_name.rsplit('.').next().unwrap_or(&qualified_name).to_owned();
        Self {
            type_hash: TypeHash::from_name(&qualified_name),
            name,
            qualified_name,
            kind,
            base: None,
            interfaces: Vec::new(),
            declaring_type: None,
            constructors: Vec::new(),
            methods: Vec::new(),
            properties: Vec::new(),
            events: Vec::new(),
            nested: Vec::new(),
            invoke: None,
            rust_type: None,
        }
    }
}

/// A resolved member descriptor.
#[derive(Debug, Clone)]
pub enum Member {
    Property(Rc<PropertyEntry>),
    Event(Rc<EventEntry>),
    Methods(MethodGroup),
    NestedType(TypeHash),
}

/// All overloads of one method name, derived type first, declaration order within a type.
#[derive(Debug, Clone)]
pub struct MethodGroup {
    pub name: String,
    pub methods: Vec<Rc<MethodEntry>>,
}

impl MethodGroup {
    pub fn new(name: impl Into<String>, methods: Vec<Rc<MethodEntry>>) -> Self {
        Self {
            name: name.into(),
            methods,
        }
    }

    /// Overloads callable without a receiver.
    pub fn statics(&self) -> Vec<Rc<MethodEntry>> {
        self.methods.iter().filter(|m| m.is_static).cloned().collect()
    }

    /// Overloads requiring a receiver.
    pub fn instances(&self) -> Vec<Rc<MethodEntry>> {
        self.methods.iter().filter(|m| !m.is_static).cloned().collect()
    }

    pub fn has_static(&self) -> bool {
        self.methods.iter().any(|m| m.is_static)
    }
}
