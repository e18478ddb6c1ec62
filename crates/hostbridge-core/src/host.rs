//! Host-side values.
//!
//! [`HostValue`] is what crosses the bridge in the host direction: scalars,
//! strings, shared host objects and anchored script references. Host objects
//! are reference-counted cells ([`HostRef`]); their identity is the cell
//! address, which is what the handle table deduplicates on.

use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::types::TypeRef;
use crate::{ScriptFunction, ScriptTable, ScriptUserData, TypeHash};

/// Address-based identity of a host object.
pub type ObjectIdentity = usize;

// ============================================================================
// HostRef
// ============================================================================

/// Shared reference to a host object of a registered type.
#[derive(Clone)]
pub struct HostRef {
    type_hash: TypeHash,
    cell: Rc<RefCell<dyn Any>>,
}

impl HostRef {
    /// Wrap a value as a host object of the given type.
    pub fn new<T: Any>(type_hash: TypeHash, value: T) -> Self {
        let cell: Rc<RefCell<dyn Any>> = Rc::new(RefCell::new(value));
        Self { type_hash, cell }
    }

    /// Wrap a value, naming its host type.
    pub fn named<T: Any>(type_name: &str, value: T) -> Self {
        Self::new(TypeHash::from_name(type_name), value)
    }

    /// Runtime type of the object.
    #[inline]
    pub fn type_hash(&self) -> TypeHash {
        self.type_hash
    }

    /// Identity used for handle deduplication.
    #[inline]
    pub fn identity(&self) -> ObjectIdentity {
        Rc::as_ptr(&self.cell) as *const () as usize
    }

    #[inline]
    pub fn ptr_eq(&self, other: &HostRef) -> bool {
        self.identity() == other.identity()
    }

    /// Whether the payload is a `T`. False while the object is mutably borrowed.
    pub fn is<T: Any>(&self) -> bool {
        self.cell.try_borrow().map(|v| v.is::<T>()).unwrap_or(false)
    }

    /// Borrow the payload as `T`.
    pub fn borrow<T: Any>(&self) -> Option<Ref<'_, T>> {
        let guard = self.cell.try_borrow().ok()?;
        Ref::filter_map(guard, |v| v.downcast_ref::<T>()).ok()
    }

    /// Mutably borrow the payload as `T`.
    pub fn borrow_mut<T: Any>(&self) -> Option<RefMut<'_, T>> {
        let guard = self.cell.try_borrow_mut().ok()?;
        RefMut::filter_map(guard, |v| v.downcast_mut::<T>()).ok()
    }

    pub fn downgrade(&self) -> WeakHostRef {
        WeakHostRef {
            type_hash: self.type_hash,
            cell: Rc::downgrade(&self.cell),
        }
    }

    /// Number of strong owners (bridge handle table included).
    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.cell)
    }
}

impl fmt::Debug for HostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostRef({:?} @ {:#x})", self.type_hash, self.identity())
    }
}

/// Non-owning counterpart of [`HostRef`].
#[derive(Clone)]
pub struct WeakHostRef {
    type_hash: TypeHash,
    cell: Weak<RefCell<dyn Any>>,
}

impl WeakHostRef {
    pub fn upgrade(&self) -> Option<HostRef> {
        self.cell.upgrade().map(|cell| HostRef {
            type_hash: self.type_hash,
            cell,
        })
    }
}

impl fmt::Debug for WeakHostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakHostRef({:?})", self.type_hash)
    }
}

// ============================================================================
// HostArray
// ============================================================================

/// Host array object; scripts index it from 0.
#[derive(Debug, Clone)]
pub struct HostArray {
    element: TypeRef,
    items: Vec<HostValue>,
}

impl HostArray {
    pub fn new(element: TypeRef, items: Vec<HostValue>) -> Self {
        Self { element, items }
    }

    pub fn element_type(&self) -> &TypeRef {
        &self.element
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&HostValue> {
        self.items.get(index)
    }

    /// Replace an element; false when out of range.
    pub fn set(&mut self, index: usize, value: HostValue) -> bool {
        match self.items.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn items(&self) -> &[HostValue] {
        &self.items
    }

    pub fn into_items(self) -> Vec<HostValue> {
        self.items
    }

    /// Wrap as a host object of the builtin array type.
    pub fn into_host_ref(self) -> HostRef {
        HostRef::new(crate::type_hash::builtin::array(), self)
    }
}

// ============================================================================
// HostValue
// ============================================================================

/// A value on the host side of the bridge.
#[derive(Clone, Default)]
pub enum HostValue {
    #[default]
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Object(HostRef),
    Function(ScriptFunction),
    Table(ScriptTable),
    UserData(ScriptUserData),
}

impl HostValue {
    /// Short type name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Null => "null",
            HostValue::Bool(_) => "bool",
            HostValue::I8(_) => "i8",
            HostValue::I16(_) => "i16",
            HostValue::I32(_) => "i32",
            HostValue::I64(_) => "i64",
            HostValue::U8(_) => "u8",
            HostValue::U16(_) => "u16",
            HostValue::U32(_) => "u32",
            HostValue::U64(_) => "u64",
            HostValue::F32(_) => "f32",
            HostValue::F64(_) => "f64",
            HostValue::String(_) => "string",
            HostValue::Object(_) => "object",
            HostValue::Function(_) => "function",
            HostValue::Table(_) => "table",
            HostValue::UserData(_) => "userdata",
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    /// Any numeric variant as `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        Some(match *self {
            HostValue::I8(v) => v as f64,
            HostValue::I16(v) => v as f64,
            HostValue::I32(v) => v as f64,
            HostValue::I64(v) => v as f64,
            HostValue::U8(v) => v as f64,
            HostValue::U16(v) => v as f64,
            HostValue::U32(v) => v as f64,
            HostValue::U64(v) => v as f64,
            HostValue::F32(v) => v as f64,
            HostValue::F64(v) => v,
            _ => return None,
        })
    }

    /// Any integer variant, or an integral float, widened to `i128`.
    pub fn as_integer(&self) -> Option<i128> {
        Some(match *self {
            HostValue::I8(v) => v.into(),
            HostValue::I16(v) => v.into(),
            HostValue::I32(v) => v.into(),
            HostValue::I64(v) => v.into(),
            HostValue::U8(v) => v.into(),
            HostValue::U16(v) => v.into(),
            HostValue::U32(v) => v.into(),
            HostValue::U64(v) => v.into(),
            HostValue::F32(_) | HostValue::F64(_) => {
                let f = self.as_f64()?;
                if !f.is_finite() || f.fract() != 0.0 {
                    return None;
                }
                f as i128
            }
            _ => return None,
        })
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HostRef> {
        match self {
            HostValue::Object(obj) => Some(obj),
            _ => None,
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        use HostValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (I8(a), I8(b)) => a == b,
            (I16(a), I16(b)) => a == b,
            (I32(a), I32(b)) => a == b,
            (I64(a), I64(b)) => a == b,
            (U8(a), U8(b)) => a == b,
            (U16(a), U16(b)) => a == b,
            (U32(a), U32(b)) => a == b,
            (U64(a), U64(b)) => a == b,
            (F32(a), F32(b)) => a == b,
            (F64(a), F64(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Object(a), Object(b)) => a.ptr_eq(b),
            (Function(a), Function(b)) => a == b,
            (Table(a), Table(b)) => a == b,
            (UserData(a), UserData(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Null => f.write_str("Null"),
            HostValue::Bool(v) => write!(f, "Bool({v})"),
            HostValue::I8(v) => write!(f, "I8({v})"),
            HostValue::I16(v) => write!(f, "I16({v})"),
            HostValue::I32(v) => write!(f, "I32({v})"),
            HostValue::I64(v) => write!(f, "I64({v})"),
            HostValue::U8(v) => write!(f, "U8({v})"),
            HostValue::U16(v) => write!(f, "U16({v})"),
            HostValue::U32(v) => write!(f, "U32({v})"),
            HostValue::U64(v) => write!(f, "U64({v})"),
            HostValue::F32(v) => write!(f, "F32({v})"),
            HostValue::F64(v) => write!(f, "F64({v})"),
            HostValue::String(v) => write!(f, "String({v:?})"),
            HostValue::Object(v) => write!(f, "Object({v:?})"),
            HostValue::Function(v) => write!(f, "{v:?}"),
            HostValue::Table(v) => write!(f, "{v:?}"),
            HostValue::UserData(v) => write!(f, "{v:?}"),
        }
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for HostValue {
                fn from(v: $ty) -> Self {
                    HostValue::$variant(v)
                }
            }
        )*
    };
}

impl_from_scalar!(
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => String,
    HostRef => Object,
    ScriptFunction => Function,
    ScriptTable => Table,
    ScriptUserData => UserData,
);

impl From<&str> for HostValue {
    fn from(v: &str) -> Self {
        HostValue::String(v.to_owned())
    }
}

impl From<()> for HostValue {
    fn from(_: ()) -> Self {
        HostValue::Null
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(HostValue::Null, Into::into)
    }
}
