//! Type-directed conversion of stack values into host values.
//!
//! [`Bridge::check_and_get_extractor`] is the gate the overload resolver
//! calls per argument: it inspects the runtime tag at a stack position and
//! the declared host type, and returns an [`Extractor`] or `None`. It never
//! changes the stack depth. [`Extractor::extract`] then performs the actual
//! conversion, including numeric widening and narrowing.
//!
//! Coercions, in order:
//!
//! 1. `ref`/`out` parameters are matched on their pointee type.
//! 2. Nullable types accept nil as `Null`, then match their inner type.
//! 3. `object` accepts anything.
//! 4. Generic parameters pick an extractor from the runtime tag.
//! 5. Numbers convert to any numeric type.
//! 6. Booleans, strings, functions, tables and userdata need an exact tag;
//!    nil is accepted as `Null` for all but booleans.
//! 7. Functions adapt to delegate types.
//! 8. Tables adapt to interface types.
//! 9. Nil converts to `Null` for class and array types.
//! 10. Tables whose metatable `__index` is a host object act as that object.
//! 11. Host objects convert when their runtime type is assignable.

use std::rc::Rc;

use hostbridge_core::{
    BridgeError, ConversionError, HostArray, HostRef, HostValue, PrimitiveKind, ScriptFunction, ScriptStack, ScriptTable,
    ScriptUserData, TypeHash, TypeRef, ValueTag,
};
use hostbridge_registry::ClassKind;

use crate::bridge::Bridge;
use crate::proxy::{DelegateAdapter, InterfaceAdapter};

/// Converts one stack value to one host value.
#[derive(Debug, Clone)]
pub enum Extractor {
    /// Always `Null`.
    Null,
    /// Any value, read by its runtime tag.
    Any,
    Bool,
    /// A number converted to the given primitive.
    Number(PrimitiveKind),
    String,
    Function,
    Table,
    UserData,
    /// A host object by identity.
    Object,
    /// A script function wrapped as a delegate.
    Delegate(Rc<DelegateAdapter>),
    /// A script table wrapped as an interface implementation.
    Interface(Rc<InterfaceAdapter>),
}

/// Convert a script number to a primitive. Out-of-range values saturate and
/// fractions truncate toward zero.
pub(crate) fn number_value(n: f64, kind: PrimitiveKind) -> HostValue {
    match kind {
        PrimitiveKind::Bool => HostValue::Bool(n != 0.0),
        PrimitiveKind::I8 => HostValue::I8(n as i8),
        PrimitiveKind::I16 => HostValue::I16(n as i16),
        PrimitiveKind::I32 => HostValue::I32(n as i32),
        PrimitiveKind::I64 => HostValue::I64(n as i64),
        PrimitiveKind::U8 => HostValue::U8(n as u8),
        PrimitiveKind::U16 => HostValue::U16(n as u16),
        PrimitiveKind::U32 => HostValue::U32(n as u32),
        PrimitiveKind::U64 => HostValue::U64(n as u64),
        PrimitiveKind::F32 => HostValue::F32(n as f32),
        PrimitiveKind::F64 => HostValue::F64(n),
    }
}

impl Extractor {
    /// The extractor for a host type, independent of any stack value.
    ///
    /// Leaf types map to their converter; everything else falls back to
    /// object identity.
    pub fn for_type(ty: &TypeRef) -> Extractor {
        match ty.strip_ref() {
            TypeRef::Nullable(inner) => Self::for_type(inner),
            TypeRef::Void => Extractor::Null,
            TypeRef::Primitive(PrimitiveKind::Bool) => Extractor::Bool,
            TypeRef::Primitive(kind) => Extractor::Number(*kind),
            TypeRef::String => Extractor::String,
            TypeRef::Function => Extractor::Function,
            TypeRef::Table => Extractor::Table,
            TypeRef::UserData => Extractor::UserData,
            TypeRef::Object | TypeRef::Generic(_) => Extractor::Any,
            TypeRef::Named(_) | TypeRef::Array(_) | TypeRef::ByRef(_) => Extractor::Object,
        }
    }

    /// Whether nil is a valid input, converting to `Null`.
    fn accepts_nil(&self) -> bool {
        !matches!(self, Extractor::Bool | Extractor::Number(_))
    }

    /// Convert the value at `index`.
    pub fn extract(&self, bridge: &Bridge, stack: &mut dyn ScriptStack, index: i32) -> Result<HostValue, BridgeError> {
        let index = stack.abs_index(index);
        let tag = stack.type_of(index);
        if tag.is_nil_or_none() && self.accepts_nil() {
            return Ok(HostValue::Null);
        }
        let expect = |wanted: ValueTag, what: &str| -> Result<(), BridgeError> {
            if tag == wanted {
                Ok(())
            } else {
                Err(ConversionError::TypeMismatch {
                    expected: what.to_owned(),
                    actual: tag.name().to_owned(),
                }
                .into())
            }
        };

        match self {
            Extractor::Null => Ok(HostValue::Null),
            Extractor::Any => Ok(bridge.get_object(stack, index)),
            Extractor::Bool => {
                expect(ValueTag::Boolean, "bool")?;
                Ok(HostValue::Bool(stack.to_boolean(index)))
            }
            Extractor::Number(kind) => {
                expect(ValueTag::Number, kind.name())?;
                let n = stack.to_number(index).unwrap_or_default();
                Ok(number_value(n, *kind))
            }
            Extractor::String => {
                expect(ValueTag::String, "string")?;
                Ok(stack.to_str(index).map(HostValue::String).unwrap_or_default())
            }
            Extractor::Function => {
                expect(ValueTag::Function, "function")?;
                let reference = bridge.anchor(stack, index);
                Ok(HostValue::Function(ScriptFunction::new(reference, &bridge.releases)))
            }
            Extractor::Table => {
                expect(ValueTag::Table, "table")?;
                let reference = bridge.anchor(stack, index);
                Ok(HostValue::Table(ScriptTable::new(reference, &bridge.releases)))
            }
            Extractor::UserData => {
                expect(ValueTag::UserData, "userdata")?;
                let reference = bridge.anchor(stack, index);
                Ok(HostValue::UserData(ScriptUserData::new(reference, &bridge.releases)))
            }
            Extractor::Object => match bridge.host_object(stack, index)? {
                Some(object) => Ok(HostValue::Object(object)),
                None => Err(ConversionError::TypeMismatch {
                    expected: "host object".to_owned(),
                    actual: tag.name().to_owned(),
                }
                .into()),
            },
            Extractor::Delegate(adapter) => {
                expect(ValueTag::Function, "function")?;
                bridge.delegate_proxy(stack, index, adapter).map(HostValue::Object)
            }
            Extractor::Interface(adapter) => {
                expect(ValueTag::Table, "table")?;
                bridge.interface_proxy(stack, index, adapter).map(HostValue::Object)
            }
        }
    }
}

impl Bridge {
    /// The extractor converting the value at `index` to `ty`, if any.
    ///
    /// The stack depth is the same before and after the call.
    pub fn check_and_get_extractor(
        &self,
        stack: &mut dyn ScriptStack,
        index: i32,
        ty: &TypeRef,
    ) -> Option<Extractor> {
        let index = stack.abs_index(index);
        let depth = stack.get_top();
        let extractor = self.select_extractor(stack, index, ty);
        stack.set_top(depth);
        log::trace!(
            "extractor for {} at {index} ({}): {extractor:?}",
            self.describe(ty),
            stack.type_of(index)
        );
        extractor
    }

    fn select_extractor(&self, stack: &mut dyn ScriptStack, index: i32, ty: &TypeRef) -> Option<Extractor> {
        let tag = stack.type_of(index);
        let nil = tag.is_nil_or_none();
        let mut ty = ty.strip_ref();
        if let TypeRef::Nullable(inner) = ty {
            if nil {
                return Some(Extractor::Null);
            }
            ty = inner.strip_ref();
        }

        match ty {
            TypeRef::Object => Some(Extractor::Any),
            TypeRef::Generic(_) => Some(match tag {
                ValueTag::None | ValueTag::Nil => Extractor::Null,
                ValueTag::Boolean => Extractor::Bool,
                ValueTag::Number => Extractor::Number(PrimitiveKind::F64),
                ValueTag::String => Extractor::String,
                ValueTag::Table => Extractor::Table,
                ValueTag::Function => Extractor::Function,
                ValueTag::UserData => Extractor::Any,
            }),
            TypeRef::Primitive(PrimitiveKind::Bool) => (tag == ValueTag::Boolean).then_some(Extractor::Bool),
            TypeRef::Primitive(kind) => (tag == ValueTag::Number).then_some(Extractor::Number(*kind)),
            TypeRef::String => exact(tag, ValueTag::String, Extractor::String),
            TypeRef::Function => exact(tag, ValueTag::Function, Extractor::Function),
            TypeRef::Table => exact(tag, ValueTag::Table, Extractor::Table),
            TypeRef::UserData => exact(tag, ValueTag::UserData, Extractor::UserData),
            TypeRef::Named(hash) => self.named_extractor(stack, index, tag, *hash),
            TypeRef::Array(element) => self.array_extractor(stack, index, tag, element),
            TypeRef::Void | TypeRef::Nullable(_) | TypeRef::ByRef(_) => None,
        }
    }

    fn named_extractor(
        &self,
        stack: &mut dyn ScriptStack,
        index: i32,
        tag: ValueTag,
        hash: TypeHash,
    ) -> Option<Extractor> {
        match (self.registry.kind_of(hash), tag) {
            (Some(ClassKind::Delegate), ValueTag::Function) => return self.adapter_for(hash),
            (Some(ClassKind::Interface), ValueTag::Table) => {
                if let Some(extractor) = self.adapter_for(hash) {
                    return Some(extractor);
                }
            }
            _ => {}
        }
        if tag.is_nil_or_none() {
            return Some(Extractor::Null);
        }
        match tag {
            ValueTag::Table | ValueTag::UserData => match self.host_object(stack, index) {
                Ok(Some(object)) if self.registry.is_assignable(object.type_hash(), hash) => Some(Extractor::Object),
                _ => None,
            },
            _ => None,
        }
    }

    fn array_extractor(
        &self,
        stack: &mut dyn ScriptStack,
        index: i32,
        tag: ValueTag,
        element: &TypeRef,
    ) -> Option<Extractor> {
        if tag.is_nil_or_none() {
            return Some(Extractor::Null);
        }
        let Ok(Some(object)) = self.host_object(stack, index) else {
            return None;
        };
        let array = object.borrow::<HostArray>()?;
        let matches = matches!(element, TypeRef::Object) || array.element_type() == element;
        matches.then_some(Extractor::Object)
    }

    /// The host object at `index`: one of our userdata, or a table whose
    /// metatable `__index` is one.
    pub(crate) fn host_object(&self, stack: &mut dyn ScriptStack, index: i32) -> Result<Option<HostRef>, BridgeError> {
        let index = stack.abs_index(index);
        match stack.type_of(index) {
            ValueTag::UserData => self.resolve_userdata(stack, index),
            ValueTag::Table => {
                if !stack.get_metatable(index) {
                    return Ok(None);
                }
                stack.raw_get_field(-1, "__index");
                let object = self.resolve_userdata(stack, -1);
                stack.pop(2);
                object
            }
            _ => Ok(None),
        }
    }
}

/// Exact tag match, with nil accepted as `Null`.
fn exact(tag: ValueTag, wanted: ValueTag, extractor: Extractor) -> Option<Extractor> {
    if tag == wanted {
        Some(extractor)
    } else if tag.is_nil_or_none() {
        Some(Extractor::Null)
    } else {
        None
    }
}
