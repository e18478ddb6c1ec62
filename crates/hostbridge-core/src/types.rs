//! Host parameter and return type descriptions.
//!
//! These are the shapes the extractor registry and the overload resolver
//! reason about. A [`Signature`] is produced by the declaration parser in the
//! registry crate or built by hand.

use std::fmt;

use crate::{HostValue, TypeHash};

/// Built-in scalar host types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl PrimitiveKind {
    /// Declaration-syntax name.
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::I8 => "i8",
            PrimitiveKind::I16 => "i16",
            PrimitiveKind::I32 => "i32",
            PrimitiveKind::I64 => "i64",
            PrimitiveKind::U8 => "u8",
            PrimitiveKind::U16 => "u16",
            PrimitiveKind::U32 => "u32",
            PrimitiveKind::U64 => "u64",
            PrimitiveKind::F32 => "f32",
            PrimitiveKind::F64 => "f64",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => PrimitiveKind::Bool,
            "i8" => PrimitiveKind::I8,
            "i16" => PrimitiveKind::I16,
            "i32" => PrimitiveKind::I32,
            "i64" => PrimitiveKind::I64,
            "u8" => PrimitiveKind::U8,
            "u16" => PrimitiveKind::U16,
            "u32" => PrimitiveKind::U32,
            "u64" => PrimitiveKind::U64,
            "f32" => PrimitiveKind::F32,
            "f64" => PrimitiveKind::F64,
            _ => return None,
        })
    }

    #[inline]
    pub fn is_numeric(self) -> bool {
        !matches!(self, PrimitiveKind::Bool)
    }

    #[inline]
    pub fn is_float(self) -> bool {
        matches!(self, PrimitiveKind::F32 | PrimitiveKind::F64)
    }

    /// Every kind, in declaration order.
    pub const ALL: [PrimitiveKind; 11] = [
        PrimitiveKind::Bool,
        PrimitiveKind::I8,
        PrimitiveKind::I16,
        PrimitiveKind::I32,
        PrimitiveKind::I64,
        PrimitiveKind::U8,
        PrimitiveKind::U16,
        PrimitiveKind::U32,
        PrimitiveKind::U64,
        PrimitiveKind::F32,
        PrimitiveKind::F64,
    ];
}

/// A host parameter, field or return type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Void,
    Primitive(PrimitiveKind),
    String,
    /// The universal object type: accepts any script value.
    Object,
    /// A raw script function reference.
    Function,
    /// A raw script table reference.
    Table,
    /// A raw script userdata reference.
    UserData,
    /// A registered class, interface or delegate type.
    Named(TypeHash),
    /// Nullable wrapper around a value type (`T?`).
    Nullable(Box<TypeRef>),
    /// Reference-passed parameter (`ref T` / `out T`).
    ByRef(Box<TypeRef>),
    /// Host array of the element type (`T[]`).
    Array(Box<TypeRef>),
    /// Unresolved generic parameter of a generic method.
    Generic(String),
}

impl TypeRef {
    /// Named type reference from a qualified type name.
    pub fn named(name: &str) -> Self {
        TypeRef::Named(TypeHash::from_name(name))
    }

    pub fn nullable(inner: TypeRef) -> Self {
        TypeRef::Nullable(Box::new(inner))
    }

    pub fn by_ref(inner: TypeRef) -> Self {
        TypeRef::ByRef(Box::new(inner))
    }

    pub fn array(element: TypeRef) -> Self {
        TypeRef::Array(Box::new(element))
    }

    /// Strip a reference wrapper if present.
    pub fn strip_ref(&self) -> &TypeRef {
        match self {
            TypeRef::ByRef(inner) => inner,
            other => other,
        }
    }

    #[inline]
    pub fn is_void(&self) -> bool {
        matches!(self, TypeRef::Void)
    }

    /// True for types that accept `nil` as the absent value.
    pub fn accepts_nil(&self) -> bool {
        matches!(
            self.strip_ref(),
            TypeRef::String
                | TypeRef::Object
                | TypeRef::Function
                | TypeRef::Table
                | TypeRef::UserData
                | TypeRef::Named(_)
                | TypeRef::Nullable(_)
                | TypeRef::Array(_)
                | TypeRef::Generic(_)
        )
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Void => f.write_str("void"),
            TypeRef::Primitive(kind) => f.write_str(kind.name()),
            TypeRef::String => f.write_str("string"),
            TypeRef::Object => f.write_str("object"),
            TypeRef::Function => f.write_str("function"),
            TypeRef::Table => f.write_str("table"),
            TypeRef::UserData => f.write_str("userdata"),
            TypeRef::Named(hash) => write!(f, "{hash}"),
            TypeRef::Nullable(inner) => write!(f, "{inner}?"),
            TypeRef::ByRef(inner) => write!(f, "{inner}&"),
            TypeRef::Array(inner) => write!(f, "{inner}[]"),
            TypeRef::Generic(name) => f.write_str(name),
        }
    }
}

/// How an argument is passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParamDirection {
    #[default]
    In,
    /// Read from script and written back as an extra return value.
    Ref,
    /// Not read from script; written back as an extra return value.
    Out,
}

/// A single host parameter.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: TypeRef,
    pub direction: ParamDirection,
    /// Value used when the script omits this argument.
    pub default: Option<HostValue>,
    /// Variable-length trailing parameter; `ty` is the array type.
    pub variadic: bool,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            direction: ParamDirection::In,
            default: None,
            variadic: false,
        }
    }

    pub fn with_default(mut self, value: HostValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Turn into a `ref` parameter.
    pub fn by_ref(mut self) -> Self {
        self.direction = ParamDirection::Ref;
        self.ty = TypeRef::by_ref(self.ty);
        self
    }

    /// Turn into an `out` parameter.
    pub fn out(mut self) -> Self {
        self.direction = ParamDirection::Out;
        self.ty = TypeRef::by_ref(self.ty);
        self
    }

    /// Turn into a variadic parameter of the given element type.
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        if !matches!(self.ty, TypeRef::Array(_)) {
            self.ty = TypeRef::array(self.ty);
        }
        self
    }

    /// Element type of a variadic parameter.
    pub fn element_type(&self) -> &TypeRef {
        match &self.ty {
            TypeRef::Array(element) => element,
            other => other,
        }
    }

    /// True when the parameter is written back to script.
    #[inline]
    pub fn is_written_back(&self) -> bool {
        self.direction != ParamDirection::In
    }
}

/// Parameter list and return type of a host callable.
#[derive(Debug, Clone)]
pub struct Signature {
    pub params: Vec<Param>,
    pub return_type: TypeRef,
    /// Names of generic parameters declared on the method.
    pub generics: Vec<String>,
}

impl Signature {
    pub fn new(params: Vec<Param>, return_type: TypeRef) -> Self {
        Self {
            params,
            return_type,
            generics: Vec::new(),
        }
    }

    /// Values the host pushes back after a call: return value plus write-backs.
    pub fn result_count(&self) -> usize {
        let ret = usize::from(!self.return_type.is_void());
        ret + self.params.iter().filter(|p| p.is_written_back()).count()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match p.direction {
                ParamDirection::In if p.variadic => f.write_str("params ")?,
                ParamDirection::In => {}
                ParamDirection::Ref => f.write_str("ref ")?,
                ParamDirection::Out => f.write_str("out ")?,
            }
            write!(f, "{} {}", p.ty.strip_ref(), p.name)?;
        }
        write!(f, ") -> {}", self.return_type)
    }
}
