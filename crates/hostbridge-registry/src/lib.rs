//! Host type-description registry.
//!
//! The dispatch layer never reflects on Rust types; everything it knows about
//! a host type (constructors, methods, fields, properties, events, nested
//! types, base type and interfaces) comes from a [`TypeRegistry`] populated
//! through [`ClassBuilder`] and declaration strings such as
//! `"i32 add(i32 a, i32 b)"`.

pub mod builder;
pub mod decl;
pub mod entries;
pub mod registry;

pub use builder::ClassBuilder;
pub use decl::{FieldDecl, MethodDecl, parse_constructor, parse_delegate, parse_field, parse_method, parse_type};
pub use entries::{ClassEntry, ClassKind, EventEntry, Member, MethodEntry, MethodGroup, PropertyEntry, PropertyKind};
pub use registry::{MemberFilter, TypeRegistry};
