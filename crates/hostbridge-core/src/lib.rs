//! Core types shared by the hostbridge crates.
//!
//! - [`TypeHash`]: deterministic identity of host types
//! - [`HostValue`] / [`HostRef`]: values and objects on the host side
//! - [`ScriptFunction`] and friends: script values anchored for host use
//! - [`TypeRef`] / [`Signature`]: parameter and return type descriptions
//! - [`HandleTable`]: host object ⇄ userdata handle mapping
//! - [`ScriptStack`]: the interpreter stack protocol
//! - [`CallContext`]: what a host callable receives
//! - error types

pub mod call;
pub mod convert;
pub mod error;
pub mod handle_table;
pub mod host;
pub mod stack;
pub mod type_hash;
pub mod types;
pub mod value;

pub use call::{CallContext, EventAccessor, NativeFn, NativeGetter, NativeSetter, ScriptHost};
pub use convert::{FromHost, IntoHost};
pub use error::{BridgeError, ConversionError, HostFault, RegistrationError};
pub use handle_table::{HandleTable, HostHandle, MAX_HANDLE};
pub use host::{HostArray, HostRef, HostValue, ObjectIdentity, WeakHostRef};
pub use stack::{NativeFunction, ScriptStack};
pub use type_hash::{TypeHash, builtin};
pub use types::{Param, ParamDirection, PrimitiveKind, Signature, TypeRef};
pub use value::{MULTRET, RegistryRef, ReleaseQueue, ScriptFunction, ScriptTable, ScriptUserData, ValueTag};
