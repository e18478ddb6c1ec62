//! Value and call bridge between an embedded script interpreter and a host
//! object model.
//!
//! The crate is organised leaf to root:
//!
//! - [`hostbridge_core::HandleTable`]: host object ⇄ userdata handle map
//! - [`extract`]: type-directed conversion of stack values to host values
//! - [`overload`]: first-match overload resolution and argument binding
//! - [`proxy`]: script functions/tables adapted to host delegates/interfaces
//! - [`dispatch`]: per-type metatables routing script access to host members
//! - [`Bridge`]: the context tying them together, and the embedding API
//!
//! [`MemoryState`] is an in-memory interpreter implementing
//! [`ScriptStack`], used by the tests and usable for embedding without an
//! external interpreter.
//!
//! # Example
//!
//! ```ignore
//! let mut registry = TypeRegistry::new();
//! registry.class::<Calc>("Demo.Calc")
//!     .constructor("()", |_| Ok(Calc))?
//!     .method("i32 add(i32 a, i32 b)", |ctx| Ok(ctx.arg::<i32>(0)? + ctx.arg::<i32>(1)?))?
//!     .build()?;
//!
//! let bridge = Bridge::new(registry)?;
//! let mut state = MemoryState::new();
//! bridge.import_type(&mut state, "Demo.Calc")?;
//! state.set_global("Calc")?;
//! ```

pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod extract;
pub mod overload;
pub mod proxy;
pub mod state;

pub use bridge::Bridge;
pub use config::{BridgeConfig, StateConfig};
pub use dispatch::TypeProxy;
pub use extract::Extractor;
pub use overload::CandidateBinding;
pub use proxy::{AdapterSignature, DelegateAdapter, DelegateProxy, EventHandle, InterfaceAdapter, InterfaceProxy};
pub use state::MemoryState;

pub use hostbridge_core::{
    BridgeError, CallContext, ConversionError, FromHost, HandleTable, HostArray, HostFault, HostHandle, HostRef,
    HostValue, IntoHost, MULTRET, NativeFn, NativeFunction, Param, ParamDirection, PrimitiveKind, RegistrationError,
    RegistryRef, ScriptFunction, ScriptHost, ScriptStack, ScriptTable, ScriptUserData, Signature, TypeHash, TypeRef,
    ValueTag, builtin,
};
pub use hostbridge_registry::{
    ClassBuilder, ClassEntry, ClassKind, EventEntry, Member, MemberFilter, MethodEntry, MethodGroup, PropertyEntry,
    PropertyKind, TypeRegistry,
};
