//! Error types for the bridge.
//!
//! ## Error Hierarchy
//!
//! ```text
//! BridgeError (raised back to script as an interpreter error)
//! ├── NoOverloadMatched     - no candidate accepted the arguments
//! ├── UnknownMember         - member lookup exhausted every fallback
//! ├── HostInvocation        - host code failed (HostFault, unwrapped one level)
//! ├── StaleHandle           - userdata handle no longer resolves
//! ├── StackOverflow         - stack could not grow for a push
//! ├── Conversion            - a value could not be converted (ConversionError)
//! └── Registration          - type description errors (RegistrationError)
//! ```
//!
//! Native functions installed in the interpreter return
//! `Result<i32, BridgeError>`; an `Err` is the interpreter-level error that a
//! protected call traps.

use std::fmt;

use thiserror::Error;

// ============================================================================
// Conversion Errors
// ============================================================================

/// Errors converting between script values, host values and Rust values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    /// The value has the wrong type.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// An integer does not fit the target type.
    #[error("integer overflow: {value} doesn't fit in {target_type}")]
    IntegerOverflow {
        value: String,
        target_type: &'static str,
    },

    /// A null was given where a value is required.
    #[error("null value where {target_type} is required")]
    NullValue { target_type: String },
}

// ============================================================================
// Registration Errors
// ============================================================================

/// Errors describing host types to the registry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    /// A type with this name is already registered.
    #[error("type '{0}' is already registered")]
    DuplicateType(String),

    /// A declaration string could not be parsed.
    #[error("invalid declaration '{decl}': {reason}")]
    InvalidDeclaration { decl: String, reason: String },

    /// A referenced type is not registered.
    #[error("type '{0}' not found")]
    TypeNotFound(String),

    /// A type was used as the wrong kind (e.g. a class where a delegate is required).
    #[error("type '{type_name}' is not {expected}")]
    WrongKind { type_name: String, expected: String },
}

// ============================================================================
// Host Faults
// ============================================================================

/// A failure raised by host code.
///
/// Host code that calls back into host code wraps the inner failure with
/// [`HostFault::invocation`]; the bridge strips exactly one such wrapper
/// before reporting the fault to script.
#[derive(Debug, Clone, PartialEq)]
pub struct HostFault {
    type_name: String,
    message: String,
    inner: Option<Box<HostFault>>,
    wrapper: bool,
}

impl HostFault {
    /// A fault of the named host exception type.
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            inner: None,
            wrapper: false,
        }
    }

    /// A generic fault with only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new("HostFault", message)
    }

    /// Wrap a fault raised by a reflective/indirect invocation.
    pub fn invocation(inner: HostFault) -> Self {
        Self {
            type_name: "InvocationFault".to_owned(),
            message: format!("invoked member raised: {}", inner.message),
            inner: Some(Box::new(inner)),
            wrapper: true,
        }
    }

    /// Attach a chained cause.
    pub fn with_inner(mut self, inner: HostFault) -> Self {
        self.inner = Some(Box::new(inner));
        self
    }

    /// Strip one invocation wrapper, if this is one.
    pub fn unwrap_invocation(self) -> HostFault {
        match (self.wrapper, self.inner) {
            (true, Some(inner)) => *inner,
            (wrapper, inner) => HostFault {
                type_name: self.type_name,
                message: self.message,
                inner,
                wrapper,
            },
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn inner(&self) -> Option<&HostFault> {
        self.inner.as_deref()
    }

    pub fn is_invocation_wrapper(&self) -> bool {
        self.wrapper
    }
}

impl fmt::Display for HostFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}

impl std::error::Error for HostFault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.as_deref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<ConversionError> for HostFault {
    fn from(err: ConversionError) -> Self {
        HostFault::new("ConversionError", err.to_string())
    }
}

impl From<BridgeError> for HostFault {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::HostInvocation(fault) => fault,
            other => HostFault::new("ScriptError", other.to_string()),
        }
    }
}

// ============================================================================
// Bridge Errors
// ============================================================================

/// Errors raised to script by the bridge.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    /// No overload accepted the given arguments.
    #[error("no overload of '{member}' matches arguments ({args})")]
    NoOverloadMatched { member: String, args: String },

    /// The member does not exist on the type (instance or static).
    #[error("unknown member '{member}' on type '{type_name}'")]
    UnknownMember { type_name: String, member: String },

    /// Host code failed during a call.
    #[error("{0}")]
    HostInvocation(#[source] HostFault),

    /// A userdata handle no longer resolves to a host object.
    #[error("stale object handle {handle} (object already reclaimed)")]
    StaleHandle { handle: u64 },

    /// The stack could not grow enough for the values to push.
    #[error("stack overflow: cannot reserve {needed} slots")]
    StackOverflow { needed: usize },

    /// A static member was called with an instance receiver.
    #[error("static member '{member}' of '{type_name}' called with an instance receiver")]
    StaticCallViaInstance { type_name: String, member: String },

    /// The value is not callable.
    #[error("attempt to call a {0} value")]
    NotCallable(String),

    /// A named type is not registered.
    #[error("type '{0}' not found")]
    TypeNotFound(String),

    /// An error raised by script code or by the interpreter itself.
    #[error("{0}")]
    Script(String),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),
}

impl BridgeError {
    pub fn script(message: impl Into<String>) -> Self {
        BridgeError::Script(message.into())
    }

    /// The host fault carried by a [`BridgeError::HostInvocation`].
    pub fn host_fault(&self) -> Option<&HostFault> {
        match self {
            BridgeError::HostInvocation(fault) => Some(fault),
            _ => None,
        }
    }

    /// True when the error means the member or object was not found.
    pub fn is_member_not_found(&self) -> bool {
        matches!(
            self,
            BridgeError::UnknownMember { .. } | BridgeError::StaleHandle { .. }
        )
    }
}

impl From<HostFault> for BridgeError {
    fn from(fault: HostFault) -> Self {
        BridgeError::HostInvocation(fault.unwrap_invocation())
    }
}
