//! Call context handed to host callables.
//!
//! A host method, constructor or free function receives a [`CallContext`]
//! holding its resolved arguments, the receiver (for instance members) and a
//! way back into script through [`ScriptHost`], which is how host code
//! invokes delegate and interface adapters or plain script functions.

use std::any::Any;
use std::cell::{Ref, RefMut};
use std::rc::Rc;

use crate::convert::{FromHost, IntoHost};
use crate::error::{BridgeError, HostFault};
use crate::stack::ScriptStack;
use crate::{HostRef, HostValue, ScriptFunction, TypeHash};

/// A host callable: method, constructor or free function.
pub type NativeFn = Rc<dyn Fn(&mut CallContext<'_>) -> Result<HostValue, HostFault>>;

/// Field/property reader. The receiver is `None` for static members.
pub type NativeGetter = Rc<dyn Fn(Option<&HostRef>) -> Result<HostValue, HostFault>>;

/// Field/property writer. The receiver is `None` for static members.
pub type NativeSetter = Rc<dyn Fn(Option<&HostRef>, HostValue) -> Result<(), HostFault>>;

/// Event subscription accessor (add or remove a delegate).
pub type EventAccessor = Rc<dyn Fn(Option<&HostRef>, &HostRef) -> Result<(), HostFault>>;

/// Services the bridge offers to host code during a call.
pub trait ScriptHost {
    /// Invoke a script-backed proxy: a delegate adapter (`method` is `None`)
    /// or a method of an interface adapter. `ref`/`out` slots of `args` are
    /// overwritten with the values script returned for them.
    fn invoke_proxy(
        &self,
        stack: &mut dyn ScriptStack,
        target: &HostRef,
        method: Option<&str>,
        args: &mut [HostValue],
    ) -> Result<HostValue, BridgeError>;

    /// Adapt a script function to the named delegate type.
    fn adapt_function(
        &self,
        stack: &mut dyn ScriptStack,
        delegate_type: TypeHash,
        function: &ScriptFunction,
    ) -> Result<HostRef, BridgeError>;

    /// Call a script function, returning every result.
    fn call_function(
        &self,
        stack: &mut dyn ScriptStack,
        function: &ScriptFunction,
        args: &[HostValue],
    ) -> Result<Vec<HostValue>, BridgeError>;
}

/// Arguments and environment of one host call.
pub struct CallContext<'a> {
    stack: &'a mut dyn ScriptStack,
    host: &'a dyn ScriptHost,
    this: Option<HostRef>,
    args: &'a mut [HostValue],
}

impl<'a> CallContext<'a> {
    pub fn new(
        stack: &'a mut dyn ScriptStack,
        host: &'a dyn ScriptHost,
        this: Option<HostRef>,
        args: &'a mut [HostValue],
    ) -> Self {
        Self {
            stack,
            host,
            this,
            args,
        }
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Raw argument value.
    pub fn arg_value(&self, index: usize) -> Result<&HostValue, HostFault> {
        self.args.get(index).ok_or_else(|| {
            HostFault::new(
                "ArgumentError",
                format!("argument {index} out of range ({} given)", self.args.len()),
            )
        })
    }

    /// Typed argument.
    pub fn arg<T: FromHost>(&self, index: usize) -> Result<T, HostFault> {
        let value = self.arg_value(index)?;
        T::from_host(value).map_err(|err| HostFault::new("ArgumentError", format!("argument {index}: {err}")))
    }

    /// Write a `ref`/`out` argument.
    pub fn set_arg(&mut self, index: usize, value: impl IntoHost) -> Result<(), HostFault> {
        let count = self.args.len();
        let slot = self.args.get_mut(index).ok_or_else(|| {
            HostFault::new("ArgumentError", format!("argument {index} out of range ({count} given)"))
        })?;
        *slot = value.into_host();
        Ok(())
    }

    pub fn args(&self) -> &[HostValue] {
        self.args
    }

    /// The receiver of an instance call.
    pub fn this(&self) -> Result<&HostRef, HostFault> {
        self.this
            .as_ref()
            .ok_or_else(|| HostFault::new("InvalidReceiver", "instance member called without a receiver"))
    }

    /// Borrow the receiver's payload as `T`.
    pub fn this_ref<T: Any>(&self) -> Result<Ref<'_, T>, HostFault> {
        let this = self.this()?;
        this.borrow::<T>().ok_or_else(|| {
            HostFault::new(
                "InvalidReceiver",
                format!("receiver is not a {}", std::any::type_name::<T>()),
            )
        })
    }

    /// Mutably borrow the receiver's payload as `T`.
    pub fn this_mut<T: Any>(&self) -> Result<RefMut<'_, T>, HostFault> {
        let this = self.this()?;
        this.borrow_mut::<T>().ok_or_else(|| {
            HostFault::new(
                "InvalidReceiver",
                format!("receiver is not a {} or is already borrowed", std::any::type_name::<T>()),
            )
        })
    }

    /// Invoke a delegate (`method` = `None`) or interface method held by the host.
    pub fn invoke(&mut self, target: &HostRef, method: Option<&str>, args: &mut [HostValue]) -> Result<HostValue, HostFault> {
        self.host
            .invoke_proxy(&mut *self.stack, target, method, args)
            .map_err(HostFault::from)
    }

    /// Adapt a script function to a delegate type.
    pub fn adapt_function(&mut self, delegate_type: TypeHash, function: &ScriptFunction) -> Result<HostRef, HostFault> {
        self.host
            .adapt_function(&mut *self.stack, delegate_type, function)
            .map_err(HostFault::from)
    }

    /// Call a script function.
    pub fn call_function(&mut self, function: &ScriptFunction, args: &[HostValue]) -> Result<Vec<HostValue>, HostFault> {
        self.host
            .call_function(&mut *self.stack, function, args)
            .map_err(HostFault::from)
    }
}
