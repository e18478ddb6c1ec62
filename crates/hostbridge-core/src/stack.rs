//! The interpreter stack protocol the bridge is written against.
//!
//! [`ScriptStack`] is the subset of a Lua-style C API the bridge needs:
//! indexed stack slots (positive from the frame base, negative from the
//! top), tables with metatables, full userdata carrying a single `u64`,
//! native functions, protected calls and a registry of anchored references.
//!
//! Native functions see their arguments at indices `1..=get_top()` and
//! return the number of results they left on top of the stack. Returning
//! `Err` raises an interpreter error that unwinds to the nearest
//! [`ScriptStack::pcall`].

use std::rc::Rc;

use crate::error::BridgeError;
use crate::value::{RegistryRef, ValueTag};

/// A native function callable from script.
pub type NativeFunction = Rc<dyn Fn(&mut dyn ScriptStack) -> Result<i32, BridgeError>>;

/// Stack-based interpreter API.
pub trait ScriptStack {
    // ------------------------------------------------------------------
    // Stack management
    // ------------------------------------------------------------------

    /// Index of the top slot (number of slots in the current frame).
    fn get_top(&self) -> i32;

    /// Grow (with nils) or shrink the current frame to `top` slots.
    fn set_top(&mut self, top: i32);

    /// Ensure `extra` more slots can be pushed.
    fn check_stack(&mut self, extra: usize) -> bool;

    /// Push a copy of the value at `index`.
    fn push_value(&mut self, index: i32);

    /// Remove the value at `index`, shifting the slots above it down.
    fn remove(&mut self, index: i32);

    /// Move the top value to `index`, shifting the slots above it up.
    fn insert(&mut self, index: i32);

    /// Convert a relative index to an absolute one.
    fn abs_index(&self, index: i32) -> i32 {
        if index < 0 { self.get_top() + index + 1 } else { index }
    }

    fn pop(&mut self, n: i32) {
        let top = self.get_top();
        self.set_top(top - n);
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    fn type_of(&self, index: i32) -> ValueTag;

    /// Truthiness (`nil` and `false` are false).
    fn to_boolean(&self, index: i32) -> bool;

    fn to_number(&self, index: i32) -> Option<f64>;

    fn to_str(&self, index: i32) -> Option<String>;

    /// Payload of a full userdata.
    fn to_userdata(&self, index: i32) -> Option<u64>;

    /// Identity of a table, function or userdata; 0 for other values.
    fn to_pointer(&self, index: i32) -> usize;

    /// Primitive equality, no metamethods.
    fn raw_equal(&self, a: i32, b: i32) -> bool;

    // ------------------------------------------------------------------
    // Push
    // ------------------------------------------------------------------

    fn push_nil(&mut self);
    fn push_boolean(&mut self, value: bool);
    fn push_number(&mut self, value: f64);
    fn push_string(&mut self, value: &str);
    fn push_function(&mut self, function: NativeFunction);

    /// Push a new full userdata carrying `payload`, without a metatable.
    fn push_userdata(&mut self, payload: u64);

    /// Push the globals table.
    fn push_globals(&mut self);

    // ------------------------------------------------------------------
    // Tables
    // ------------------------------------------------------------------

    fn new_table(&mut self);

    /// Pop a key and push `t[key]` for the value at `index`, honouring `__index`.
    fn get_table(&mut self, index: i32) -> Result<(), BridgeError>;

    /// Pop a value and a key and assign `t[key] = value`, honouring `__newindex`.
    fn set_table(&mut self, index: i32) -> Result<(), BridgeError>;

    /// [`get_table`](Self::get_table) without metamethods; `index` must be a table.
    fn raw_get(&mut self, index: i32);

    /// [`set_table`](Self::set_table) without metamethods; `index` must be a table.
    fn raw_set(&mut self, index: i32);

    /// Length of the array part of the table at `index`.
    fn raw_len(&self, index: i32) -> usize;

    /// Pop a key and push the next key/value pair; false at the end.
    fn next(&mut self, index: i32) -> bool;

    fn get_field(&mut self, index: i32, key: &str) -> Result<(), BridgeError> {
        let index = self.abs_index(index);
        self.push_string(key);
        self.get_table(index)
    }

    fn set_field(&mut self, index: i32, key: &str) -> Result<(), BridgeError> {
        let index = self.abs_index(index);
        self.push_string(key);
        self.insert(-2);
        self.set_table(index)
    }

    fn raw_get_field(&mut self, index: i32, key: &str) {
        let index = self.abs_index(index);
        self.push_string(key);
        self.raw_get(index);
    }

    fn raw_set_field(&mut self, index: i32, key: &str) {
        let index = self.abs_index(index);
        self.push_string(key);
        self.insert(-2);
        self.raw_set(index);
    }

    // ------------------------------------------------------------------
    // Metatables
    // ------------------------------------------------------------------

    /// Push the metatable of the value at `index`; false (nothing pushed) if none.
    fn get_metatable(&mut self, index: i32) -> bool;

    /// Pop a table (or nil) and make it the metatable of the value at `index`.
    fn set_metatable(&mut self, index: i32);

    /// Push the registry metatable named `name`, creating it if needed.
    /// Returns true when it was created by this call.
    fn new_metatable(&mut self, name: &str) -> bool;

    /// Push the registry metatable named `name`, or nil. Returns whether it exists.
    fn get_named_metatable(&mut self, name: &str) -> bool;

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    /// Call the function below `nargs` arguments in protected mode.
    ///
    /// On success the function and arguments are replaced by `nresults`
    /// results (all of them with [`MULTRET`](crate::MULTRET)). On failure
    /// they are removed and the error is returned.
    fn pcall(&mut self, nargs: i32, nresults: i32) -> Result<(), BridgeError>;

    // ------------------------------------------------------------------
    // Registry references
    // ------------------------------------------------------------------

    /// Pop the top value and anchor it in the registry.
    fn reference(&mut self) -> RegistryRef;

    /// Push an anchored value (nil for [`RegistryRef::NIL`]).
    fn push_reference(&mut self, reference: RegistryRef);

    /// Release an anchored value.
    fn unreference(&mut self, reference: RegistryRef);
}
