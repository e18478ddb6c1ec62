//! Script-side value classification and anchored script references.
//!
//! A [`ValueTag`] is the interpreter's classification of a stack slot.
//! Script tables, functions and foreign userdata that cross into the host are
//! anchored in the interpreter registry through a [`RegistryRef`]; the host
//! holds them as [`ScriptFunction`], [`ScriptTable`] or [`ScriptUserData`].
//!
//! Dropping the last clone of an anchored reference never touches the
//! interpreter directly (it may be running or gone). The reference is pushed
//! onto a shared [`ReleaseQueue`] which the bridge drains at its next entry
//! point while it holds the stack.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// Pass as `nresults` to keep every value a call returns.
pub const MULTRET: i32 = -1;

/// Classification of a script stack slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueTag {
    /// The index does not refer to a valid slot.
    None,
    Nil,
    Boolean,
    Number,
    String,
    Table,
    Function,
    UserData,
}

impl ValueTag {
    /// Script-facing name of the tag.
    pub fn name(self) -> &'static str {
        match self {
            ValueTag::None => "no value",
            ValueTag::Nil => "nil",
            ValueTag::Boolean => "boolean",
            ValueTag::Number => "number",
            ValueTag::String => "string",
            ValueTag::Table => "table",
            ValueTag::Function => "function",
            ValueTag::UserData => "userdata",
        }
    }

    /// True for `nil` and for an absent slot.
    #[inline]
    pub fn is_nil_or_none(self) -> bool {
        matches!(self, ValueTag::None | ValueTag::Nil)
    }
}

impl fmt::Display for ValueTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Integer key of a value anchored in the interpreter registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistryRef(pub i32);

impl RegistryRef {
    /// Returned when a `nil` was anchored; pushing it pushes `nil`.
    pub const NIL: RegistryRef = RegistryRef(-1);

    #[inline]
    pub fn is_nil(self) -> bool {
        self.0 < 0
    }
}

// ============================================================================
// Release queue
// ============================================================================

/// Registry references whose host-side owners have been dropped.
#[derive(Debug, Default)]
pub struct ReleaseQueue {
    pending: RefCell<Vec<RegistryRef>>,
}

impl ReleaseQueue {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Take every pending reference, leaving the queue empty.
    pub fn take(&self) -> Vec<RegistryRef> {
        std::mem::take(&mut *self.pending.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    fn push(&self, reference: RegistryRef) {
        self.pending.borrow_mut().push(reference);
    }
}

struct Anchor {
    reference: RegistryRef,
    queue: Weak<ReleaseQueue>,
}

impl Drop for Anchor {
    fn drop(&mut self) {
        if self.reference.is_nil() {
            return;
        }
        if let Some(queue) = self.queue.upgrade() {
            queue.push(self.reference);
        }
    }
}

macro_rules! script_ref {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name(Rc<Anchor>);

        impl $name {
            /// Wrap an anchored registry reference. The reference is queued
            /// for release when the last clone is dropped.
            pub fn new(reference: RegistryRef, queue: &Rc<ReleaseQueue>) -> Self {
                Self(Rc::new(Anchor { reference, queue: Rc::downgrade(queue) }))
            }

            /// Registry key of the anchored value.
            #[inline]
            pub fn reference(&self) -> RegistryRef {
                self.0.reference
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.0.reference == other.0.reference
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0.reference.0)
            }
        }
    };
}

script_ref! {
    /// A script function held by the host.
    ScriptFunction
}

script_ref! {
    /// A script table held by the host.
    ScriptTable
}

script_ref! {
    /// Userdata not created by this bridge, held by the host.
    ScriptUserData
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_last_clone_queues_reference() {
        let queue = ReleaseQueue::new();
        let f = ScriptFunction::new(RegistryRef(7), &queue);
        let g = f.clone();
        drop(f);
        assert!(queue.is_empty());
        drop(g);
        assert_eq!(queue.take(), vec![RegistryRef(7)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn nil_reference_is_never_queued() {
        let queue = ReleaseQueue::new();
        drop(ScriptTable::new(RegistryRef::NIL, &queue));
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn drop_after_queue_is_gone_is_harmless() {
        let queue = ReleaseQueue::new();
        let t = ScriptTable::new(RegistryRef(3), &queue);
        drop(queue);
        drop(t);
    }

    #[test]
    fn tag_names() {
        assert_eq!(ValueTag::UserData.to_string(), "userdata");
        assert!(ValueTag::None.is_nil_or_none());
        assert!(!ValueTag::Boolean.is_nil_or_none());
    }
}
