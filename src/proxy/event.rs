//! Event subscription objects.
//!
//! Indexing an event member yields an [`EventHandle`]; script subscribes
//! with `obj.Changed:add(fn)` and unsubscribes with `obj.Changed:remove(fn)`.
//! `add` adapts the function to the event's delegate type and returns the
//! delegate. Adapting the same function again yields the same delegate while
//! the host still holds it, so `remove(fn)` finds the subscription.

use std::rc::Rc;

use hostbridge_core::{CallContext, HostFault, HostRef, RegistrationError, ScriptFunction, TypeHash, builtin};
use hostbridge_registry::{EventEntry, TypeRegistry};

/// An event bound to its owner (`None` for static events).
#[derive(Debug, Clone)]
pub struct EventHandle {
    target: Option<HostRef>,
    event: Rc<EventEntry>,
}

impl EventHandle {
    pub fn new(target: Option<HostRef>, event: Rc<EventEntry>) -> Self {
        Self { target, event }
    }

    pub fn name(&self) -> &str {
        &self.event.name
    }

    pub fn delegate_type(&self) -> TypeHash {
        self.event.delegate_type
    }

    pub fn target(&self) -> Option<&HostRef> {
        self.target.as_ref()
    }
}

fn subscription(ctx: &CallContext<'_>) -> Result<(Option<HostRef>, Rc<EventEntry>), HostFault> {
    let handle = ctx.this_ref::<EventHandle>()?;
    Ok((handle.target.clone(), handle.event.clone()))
}

pub(crate) fn register_event_handle(registry: &mut TypeRegistry) -> Result<(), RegistrationError> {
    registry
        .class::<EventHandle>(builtin::EVENT_HANDLE)
        .method("object add(function handler)", |ctx| {
            let handler: ScriptFunction = ctx.arg(0)?;
            let (target, event) = subscription(ctx)?;
            let delegate = ctx.adapt_function(event.delegate_type, &handler)?;
            (event.add)(target.as_ref(), &delegate)?;
            log::debug!("subscribed to {}", event.name);
            Ok(delegate)
        })?
        .method("void remove(function handler)", |ctx| {
            let handler: ScriptFunction = ctx.arg(0)?;
            let (target, event) = subscription(ctx)?;
            let delegate = ctx.adapt_function(event.delegate_type, &handler)?;
            (event.remove)(target.as_ref(), &delegate)
        })?
        .method("void remove(object handler)", |ctx| {
            let handler: HostRef = ctx.arg(0)?;
            let (target, event) = subscription(ctx)?;
            (event.remove)(target.as_ref(), &handler)
        })?
        .build()?;
    Ok(())
}
