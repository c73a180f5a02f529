//! Lifecycle events.
//!
//! The registry and every registered type carry an [`EventBus`]. After each
//! inbound merge the registry dispatches [`SyncEvent::Receive`] on itself and,
//! for lifecycle operations, the operation's event on itself and then on the
//! type.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use entangle_core::{EntityHandle, TransitionId, WireMessage};
use entangle_sync::SyncManager;
use parking_lot::Mutex;
use tracing::warn;

use crate::registry::Registry;

/// Events dispatched by the registry and by types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SyncEvent {
    /// Any inbound message was merged (registry only).
    Receive,
    Sync,
    Forward,
    Create,
    Transition,
    /// A transition in flight was superseded and rolled back.
    BrokenTransition,
    Delete,
    /// An entity left its identity map without an explicit delete, e.g.
    /// because its owner went away.
    Disappear,
}

impl SyncEvent {
    /// Events that mirror an operation name.
    pub const LIFECYCLE: [SyncEvent; 7] = [
        SyncEvent::Sync,
        SyncEvent::Forward,
        SyncEvent::Create,
        SyncEvent::Transition,
        SyncEvent::BrokenTransition,
        SyncEvent::Delete,
        SyncEvent::Disappear,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            SyncEvent::Receive => "receive",
            SyncEvent::Sync => "sync",
            SyncEvent::Forward => "forward",
            SyncEvent::Create => "create",
            SyncEvent::Transition => "transition",
            SyncEvent::BrokenTransition => "brokenTransition",
            SyncEvent::Delete => "delete",
            SyncEvent::Disappear => "disappear",
        }
    }

    /// The lifecycle event an inbound operation re-emits, if any.
    pub fn from_operation(operation: &str) -> Option<Self> {
        Self::LIFECYCLE
            .into_iter()
            .find(|event| event.as_str() == operation)
    }
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a handler sees.
pub struct EventContext<'a> {
    pub event: SyncEvent,
    pub entity: &'a EntityHandle,
    /// The inbound message that caused the event.
    pub message: &'a WireMessage,
    pub registry: &'a Registry,
    /// The manager the message arrived on, when there is one.
    pub manager: Option<&'a SyncManager>,
    /// For [`SyncEvent::BrokenTransition`], the id that was superseded.
    pub stale_transition: Option<&'a TransitionId>,
}

/// Event handler. Errors are logged and never stop dispatch.
pub type Handler = Arc<dyn Fn(&EventContext<'_>) -> anyhow::Result<()> + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct BusInner {
    next_id: u64,
    handlers: HashMap<SyncEvent, Vec<(SubscriptionId, Handler)>>,
}

/// Subscribe/unsubscribe/dispatch for [`SyncEvent`]s.
///
/// Cloning shares the bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler. Handlers run in subscription order.
    pub fn subscribe<F>(&self, event: SyncEvent, handler: F) -> SubscriptionId
    where
        F: Fn(&EventContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner
            .handlers
            .entry(event)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns whether it was subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock();
        let mut removed = false;
        for handlers in inner.handlers.values_mut() {
            let before = handlers.len();
            handlers.retain(|(hid, _)| *hid != id);
            removed |= handlers.len() != before;
        }
        removed
    }

    /// Run every handler for `cx.event`.
    ///
    /// Handlers subscribed or removed during dispatch take effect from the
    /// next dispatch.
    pub fn dispatch(&self, cx: &EventContext<'_>) {
        let handlers: Vec<Handler> = self
            .inner
            .lock()
            .handlers
            .get(&cx.event)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        for handler in handlers {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(cx))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(event = %cx.event, entity = %cx.entity.id(), error = ?e, "event handler failed");
                }
                Err(payload) => {
                    warn!(
                        event = %cx.event,
                        entity = %cx.entity.id(),
                        panic = panic_message(payload.as_ref()),
                        "event handler panicked"
                    );
                }
            }
        }
    }

    pub fn handler_count(&self, event: SyncEvent) -> usize {
        self.inner
            .lock()
            .handlers
            .get(&event)
            .map_or(0, Vec::len)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        let mut counts: Vec<(SyncEvent, usize)> =
            inner.handlers.iter().map(|(e, h)| (*e, h.len())).collect();
        counts.sort();
        f.debug_struct("EventBus").field("handlers", &counts).finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}
