use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use tracing::warn;

use crate::{EventEnvelope, EventTypeId};

/// Identity of a subscribed handler object, derived from the address of its `Arc` allocation.
///
/// Entries keep a weak reference to the handler, which keeps the allocation (and therefore the
/// address) reserved for as long as any entry refers to it.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) struct HandlerKey(usize);

impl HandlerKey {
    pub(crate) fn of<H>(handler: &Arc<H>) -> Self {
        Self(Arc::as_ptr(handler).cast::<()>().addr())
    }
}

type Invoke = Box<dyn Fn(&(dyn Any + Send + Sync)) + Send>;

/// One handler method bound to one event type.
pub(crate) struct HandlerEntry {
    key: HandlerKey,

    /// Only used to tell whether the handler object is still alive.
    liveness: Weak<dyn Any + Send + Sync>,

    invoke: Invoke,
}

impl HandlerEntry {
    /// Binds `method` on `handler` to events of type `E`.
    ///
    /// The entry does not keep the handler alive. Once the handler is dropped, the entry
    /// stops invoking it and is pruned from its table at the next dispatch.
    pub(crate) fn new<H, E, M>(handler: &Arc<H>, method: M) -> Self
    where
        H: Send + Sync + 'static,
        E: 'static,
        M: Fn(&H, &E) + Send + 'static,
    {
        let weak = Arc::downgrade(handler);
        let liveness: Weak<dyn Any + Send + Sync> = weak.clone();

        Self {
            key: HandlerKey::of(handler),
            liveness,
            invoke: Box::new(move |payload| {
                let Some(handler) = weak.upgrade() else {
                    return;
                };

                // An event is only ever looked up in the slot of its own type identity, so
                // this cannot fail unless the table was built from a different registry.
                let event = payload
                    .downcast_ref::<E>()
                    .expect("handler slot received an event of a type it was not registered for");

                method(&handler, event);
            }),
        }
    }

    fn is_alive(&self) -> bool {
        self.liveness.strong_count() > 0
    }
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("key", &self.key)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

/// Handler entries grouped by event type identity.
///
/// Slot `n` holds the handlers for the event type with identity `n`, in subscription order.
#[derive(Debug)]
pub(crate) struct HandlerTable {
    slots: Vec<Vec<HandlerEntry>>,
}

impl HandlerTable {
    pub(crate) fn new(event_type_count: usize) -> Self {
        Self {
            slots: (0..event_type_count).map(|_| Vec::new()).collect(),
        }
    }

    pub(crate) fn insert(&mut self, event_type: EventTypeId, entry: HandlerEntry) {
        self.slots
            .get_mut(event_type.index())
            .expect("event type identities are always below the registry size")
            .push(entry);
    }

    /// Removes every entry bound to the handler with the given key, in every slot.
    pub(crate) fn remove(&mut self, key: HandlerKey) -> usize {
        let mut removed = 0_usize;

        for slot in &mut self.slots {
            let before = slot.len();
            slot.retain(|entry| entry.key != key);
            removed = removed.wrapping_add(before.wrapping_sub(slot.len()));
        }

        removed
    }

    /// Invokes every handler subscribed to the event's type, in subscription order.
    ///
    /// Returns `false` if at least one subscribed handler had already been dropped.
    pub(crate) fn dispatch(&self, envelope: &EventEnvelope) -> bool {
        let slot = self
            .slots
            .get(envelope.event_type().index())
            .expect("event type identities are always below the registry size");

        let mut all_alive = true;

        for entry in slot {
            if entry.is_alive() {
                (entry.invoke)(envelope.payload());
            } else {
                all_alive = false;
            }
        }

        all_alive
    }

    /// Drops entries whose handler object no longer exists.
    pub(crate) fn prune_dropped(&mut self) -> usize {
        let mut pruned = 0_usize;

        for (index, slot) in self.slots.iter_mut().enumerate() {
            let before = slot.len();
            slot.retain(HandlerEntry::is_alive);
            let removed = before.wrapping_sub(slot.len());

            if removed > 0 {
                warn!(
                    event_type = index,
                    removed, "handler dropped while still subscribed, removing its entries"
                );
            }

            pruned = pruned.wrapping_add(removed);
        }

        pruned
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.iter().map(Vec::len).sum()
    }
}
