use std::any::Any;
use std::fmt;

use crate::EventTypeId;

/// One submitted event, type-erased, tagged with the identity of its concrete type.
///
/// The tag is looked up once at submission. Dispatch only ever consults handler slot
/// `type_id`, and that slot only holds handlers for the concrete type the tag was derived from.
pub(crate) struct EventEnvelope {
    type_id: EventTypeId,
    payload: Box<dyn Any + Send + Sync>,
}

impl EventEnvelope {
    pub(crate) fn new<E>(type_id: EventTypeId, event: E) -> Self
    where
        E: Send + Sync + 'static,
    {
        Self {
            type_id,
            payload: Box::new(event),
        }
    }

    #[inline]
    pub(crate) fn event_type(&self) -> EventTypeId {
        self.type_id
    }

    #[inline]
    pub(crate) fn payload(&self) -> &(dyn Any + Send + Sync) {
        &*self.payload
    }
}

impl fmt::Debug for EventEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEnvelope")
            .field("type_id", &self.type_id)
            .finish_non_exhaustive()
    }
}
