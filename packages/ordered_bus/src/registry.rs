use std::any::{TypeId, type_name};
use std::collections::hash_map::Entry;

use foldhash::{HashMap, HashMapExt};

/// Dense identity of one concrete event type, assigned by an [`EventRegistry`].
///
/// Identities are handed out in registration order starting from zero, so for a registry with
/// `n` types every identity satisfies `0 <= id < n`. This lets handler tables be plain vectors
/// indexed by the identity.
#[derive(Clone, Copy, Debug, derive_more::Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("event type #{_0}")]
pub struct EventTypeId(usize);

impl EventTypeId {
    /// The position of this event type in its registry.
    #[must_use]
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// The frozen set of event types that an [`EventBus`][crate::EventBus] can carry.
///
/// Every event type has to be registered before the bus is created. Processors size their
/// handler tables from [`len()`][Self::len], which is why the set cannot change after
/// [`EventRegistryBuilder::build()`].
///
/// # Example
///
/// ```
/// use ordered_bus::EventRegistry;
///
/// struct Tick;
/// struct Shutdown;
///
/// let registry = EventRegistry::builder()
///     .register::<Tick>()
///     .register::<Shutdown>()
///     .build();
///
/// assert_eq!(registry.len(), 2);
/// assert_eq!(registry.id_of::<Tick>().unwrap().index(), 0);
/// assert_eq!(registry.id_of::<Shutdown>().unwrap().index(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct EventRegistry {
    ids: HashMap<TypeId, EventTypeId>,

    /// Indexed by `EventTypeId`.
    names: Vec<&'static str>,
}

impl EventRegistry {
    /// Starts describing the set of event types.
    #[must_use]
    pub fn builder() -> EventRegistryBuilder {
        EventRegistryBuilder::new()
    }

    /// Returns the identity assigned to `E`, or `None` if `E` was never registered.
    #[must_use]
    #[inline]
    pub fn id_of<E: 'static>(&self) -> Option<EventTypeId> {
        self.ids.get(&TypeId::of::<E>()).copied()
    }

    /// Number of registered event types.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no event types were registered.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// The Rust type name of the event type with the given identity.
    #[must_use]
    pub fn type_name(&self, id: EventTypeId) -> Option<&'static str> {
        self.names.get(id.index()).copied()
    }

    /// Iterates over all registered event types in identity order.
    pub fn iter(&self) -> impl Iterator<Item = (EventTypeId, &'static str)> + '_ {
        self.names
            .iter()
            .enumerate()
            .map(|(index, name)| (EventTypeId(index), *name))
    }
}

/// Collects event types for an [`EventRegistry`].
///
/// Registering the same type more than once is harmless; the type keeps the identity it was
/// given the first time.
#[derive(Debug, Default)]
#[must_use]
pub struct EventRegistryBuilder {
    ids: HashMap<TypeId, EventTypeId>,
    names: Vec<&'static str>,
}

impl EventRegistryBuilder {
    fn new() -> Self {
        Self {
            ids: HashMap::new(),
            names: Vec::new(),
        }
    }

    /// Assigns the next unused identity to `E`.
    pub fn register<E: 'static>(mut self) -> Self {
        let next = EventTypeId(self.names.len());

        if let Entry::Vacant(entry) = self.ids.entry(TypeId::of::<E>()) {
            entry.insert(next);
            self.names.push(type_name::<E>());
        }

        self
    }

    /// Freezes the set of event types.
    #[must_use]
    pub fn build(self) -> EventRegistry {
        EventRegistry {
            ids: self.ids,
            names: self.names,
        }
    }
}
