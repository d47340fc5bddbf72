//! Reactive observers over component lifecycle and property changes.
//!
//! Observers watch a single component type and carry a match query.
//! They are never run by the scheduler; the world queues component
//! events as mutations happen and drains the queue at the next tick
//! boundary, so handlers never run inside the mutating call.

use std::collections::HashSet;

use weft_foundation::{EntityKey, Key, Value};

use crate::query::QuerySpec;
use crate::world::World;

/// A queued component lifecycle event awaiting observer dispatch.
#[derive(Clone, Debug, PartialEq)]
pub enum ComponentEvent {
    /// A component landed on an entity.
    Added {
        /// The entity that gained the component.
        entity: EntityKey,
        /// The component's type key.
        component: Key,
    },
    /// A component left an entity.
    Removed {
        /// The entity that lost the component.
        entity: EntityKey,
        /// The component's type key.
        component: Key,
    },
    /// A component property changed through an observable write.
    Changed {
        /// The entity whose component changed.
        entity: EntityKey,
        /// The component's type key.
        component: Key,
        /// The property that changed.
        property: Key,
        /// The new value.
        new: Value,
        /// The previous value.
        old: Value,
    },
}

impl ComponentEvent {
    /// Returns the event's entity and component type key.
    #[must_use]
    pub fn parts(&self) -> (EntityKey, Key) {
        match self {
            Self::Added { entity, component }
            | Self::Removed { entity, component }
            | Self::Changed {
                entity, component, ..
            } => (*entity, *component),
        }
    }
}

/// Reactive handler bound to a watched component type and a match query.
#[allow(unused_variables)]
pub trait Observer: Send {
    /// The observer's unique name; removal refers to it.
    fn name(&self) -> &str;

    /// The single component type this observer watches.
    fn watch(&self) -> Key;

    /// The match query evaluated against the event's entity for added
    /// and changed events. Called once and memoized; an unfiltered spec
    /// matches every entity.
    fn match_query(&self) -> QuerySpec {
        QuerySpec::new()
    }

    /// The watched component was added to a matching entity.
    fn on_component_added(&mut self, world: &mut World, entity: EntityKey, component: Key) {}

    /// The watched component was removed. Notified unconditionally: the
    /// entity has already lost the component, so requiring a match-query
    /// hit would make removal unobservable.
    fn on_component_removed(&mut self, world: &mut World, entity: EntityKey, component: Key) {}

    /// A property of the watched component changed on a matching entity.
    fn on_component_changed(
        &mut self,
        world: &mut World,
        entity: EntityKey,
        component: Key,
        property: Key,
        new: Value,
        old: Value,
    ) {
    }
}

/// A registered observer plus its memoized match state.
pub(crate) struct ObserverEntry {
    pub(crate) name: String,
    pub(crate) watch: Key,
    pub(crate) observer: Option<Box<dyn Observer>>,
    /// Lazily memoized match query.
    pub(crate) match_spec: Option<QuerySpec>,
    /// Entities whose add has already been delivered, so a same-key
    /// overwrite never notifies twice for the same (entity, component)
    /// pair. Cleared per entity by a removed event.
    pub(crate) matched: HashSet<EntityKey>,
}

impl ObserverEntry {
    pub(crate) fn new(observer: Box<dyn Observer>) -> Self {
        Self {
            name: observer.name().to_string(),
            watch: observer.watch(),
            observer: Some(observer),
            match_spec: None,
            matched: HashSet::new(),
        }
    }
}

impl std::fmt::Debug for ObserverEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverEntry")
            .field("name", &self.name)
            .field("watch", &self.watch)
            .field("matched", &self.matched.len())
            .finish_non_exhaustive()
    }
}
