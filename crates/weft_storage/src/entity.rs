//! Entity ownership and lifecycle storage.
//!
//! The `EntityStore` owns every entity in the world. Entities live in
//! generational slots (handles to removed entities are detected as stale)
//! and are additionally registered by string id; ids are unique and the
//! registry maps each id to exactly one live entity.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;
use uuid::Uuid;
use weft_foundation::{EntityKey, Error, Key, Result, Value};

use crate::component::Component;
use crate::relationship::Relationship;

/// Lifecycle hooks an entity may carry.
///
/// The world invokes these at the lifecycle points named by each method.
/// Hooks receive the entity with its hook slot temporarily vacated, so
/// they can freely mutate entity data.
#[allow(unused_variables)]
pub trait EntityHooks: Send {
    /// Called once when the entity is added to the world, after its
    /// initial components have been applied.
    fn initialize(&mut self, entity: &mut Entity, components: &[Component]) {}

    /// Called when the entity transitions to enabled.
    fn on_enable(&mut self, entity: &mut Entity) {}

    /// Called when the entity transitions to disabled.
    fn on_disable(&mut self, entity: &mut Entity) {}

    /// Called just before the entity is freed.
    fn on_destroy(&mut self, entity: &mut Entity) {}
}

/// An entity: a stable string id plus a bag of components and
/// relationships.
///
/// Entities are created externally and handed to the world, which owns
/// them for the rest of their lifetime. Structural mutation (adding and
/// removing components or relationships, toggling enabled) goes through
/// the world so the membership indices stay coherent; the public surface
/// here is read access plus silent field writes.
pub struct Entity {
    id: Arc<str>,
    enabled: bool,
    connected: bool,
    components: HashMap<Key, Component>,
    relationships: Vec<Relationship>,
    hooks: Option<Box<dyn EntityHooks>>,
}

impl Entity {
    /// Creates a new entity with the given id.
    ///
    /// An empty id means "assign a fresh UUID on add".
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            connected: false,
            components: HashMap::new(),
            relationships: Vec::new(),
            hooks: None,
        }
    }

    /// Adds a component during construction.
    #[must_use]
    pub fn with_component(mut self, component: Component) -> Self {
        self.components.insert(component.key(), component);
        self
    }

    /// Sets the initial enabled flag.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Attaches lifecycle hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Box<dyn EntityHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Returns the entity's id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the entity's enabled flag.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Returns true if the entity carries a component with the given key.
    #[must_use]
    pub fn has_component(&self, key: Key) -> bool {
        self.components.contains_key(&key)
    }

    /// Gets a component by type key.
    #[must_use]
    pub fn component(&self, key: Key) -> Option<&Component> {
        self.components.get(&key)
    }

    /// Gets a component mutably.
    ///
    /// Field writes through this reference are silent; use the world's
    /// `set_property` for observable writes.
    pub fn component_mut(&mut self, key: Key) -> Option<&mut Component> {
        self.components.get_mut(&key)
    }

    /// Iterates over the keys of the entity's components.
    pub fn component_keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.components.keys().copied()
    }

    /// Returns the number of components.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Sets a field on an existing component, returning the old value.
    ///
    /// A silent write: no change event fires and no index is touched.
    /// Returns `None` when the entity has no such component.
    pub fn set_field(&mut self, component: Key, field: Key, value: impl Into<Value>) -> Option<Value> {
        let comp = self.components.get_mut(&component)?;
        Some(comp.set(field, value).unwrap_or(Value::Nil))
    }

    /// Returns the entity's relationships.
    #[must_use]
    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// Returns true if the entity's events are connected to the world.
    ///
    /// Only mutations on a connected entity produce notifications; the
    /// world connects on add and disconnects on disable and removal.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Sets the event connection flag. Used by the world; setting it when
    /// already in that state is a guarded no-op.
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Flips the enabled flag. Used by the world, which also moves the
    /// entity between the enabled and disabled indices.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Inserts a component, returning the displaced one for the same key.
    ///
    /// Does not touch any index; the world keeps the membership indices
    /// coherent around this call.
    pub fn insert_component(&mut self, component: Component) -> Option<Component> {
        self.components.insert(component.key(), component)
    }

    /// Removes a component by type key.
    ///
    /// Does not touch any index; the world keeps the membership indices
    /// coherent around this call.
    pub fn remove_component(&mut self, key: Key) -> Option<Component> {
        self.components.remove(&key)
    }

    /// Appends a relationship. Index maintenance is the world's concern.
    pub fn push_relationship(&mut self, relationship: Relationship) {
        self.relationships.push(relationship);
    }

    /// Removes the relationship at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn remove_relationship(&mut self, index: usize) -> Relationship {
        self.relationships.remove(index)
    }

    /// Temporarily vacates the hook slot so hooks can receive the entity
    /// mutably. Pair with [`Entity::put_hooks`].
    pub fn take_hooks(&mut self) -> Option<Box<dyn EntityHooks>> {
        self.hooks.take()
    }

    /// Restores hooks vacated by [`Entity::take_hooks`].
    pub fn put_hooks(&mut self, hooks: Option<Box<dyn EntityHooks>>) {
        self.hooks = hooks;
    }

    /// Assigns a fresh UUID when the id is empty.
    pub fn ensure_id(&mut self) {
        if self.id.is_empty() {
            self.id = Uuid::new_v4().to_string().into();
        }
    }

    pub(crate) fn id_arc(&self) -> Arc<str> {
        Arc::clone(&self.id)
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("enabled", &self.enabled)
            .field("components", &self.components.len())
            .field("relationships", &self.relationships.len())
            .finish_non_exhaustive()
    }
}

/// A storage slot holding at most one entity.
#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entity: Option<Entity>,
}

/// Owns all entities: generational slots plus a string-id registry and an
/// insertion-ordered list of live entities.
#[derive(Debug, Default)]
pub struct EntityStore {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    ids: HashMap<Arc<str>, EntityKey>,
    order: Vec<EntityKey>,
}

impl EntityStore {
    /// Creates a new empty entity store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entity, assigning a UUID when its id is empty.
    ///
    /// The caller is responsible for resolving id collisions first (the
    /// registry mapping is overwritten unconditionally).
    ///
    /// # Panics
    ///
    /// Panics if the number of slots exceeds `u32::MAX`.
    pub fn insert(&mut self, mut entity: Entity) -> EntityKey {
        entity.ensure_id();
        let id = entity.id_arc();

        let key = if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation += 1;
            slot.entity = Some(entity);
            EntityKey::new(index, slot.generation)
        } else {
            let index = u32::try_from(self.slots.len()).expect("too many entity slots");
            self.slots.push(Slot {
                generation: 1,
                entity: Some(entity),
            });
            EntityKey::new(index, 1)
        };

        self.ids.insert(id, key);
        self.order.push(key);
        key
    }

    /// Removes an entity, returning it.
    ///
    /// The id registry entry is dropped only if it still maps to this
    /// entity (a later registrant with the same id keeps its mapping).
    /// Removing an absent or stale key returns `None`.
    pub fn remove(&mut self, key: EntityKey) -> Option<Entity> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let entity = slot.entity.take()?;
        self.free_list.push(key.index);
        self.order.retain(|&k| k != key);

        if self.ids.get(entity.id()) == Some(&key) {
            self.ids.remove(entity.id());
        }
        Some(entity)
    }

    /// Gets an entity by key.
    #[must_use]
    pub fn get(&self, key: EntityKey) -> Option<&Entity> {
        let slot = self.slots.get(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.entity.as_ref()
    }

    /// Gets an entity mutably by key.
    pub fn get_mut(&mut self, key: EntityKey) -> Option<&mut Entity> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.entity.as_mut()
    }

    /// Returns true if the key refers to a live entity.
    #[must_use]
    pub fn contains(&self, key: EntityKey) -> bool {
        self.get(key).is_some()
    }

    /// Validates that a key refers to a live entity.
    ///
    /// # Errors
    ///
    /// Returns [`weft_foundation::ErrorKind::StaleEntity`] on a generation
    /// mismatch and [`weft_foundation::ErrorKind::EntityNotFound`] for a
    /// vacant or out-of-range slot.
    pub fn validate(&self, key: EntityKey) -> Result<()> {
        match self.slots.get(key.index as usize) {
            None => Err(Error::entity_not_found(key)),
            Some(slot) if slot.generation != key.generation => Err(Error::stale_entity(key)),
            Some(slot) if slot.entity.is_none() => Err(Error::entity_not_found(key)),
            Some(_) => Ok(()),
        }
    }

    /// Looks up an entity key by string id.
    #[must_use]
    pub fn by_id(&self, id: &str) -> Option<EntityKey> {
        self.ids.get(id).copied()
    }

    /// Returns the live entities in insertion order.
    #[must_use]
    pub fn keys(&self) -> &[EntityKey] {
        &self.order
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if there are no live entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterates live entities with their keys, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityKey, &Entity)> {
        self.order.iter().filter_map(move |&key| {
            let entity = self.get(key)?;
            Some((key, entity))
        })
    }

    /// Runs a callback over the selected entities on the rayon worker
    /// pool, blocking until every worker joins.
    ///
    /// Workers receive `&mut Entity` only, so the world's indices and the
    /// entity set cannot be touched from the parallel window. Each
    /// selected entity is visited exactly once; rayon partitions the slot
    /// array into contiguous slices across its threads.
    pub fn par_each<F>(&mut self, selected: &HashSet<EntityKey>, f: F)
    where
        F: Fn(&mut Entity) + Send + Sync,
    {
        self.slots
            .par_iter_mut()
            .enumerate()
            .for_each(|(index, slot)| {
                let Some(entity) = slot.entity.as_mut() else {
                    return;
                };
                #[allow(clippy::cast_possible_truncation)]
                let key = EntityKey::new(index as u32, slot.generation);
                if selected.contains(&key) {
                    f(entity);
                }
            });
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn inserted_entities_always_resolve(count in 1usize..100) {
            let mut store = EntityStore::new();
            let keys: Vec<_> = (0..count)
                .map(|i| store.insert(Entity::new(&format!("e{i}"))))
                .collect();

            for key in &keys {
                prop_assert!(store.contains(*key));
            }
            prop_assert_eq!(store.len(), count);
        }

        #[test]
        fn removed_entities_never_resolve(count in 1usize..100) {
            let mut store = EntityStore::new();
            let keys: Vec<_> = (0..count)
                .map(|i| store.insert(Entity::new(&format!("e{i}"))))
                .collect();

            for key in &keys {
                store.remove(*key).unwrap();
            }

            for key in &keys {
                prop_assert!(!store.contains(*key));
            }
            prop_assert_eq!(store.len(), 0);
        }

        #[test]
        fn registry_maps_each_live_id_to_its_entity(count in 1usize..50) {
            let mut store = EntityStore::new();
            let keys: Vec<_> = (0..count)
                .map(|i| store.insert(Entity::new(&format!("e{i}"))))
                .collect();

            // Remove every third entity
            for key in keys.iter().step_by(3) {
                store.remove(*key).unwrap();
            }

            for &key in store.keys() {
                let id = store.get(key).unwrap().id().to_owned();
                prop_assert_eq!(store.by_id(&id), Some(key));
            }
        }
    }
}
