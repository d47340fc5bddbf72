//! The world: the unified runtime over all storage and dispatch systems.
//!
//! The world exclusively owns entities, systems, and observers. Every
//! structural mutation funnels through it so the membership indices, the
//! relationship indices, and the query cache stay coherent, and so
//! change notifications are queued for deferred observer dispatch.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use weft_foundation::{EntityKey, Key, KeyInterner, Result, Value};
use weft_storage::{
    Component, ComponentIndex, Entity, EntityStore, RelTarget, Relationship, RelationshipIndex,
};

use crate::host::{Host, NullHost};
use crate::observer::{ComponentEvent, Observer, ObserverEntry};
use crate::query::{plan, CacheStats, QueryBuilder, QueryCache, QuerySpec};
use crate::schedule::{DispatchSlot, Scheduler, SystemEntry};
use crate::system::System;

/// Recognized configuration knobs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorldConfig {
    /// Host path entity nodes are parented under.
    pub entity_nodes_root: String,
    /// Host path system nodes are parented under.
    pub system_nodes_root: String,
    /// Size bound of the query-builder free list.
    pub pool_size_limit: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            entity_nodes_root: "Entities".to_string(),
            system_nodes_root: "Systems".to_string(),
            pool_size_limit: 10,
        }
    }
}

/// Events emitted by the world, drained by the host via
/// [`World::take_events`].
#[derive(Clone, Debug, PartialEq)]
pub enum WorldEvent {
    /// An entity was registered.
    EntityAdded(EntityKey),
    /// An entity was removed and freed.
    EntityRemoved(EntityKey),
    /// An entity was enabled.
    EntityEnabled(EntityKey),
    /// An entity was disabled.
    EntityDisabled(EntityKey),
    /// A system was registered.
    SystemAdded(String),
    /// A system was removed.
    SystemRemoved(String),
    /// A component landed on a connected entity.
    ComponentAdded {
        /// The entity that gained the component.
        entity: EntityKey,
        /// The component's type key.
        component: Key,
    },
    /// A component left a connected entity.
    ComponentRemoved {
        /// The entity that lost the component.
        entity: EntityKey,
        /// The component's type key.
        component: Key,
    },
    /// A component property changed on a connected entity.
    ComponentChanged {
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
    /// A relationship was added to a connected entity.
    RelationshipAdded {
        /// The source entity.
        source: EntityKey,
        /// The relation's type key.
        relation: Key,
    },
    /// A relationship was removed from a connected entity.
    RelationshipRemoved {
        /// The source entity.
        source: EntityKey,
        /// The relation's type key.
        relation: Key,
    },
    /// The query cache was flushed.
    CacheInvalidated,
}

type EntityProcessor = Box<dyn FnMut(&mut Entity) + Send>;

/// The ECS world.
pub struct World {
    interner: KeyInterner,
    entities: EntityStore,
    index: ComponentIndex,
    relationships: RelationshipIndex,
    cache: QueryCache,
    scheduler: Scheduler,
    observers: Vec<ObserverEntry>,
    deferred: VecDeque<ComponentEvent>,
    events: Vec<WorldEvent>,
    preprocessors: Vec<EntityProcessor>,
    postprocessors: Vec<EntityProcessor>,
    spec_pool: Vec<QuerySpec>,
    config: WorldConfig,
    host: Box<dyn Host>,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Creates an empty world with default configuration and a null host.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    /// Creates an empty world with the given configuration.
    #[must_use]
    pub fn with_config(config: WorldConfig) -> Self {
        Self {
            interner: KeyInterner::new(),
            entities: EntityStore::new(),
            index: ComponentIndex::new(),
            relationships: RelationshipIndex::new(),
            cache: QueryCache::new(),
            scheduler: Scheduler::new(),
            observers: Vec::new(),
            deferred: VecDeque::new(),
            events: Vec::new(),
            preprocessors: Vec::new(),
            postprocessors: Vec::new(),
            spec_pool: Vec::new(),
            config,
            host: Box::new(NullHost),
        }
    }

    /// Replaces the host integration.
    #[must_use]
    pub fn with_host(mut self, host: Box<dyn Host>) -> Self {
        self.host = host;
        self
    }

    /// Interns a key string.
    pub fn key(&mut self, name: &str) -> Key {
        self.interner.intern(name)
    }

    /// Returns the key interner.
    #[must_use]
    pub fn interner(&self) -> &KeyInterner {
        &self.interner
    }

    /// Returns the key interner mutably.
    pub fn interner_mut(&mut self) -> &mut KeyInterner {
        &mut self.interner
    }

    /// Returns the world's configuration.
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    // --- Entity lifecycle ---

    /// Registers an entity with no extra components, parenting its node.
    pub fn add_entity(&mut self, entity: Entity) -> EntityKey {
        self.add_entity_with(entity, Vec::new(), true)
    }

    /// Registers an entity.
    ///
    /// Assigns a fresh UUID when the id is empty. When the id already
    /// belongs to a different live entity, that entity is removed first
    /// (its `on_destroy` runs); ids are a singleton namespace. The
    /// entity's events are connected, its components land in the
    /// membership indices per its enabled flag, `initial_components` are
    /// applied observably, hooks run `initialize`, `entity_added` is
    /// emitted, and registered preprocessors run.
    pub fn add_entity_with(
        &mut self,
        mut entity: Entity,
        initial_components: Vec<Component>,
        add_to_tree: bool,
    ) -> EntityKey {
        entity.ensure_id();
        if let Some(prior) = self.entities.by_id(entity.id()) {
            tracing::debug!(id = entity.id(), "replacing prior entity with duplicate id");
            self.remove_entity(prior);
        }

        entity.set_connected(true);
        let enabled = entity.enabled();
        let id = entity.id().to_string();
        let carried: Vec<Key> = entity.component_keys().collect();
        let key = self.entities.insert(entity);

        for component in carried {
            self.index.add(key, component, enabled);
        }
        self.index_carried_relationships(key);
        self.invalidate_cache();

        if add_to_tree && !self.host.is_attached(&id) {
            self.host.attach(&id, &self.config.entity_nodes_root);
        }

        for component in &initial_components {
            self.apply_component(key, component.clone());
        }

        if let Some(entity) = self.entities.get_mut(key) {
            if let Some(mut hooks) = entity.take_hooks() {
                hooks.initialize(entity, &initial_components);
                entity.put_hooks(Some(hooks));
            }
        }

        self.events.push(WorldEvent::EntityAdded(key));

        let mut preprocessors = std::mem::take(&mut self.preprocessors);
        if let Some(entity) = self.entities.get_mut(key) {
            for preprocessor in &mut preprocessors {
                preprocessor(entity);
            }
        }
        self.preprocessors = preprocessors;

        tracing::debug!(id = %id, "entity added");
        key
    }

    /// Registers a batch of entities.
    pub fn add_entities(&mut self, entities: Vec<Entity>) -> Vec<EntityKey> {
        entities
            .into_iter()
            .map(|entity| self.add_entity(entity))
            .collect()
    }

    /// Removes an entity and frees it.
    ///
    /// Runs registered postprocessors, emits `entity_removed`, erases
    /// the entity from every index (evicting empty sets), disconnects
    /// its events, deregisters its id only if still mapped to this
    /// instance, runs `on_destroy`, and invalidates the cache. Removing
    /// an absent or stale key is a no-op.
    pub fn remove_entity(&mut self, key: EntityKey) -> bool {
        if !self.entities.contains(key) {
            return false;
        }

        let mut postprocessors = std::mem::take(&mut self.postprocessors);
        if let Some(entity) = self.entities.get_mut(key) {
            for postprocessor in &mut postprocessors {
                postprocessor(entity);
            }
        }
        self.postprocessors = postprocessors;

        self.events.push(WorldEvent::EntityRemoved(key));

        let carried: Vec<Key> = self
            .entities
            .get(key)
            .map(|e| e.component_keys().collect())
            .unwrap_or_default();
        for component in carried {
            self.index.remove(key, component);
        }
        self.relationships.remove_entity(key);

        if let Some(entity) = self.entities.get_mut(key) {
            if entity.is_connected() {
                entity.set_connected(false);
            }
        }

        let Some(mut entity) = self.entities.remove(key) else {
            return false;
        };
        if let Some(mut hooks) = entity.take_hooks() {
            hooks.on_destroy(&mut entity);
        }
        self.host.detach(entity.id());
        self.invalidate_cache();
        tracing::debug!(id = entity.id(), "entity removed");
        true
    }

    /// Removes a batch of entities.
    pub fn remove_entities(&mut self, keys: &[EntityKey]) {
        for &key in keys {
            self.remove_entity(key);
        }
    }

    /// Disables an entity without removing it from the union index.
    ///
    /// Moves the entity from the enabled to the disabled index for every
    /// component it carries, disconnects its events, stops host tick
    /// callbacks, runs `on_disable`, invalidates the cache, and emits
    /// `entity_disabled`.
    pub fn disable_entity(&mut self, key: EntityKey) -> bool {
        let Some(entity) = self.entities.get_mut(key) else {
            return false;
        };
        if !entity.enabled() {
            return true;
        }

        entity.set_enabled(false);
        entity.set_connected(false);
        let id = entity.id().to_string();
        let carried: Vec<Key> = entity.component_keys().collect();

        self.index.move_to_disabled(key, carried.into_iter());
        self.host.set_ticking(&id, false);
        self.run_hook(key, |hooks, entity| hooks.on_disable(entity));
        self.invalidate_cache();
        self.events.push(WorldEvent::EntityDisabled(key));
        true
    }

    /// Disables a batch of entities.
    pub fn disable_entities(&mut self, keys: &[EntityKey]) {
        for &key in keys {
            self.disable_entity(key);
        }
    }

    /// Enables an entity.
    pub fn enable_entity(&mut self, key: EntityKey) -> bool {
        self.enable_entity_with(key, Vec::new())
    }

    /// Enables an entity, adding components at the same call.
    pub fn enable_entity_with(&mut self, key: EntityKey, components: Vec<Component>) -> bool {
        let Some(entity) = self.entities.get_mut(key) else {
            return false;
        };
        if entity.enabled() {
            for component in components {
                self.apply_component(key, component);
            }
            return true;
        }

        entity.set_enabled(true);
        entity.set_connected(true);
        let id = entity.id().to_string();

        for component in components {
            self.apply_component(key, component);
        }

        let carried: Vec<Key> = self
            .entities
            .get(key)
            .map(|e| e.component_keys().collect())
            .unwrap_or_default();
        self.index.move_to_enabled(key, carried.into_iter());
        self.host.set_ticking(&id, true);
        self.run_hook(key, |hooks, entity| hooks.on_enable(entity));
        self.invalidate_cache();
        self.events.push(WorldEvent::EntityEnabled(key));
        true
    }

    /// Enables a batch of entities.
    pub fn enable_entities(&mut self, keys: &[EntityKey]) {
        for &key in keys {
            self.enable_entity(key);
        }
    }

    /// Looks up an entity by string id.
    #[must_use]
    pub fn get_entity_by_id(&self, id: &str) -> Option<EntityKey> {
        self.entities.by_id(id)
    }

    /// Returns true if an entity with the id is registered.
    #[must_use]
    pub fn has_entity_with_id(&self, id: &str) -> bool {
        self.entities.by_id(id).is_some()
    }

    /// Gets an entity.
    #[must_use]
    pub fn entity(&self, key: EntityKey) -> Option<&Entity> {
        self.entities.get(key)
    }

    /// Gets an entity mutably.
    ///
    /// Writes through this reference are silent; use the component and
    /// relationship methods on the world for observable mutation.
    pub fn entity_mut(&mut self, key: EntityKey) -> Option<&mut Entity> {
        self.entities.get_mut(key)
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Returns the live entity keys in insertion order.
    #[must_use]
    pub fn entity_keys(&self) -> &[EntityKey] {
        self.entities.keys()
    }

    /// Removes every entity not in `keep`, clears the relationship
    /// indices, and removes every system and observer.
    pub fn purge(&mut self, keep: &[EntityKey]) {
        let keep: HashSet<EntityKey> = keep.iter().copied().collect();
        for key in self.entities.keys().to_vec() {
            if !keep.contains(&key) {
                self.remove_entity(key);
            }
        }
        self.relationships.clear();

        for name in self.scheduler.system_names() {
            self.remove_system(&name);
        }
        let observers: Vec<String> = self.observers.iter().map(|o| o.name.clone()).collect();
        for name in observers {
            self.remove_observer(&name);
        }
        self.deferred.clear();
        self.invalidate_cache();
    }

    /// Registers a callback run on every entity right after it is added.
    pub fn register_preprocessor(&mut self, f: impl FnMut(&mut Entity) + Send + 'static) {
        self.preprocessors.push(Box::new(f));
    }

    /// Registers a callback run on every entity right before removal.
    pub fn register_postprocessor(&mut self, f: impl FnMut(&mut Entity) + Send + 'static) {
        self.postprocessors.push(Box::new(f));
    }

    // --- Components ---

    /// Adds a component to an entity, overwriting any prior component
    /// with the same key.
    pub fn add_component(&mut self, key: EntityKey, component: Component) -> bool {
        self.apply_component(key, component)
    }

    /// Removes a component from an entity.
    pub fn remove_component(&mut self, key: EntityKey, component: Key) -> Option<Component> {
        let entity = self.entities.get_mut(key)?;
        let removed = entity.remove_component(component)?;
        let connected = entity.is_connected();

        self.index.remove(key, component);
        self.invalidate_cache();
        if connected {
            self.events.push(WorldEvent::ComponentRemoved {
                entity: key,
                component,
            });
            self.deferred.push_back(ComponentEvent::Removed {
                entity: key,
                component,
            });
        }
        Some(removed)
    }

    /// Sets a component property observably, emitting `component_changed`
    /// when the value actually changes.
    ///
    /// Returns false when the entity or component is absent. Membership
    /// indices are untouched (property values do not affect membership),
    /// so the cache survives.
    pub fn set_property(
        &mut self,
        key: EntityKey,
        component: Key,
        property: Key,
        value: impl Into<Value>,
    ) -> bool {
        let value = value.into();
        let Some(entity) = self.entities.get_mut(key) else {
            return false;
        };
        let Some(comp) = entity.component_mut(component) else {
            return false;
        };
        let old = comp.set(property, value.clone()).unwrap_or(Value::Nil);
        let connected = entity.is_connected();

        if connected && old != value {
            self.events.push(WorldEvent::ComponentChanged {
                entity: key,
                component,
                property,
                new: value.clone(),
                old: old.clone(),
            });
            self.deferred.push_back(ComponentEvent::Changed {
                entity: key,
                component,
                property,
                new: value,
                old,
            });
        }
        true
    }

    /// Gets a component property value.
    #[must_use]
    pub fn property(&self, key: EntityKey, component: Key, property: Key) -> Option<Value> {
        self.entities.get(key)?.component(component)?.get(property).cloned()
    }

    /// Indexes relationships an entity carried before registration.
    fn index_carried_relationships(&mut self, key: EntityKey) {
        let carried: Vec<(Key, Option<RelTarget>)> = self
            .entities
            .get(key)
            .map(|e| e.relationships().iter().map(|r| (r.key(), r.target)).collect())
            .unwrap_or_default();
        for (relation, target) in carried {
            self.relationships.link(relation, key);
            if let Some(RelTarget::Entity(target)) = target {
                if self.entities.contains(target) {
                    let reverse = self.interner.reverse_of(relation);
                    self.relationships.link_reverse(reverse, target);
                } else {
                    tracing::warn!(
                        stale = ?target,
                        "stale relationship target, skipping reverse index"
                    );
                }
            }
        }
    }

    fn apply_component(&mut self, key: EntityKey, component: Component) -> bool {
        let Some(entity) = self.entities.get_mut(key) else {
            return false;
        };
        let ckey = component.key();
        let replaced = entity.insert_component(component);
        let enabled = entity.enabled();
        let connected = entity.is_connected();

        if replaced.is_none() {
            self.index.add(key, ckey, enabled);
        }
        self.invalidate_cache();
        if connected {
            self.events.push(WorldEvent::ComponentAdded {
                entity: key,
                component: ckey,
            });
            self.deferred.push_back(ComponentEvent::Added {
                entity: key,
                component: ckey,
            });
        }
        true
    }

    // --- Relationships ---

    /// Adds a relationship to a source entity.
    ///
    /// The forward index always records the source. The reverse index is
    /// written only when the target is a live entity; a stale target is
    /// skipped silently and the relationship is still recorded.
    pub fn add_relationship(&mut self, source: EntityKey, relationship: Relationship) -> bool {
        if !self.entities.contains(source) {
            return false;
        }
        let relation = relationship.key();
        let reverse_target = match relationship.target {
            Some(RelTarget::Entity(target)) => {
                if self.entities.contains(target) {
                    Some(target)
                } else {
                    tracing::warn!(
                        stale = ?target,
                        "stale relationship target, skipping reverse index"
                    );
                    None
                }
            }
            _ => None,
        };

        let entity = self.entities.get_mut(source).expect("validated above");
        let connected = entity.is_connected();
        entity.push_relationship(relationship);

        self.relationships.link(relation, source);
        if let Some(target) = reverse_target {
            let reverse = self.interner.reverse_of(relation);
            self.relationships.link_reverse(reverse, target);
        }
        self.invalidate_cache();
        if connected {
            self.events.push(WorldEvent::RelationshipAdded { source, relation });
        }
        true
    }

    /// Removes the first relationship on `source` matching the relation
    /// key and target. Removing an absent relationship is a no-op.
    pub fn remove_relationship(
        &mut self,
        source: EntityKey,
        relation: Key,
        target: Option<RelTarget>,
    ) -> bool {
        let Some(entity) = self.entities.get_mut(source) else {
            return false;
        };
        let Some(pos) = entity
            .relationships()
            .iter()
            .position(|r| r.matches(relation, target))
        else {
            return false;
        };
        let removed = entity.remove_relationship(pos);
        let connected = entity.is_connected();
        let still_carries = entity.relationships().iter().any(|r| r.key() == relation);

        if !still_carries {
            self.relationships.unlink(relation, source);
        }
        if let Some(RelTarget::Entity(target)) = removed.target {
            let still_targeted = self.relationships.sources(relation).is_some_and(|sources| {
                sources.iter().any(|&s| {
                    self.entities.get(s).is_some_and(|e| {
                        e.relationships()
                            .iter()
                            .any(|r| r.matches(relation, Some(RelTarget::Entity(target))))
                    })
                })
            });
            if !still_targeted {
                let reverse = self.interner.reverse_of(relation);
                self.relationships.unlink_reverse(reverse, target);
            }
        }
        self.invalidate_cache();
        if connected {
            self.events.push(WorldEvent::RelationshipRemoved { source, relation });
        }
        true
    }

    /// Returns the entities carrying a relation (forward index).
    #[must_use]
    pub fn sources_of(&self, relation: Key) -> Vec<EntityKey> {
        self.relationships
            .sources(relation)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Returns the entities targeted by a relation (reverse index).
    pub fn targets_of(&mut self, relation: Key) -> Vec<EntityKey> {
        let reverse = self.interner.reverse_of(relation);
        self.relationships
            .targets(reverse)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    // --- Queries ---

    /// Starts a fluent query.
    pub fn query(&mut self) -> QueryBuilder<'_> {
        let spec = self.spec_pool.pop().unwrap_or_default();
        QueryBuilder::new(self, spec)
    }

    /// Executes a query spec, serving repeated queries from the cache.
    ///
    /// The returned slice is shared with the cache; treat it as
    /// read-only. A fully unfiltered spec short-circuits to the entity
    /// list without touching the cache.
    pub fn execute_spec(&mut self, spec: &QuerySpec) -> Arc<[EntityKey]> {
        if spec.is_unfiltered() {
            return self.entities.keys().into();
        }
        let cache_key = spec.cache_key();
        if let Some(hit) = self.cache.lookup(cache_key) {
            return hit;
        }
        let result: Arc<[EntityKey]> = plan(spec, &self.index, self.entities.keys()).into();
        self.cache.insert(cache_key, Arc::clone(&result));
        result
    }

    pub(crate) fn recycle_spec(&mut self, mut spec: QuerySpec) {
        if self.spec_pool.len() < self.config.pool_size_limit {
            spec.reset();
            self.spec_pool.push(spec);
        }
    }

    /// Returns the query cache counters.
    #[must_use]
    pub fn get_cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Resets the query cache counters.
    pub fn reset_cache_stats(&mut self) {
        self.cache.reset_stats();
    }

    fn invalidate_cache(&mut self) {
        if self.cache.invalidate() {
            tracing::trace!("query cache invalidated");
            self.events.push(WorldEvent::CacheInvalidated);
        }
    }

    // --- Systems ---

    /// Registers a system, replacing any prior system with the same name,
    /// and runs its `setup` once. With `sort`, every group is re-sorted
    /// topologically.
    ///
    /// # Errors
    ///
    /// Returns [`weft_foundation::ErrorKind::DependencyCycle`] when
    /// sorting detects a cycle.
    pub fn add_system(&mut self, system: Box<dyn System>, sort: bool) -> Result<()> {
        let name = system.name().to_string();
        if self.scheduler.contains(&name) {
            tracing::debug!(system = %name, "replacing prior system with duplicate name");
            self.remove_system(&name);
        }
        self.scheduler.add(SystemEntry::new(system));

        if !self.host.is_attached(&name) {
            self.host.attach(&name, &self.config.system_nodes_root);
        }

        let mut taken = self
            .scheduler
            .entry_mut(&name)
            .and_then(|entry| entry.system.take());
        if let Some(system) = taken.as_mut() {
            system.setup(self);
        }
        if let Some(system) = taken {
            if let Some(entry) = self.scheduler.entry_mut(&name) {
                entry.system = Some(system);
            }
        }

        self.events.push(WorldEvent::SystemAdded(name.clone()));
        tracing::debug!(system = %name, "system added");
        if sort {
            self.scheduler.sort()?;
        }
        Ok(())
    }

    /// Registers a batch of systems, sorting once at the end.
    ///
    /// # Errors
    ///
    /// Returns [`weft_foundation::ErrorKind::DependencyCycle`] when
    /// sorting detects a cycle.
    pub fn add_systems(&mut self, systems: Vec<Box<dyn System>>, sort: bool) -> Result<()> {
        for system in systems {
            self.add_system(system, false)?;
        }
        if sort {
            self.scheduler.sort()?;
        }
        Ok(())
    }

    /// Removes a system by name, deleting its group when it empties.
    pub fn remove_system(&mut self, name: &str) -> bool {
        if self.scheduler.remove(name).is_some() {
            self.host.detach(name);
            self.events.push(WorldEvent::SystemRemoved(name.to_string()));
            tracing::debug!(system = %name, "system removed");
            true
        } else {
            false
        }
    }

    /// Removes every system in a group.
    pub fn remove_system_group(&mut self, group: &str) {
        // Iterate a snapshot; each removal mutates the live group.
        for name in self.scheduler.group_order(group) {
            self.remove_system(&name);
        }
    }

    /// Returns true if a system with the name is registered.
    #[must_use]
    pub fn has_system(&self, name: &str) -> bool {
        self.scheduler.contains(name)
    }

    /// Returns a group's system names in dispatch order.
    #[must_use]
    pub fn system_order(&self, group: &str) -> Vec<String> {
        self.scheduler.group_order(group)
    }

    /// Sets a system's active flag; inactive systems are skipped
    /// wholesale by the dispatcher.
    pub fn set_system_active(&mut self, name: &str, active: bool) -> bool {
        match self.scheduler.entry_mut(name) {
            Some(entry) => {
                entry.config.active = active;
                true
            }
            None => false,
        }
    }

    /// Propagates the world's pause state: each system's paused flag is
    /// set from its own `can_process`.
    pub fn update_pause_state(&mut self, paused: bool) {
        for entry in self.scheduler.entries_mut() {
            if let Some(system) = entry.system.as_ref() {
                entry.paused = !system.can_process(paused);
            }
        }
    }

    // --- Observers ---

    /// Registers an observer, replacing any prior observer with the same
    /// name.
    pub fn add_observer(&mut self, observer: Box<dyn Observer>) {
        let name = observer.name().to_string();
        if self.observers.iter().any(|o| o.name == name) {
            tracing::debug!(observer = %name, "replacing prior observer with duplicate name");
            self.remove_observer(&name);
        }
        self.observers.push(ObserverEntry::new(observer));
    }

    /// Removes an observer by name.
    pub fn remove_observer(&mut self, name: &str) -> bool {
        let before = self.observers.len();
        self.observers.retain(|o| o.name != name);
        before != self.observers.len()
    }

    /// Returns the number of registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Drains the deferred component-event queue through the observers.
    ///
    /// Runs automatically at the top of every [`World::process`] call;
    /// hosts may also call it at their own safe points. Observers are
    /// visited in registration order. Added and changed events require a
    /// match-query hit; removed events notify unconditionally.
    pub fn dispatch_deferred(&mut self) {
        while let Some(event) = self.deferred.pop_front() {
            let (entity, component) = event.parts();
            let mut idx = 0;
            while idx < self.observers.len() {
                let entry = &self.observers[idx];
                if entry.watch != component || entry.observer.is_none() {
                    idx += 1;
                    continue;
                }
                let name = entry.name.clone();
                let mut observer = self.observers[idx].observer.take().expect("checked above");
                let mut match_spec = self.observers[idx].match_spec.take();
                if match_spec.is_none() {
                    match_spec = Some(observer.match_query());
                }

                let deliver = match &event {
                    ComponentEvent::Removed { .. } => true,
                    ComponentEvent::Added { .. } => {
                        let matched_before = self.observers[idx].matched.contains(&entity);
                        let spec = match_spec.as_ref().expect("set above");
                        let matches = self.execute_spec(spec).contains(&entity);
                        matches && !matched_before
                    }
                    ComponentEvent::Changed { .. } => {
                        let spec = match_spec.as_ref().expect("set above");
                        self.execute_spec(spec).contains(&entity)
                    }
                };

                if deliver {
                    match event.clone() {
                        ComponentEvent::Added { entity, component } => {
                            observer.on_component_added(self, entity, component);
                        }
                        ComponentEvent::Removed { entity, component } => {
                            observer.on_component_removed(self, entity, component);
                        }
                        ComponentEvent::Changed {
                            entity,
                            component,
                            property,
                            new,
                            old,
                        } => {
                            observer.on_component_changed(self, entity, component, property, new, old);
                        }
                    }
                }

                // The handler may have moved or removed entries; relocate
                // by name before restoring.
                if let Some(entry) = self
                    .observers
                    .iter_mut()
                    .find(|e| e.name == name && e.observer.is_none())
                {
                    entry.observer = Some(observer);
                    entry.match_spec = match_spec;
                    match &event {
                        ComponentEvent::Added { .. } if deliver => {
                            entry.matched.insert(entity);
                        }
                        ComponentEvent::Removed { .. } => {
                            entry.matched.remove(&entity);
                        }
                        _ => {}
                    }
                }
                idx += 1;
            }
        }
    }

    // --- Tick ---

    /// Runs one tick over a system group.
    ///
    /// Deferred observer notifications queued since the last tick drain
    /// first, then the group's systems dispatch in sorted order. The
    /// default group is `""`.
    pub fn process(&mut self, delta: f64, group: &str) {
        self.dispatch_deferred();

        let mut index = 0;
        while index < self.scheduler.group_len(group) {
            let Some(slot) = self.scheduler.begin_dispatch(group, index) else {
                index += 1;
                continue;
            };
            let slot = self.run_system(slot, delta);
            self.scheduler.end_dispatch(slot);
            index += 1;
        }
    }

    fn run_system(&mut self, mut slot: DispatchSlot, delta: f64) -> DispatchSlot {
        if slot.query.is_none() {
            slot.query = Some(slot.system.query());
        }

        if !slot.single_query && slot.subsystems.is_none() {
            let subsystems = slot.system.sub_systems(self);
            if subsystems.is_empty() {
                slot.single_query = true;
            } else {
                slot.subsystems = Some(subsystems);
            }
        }

        if let Some(subsystems) = slot.subsystems.as_mut() {
            for sub in subsystems.iter_mut() {
                let result = self.execute_spec(&sub.query);
                if sub.all_at_once {
                    (sub.run)(self, &result, delta);
                } else {
                    for &entity in result.iter() {
                        (sub.run)(self, &[entity], delta);
                    }
                }
            }
        } else {
            let spec = slot.query.as_ref().expect("bound above");
            let result = self.execute_spec(spec);
            if !result.is_empty() || slot.config.process_empty {
                slot.system.process_all(self, &result, delta);
            }
        }
        slot
    }

    /// Runs a callback over the selected entities on the worker pool,
    /// blocking until every worker joins. See
    /// [`EntityStore::par_each`](weft_storage::EntityStore::par_each).
    pub fn par_each<F>(&mut self, selected: &HashSet<EntityKey>, f: F)
    where
        F: Fn(&mut Entity) + Send + Sync,
    {
        self.entities.par_each(selected, f);
    }

    // --- Events ---

    /// Drains the world's emitted events.
    pub fn take_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.events)
    }

    /// Test and introspection access to the component index.
    #[must_use]
    pub fn component_index(&self) -> &ComponentIndex {
        &self.index
    }

    fn run_hook(
        &mut self,
        key: EntityKey,
        f: impl FnOnce(&mut dyn weft_storage::EntityHooks, &mut Entity),
    ) {
        if let Some(entity) = self.entities.get_mut(key) {
            if let Some(mut hooks) = entity.take_hooks() {
                f(hooks.as_mut(), entity);
                entity.put_hooks(Some(hooks));
            }
        }
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.entities.len())
            .field("systems", &self.scheduler.len())
            .field("observers", &self.observers.len())
            .field("cached_queries", &self.cache.len())
            .finish_non_exhaustive()
    }
}
