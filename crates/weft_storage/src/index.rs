//! The component membership index.
//!
//! Three parallel maps from component type key to entity set: the union
//! index holds every carrier of a component, the enabled and disabled
//! indices partition it by the carrier's enabled flag. Queries pick one
//! of the three as their active index.
//!
//! Invariant: every (key, entity) pair in the union index appears in
//! exactly one of enabled/disabled, matching the entity's flag at that
//! moment. Empty sets are evicted so key presence means non-empty.

use std::collections::{HashMap, HashSet};

use weft_foundation::{EntityKey, Key};

/// Union/enabled/disabled component index.
#[derive(Clone, Debug, Default)]
pub struct ComponentIndex {
    all: HashMap<Key, HashSet<EntityKey>>,
    enabled: HashMap<Key, HashSet<EntityKey>>,
    disabled: HashMap<Key, HashSet<EntityKey>>,
}

impl ComponentIndex {
    /// Creates a new empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an entity under a component key.
    ///
    /// The entity lands in the union index and in the enabled or disabled
    /// index per its flag.
    pub fn add(&mut self, entity: EntityKey, component: Key, enabled: bool) {
        self.all.entry(component).or_default().insert(entity);
        let half = if enabled {
            &mut self.enabled
        } else {
            &mut self.disabled
        };
        half.entry(component).or_default().insert(entity);
    }

    /// Removes an entity from a component key in all three maps.
    ///
    /// Removing an absent pair is a no-op. Empty sets are evicted.
    pub fn remove(&mut self, entity: EntityKey, component: Key) {
        for map in [&mut self.all, &mut self.enabled, &mut self.disabled] {
            if let Some(set) = map.get_mut(&component) {
                set.remove(&entity);
                if set.is_empty() {
                    map.remove(&component);
                }
            }
        }
    }

    /// Moves an entity between the enabled and disabled indices for one
    /// component key, leaving the union index untouched.
    pub fn set_enabled(&mut self, entity: EntityKey, component: Key, enabled: bool) {
        let (from, to) = if enabled {
            (&mut self.disabled, &mut self.enabled)
        } else {
            (&mut self.enabled, &mut self.disabled)
        };

        if let Some(set) = from.get_mut(&component) {
            set.remove(&entity);
            if set.is_empty() {
                from.remove(&component);
            }
        }
        to.entry(component).or_default().insert(entity);
    }

    /// Moves an entity into the enabled index for every given component.
    pub fn move_to_enabled(&mut self, entity: EntityKey, components: impl Iterator<Item = Key>) {
        for component in components {
            self.set_enabled(entity, component, true);
        }
    }

    /// Moves an entity into the disabled index for every given component.
    pub fn move_to_disabled(&mut self, entity: EntityKey, components: impl Iterator<Item = Key>) {
        for component in components {
            self.set_enabled(entity, component, false);
        }
    }

    /// Gets the entity set for a component key in the chosen index.
    ///
    /// `enabled_filter` of `Some(true)` reads the enabled-only index,
    /// `Some(false)` the disabled-only index, `None` the union index.
    /// Returns `None` when the set would be empty.
    #[must_use]
    pub fn entities_with(
        &self,
        component: Key,
        enabled_filter: Option<bool>,
    ) -> Option<&HashSet<EntityKey>> {
        self.bucket(enabled_filter).get(&component)
    }

    /// Returns the whole map for the chosen index.
    #[must_use]
    pub fn bucket(&self, enabled_filter: Option<bool>) -> &HashMap<Key, HashSet<EntityKey>> {
        match enabled_filter {
            Some(true) => &self.enabled,
            Some(false) => &self.disabled,
            None => &self.all,
        }
    }

    /// Returns true if any entity carries the component.
    #[must_use]
    pub fn has_key(&self, component: Key) -> bool {
        self.all.contains_key(&component)
    }

    /// Clears all three maps.
    pub fn clear(&mut self) {
        self.all.clear();
        self.enabled.clear();
        self.disabled.clear();
    }

    /// Checks the three-map invariant. Test support.
    ///
    /// Verifies that no set is empty and that every union entry appears
    /// in exactly one of enabled/disabled.
    #[must_use]
    pub fn is_coherent(&self) -> bool {
        let no_empty = |map: &HashMap<Key, HashSet<EntityKey>>| {
            map.values().all(|set| !set.is_empty())
        };
        if !(no_empty(&self.all) && no_empty(&self.enabled) && no_empty(&self.disabled)) {
            return false;
        }

        for (key, union) in &self.all {
            let enabled = self.enabled.get(key);
            let disabled = self.disabled.get(key);
            for entity in union {
                let in_enabled = enabled.is_some_and(|s| s.contains(entity));
                let in_disabled = disabled.is_some_and(|s| s.contains(entity));
                if in_enabled == in_disabled {
                    return false;
                }
            }
            let enabled_len = enabled.map_or(0, HashSet::len);
            let disabled_len = disabled.map_or(0, HashSet::len);
            if enabled_len + disabled_len != union.len() {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_foundation::KeyInterner;

    fn setup() -> (ComponentIndex, KeyInterner) {
        (ComponentIndex::new(), KeyInterner::new())
    }

    #[test]
    fn add_lands_in_union_and_half() {
        let (mut index, mut interner) = setup();
        let position = interner.intern("position");
        let e = EntityKey::new(0, 1);

        index.add(e, position, true);

        assert!(index.entities_with(position, None).unwrap().contains(&e));
        assert!(index
            .entities_with(position, Some(true))
            .unwrap()
            .contains(&e));
        assert!(index.entities_with(position, Some(false)).is_none());
        assert!(index.is_coherent());
    }

    #[test]
    fn remove_evicts_empty_sets() {
        let (mut index, mut interner) = setup();
        let position = interner.intern("position");
        let e = EntityKey::new(0, 1);

        index.add(e, position, true);
        index.remove(e, position);

        assert!(!index.has_key(position));
        assert!(index.entities_with(position, Some(true)).is_none());
        assert!(index.is_coherent());
    }

    #[test]
    fn remove_missing_pair_is_noop() {
        let (mut index, mut interner) = setup();
        let position = interner.intern("position");

        index.remove(EntityKey::new(0, 1), position);
        assert!(index.is_coherent());
    }

    #[test]
    fn set_enabled_moves_between_halves() {
        let (mut index, mut interner) = setup();
        let position = interner.intern("position");
        let e = EntityKey::new(0, 1);

        index.add(e, position, true);
        index.set_enabled(e, position, false);

        assert!(index.entities_with(position, None).unwrap().contains(&e));
        assert!(index.entities_with(position, Some(true)).is_none());
        assert!(index
            .entities_with(position, Some(false))
            .unwrap()
            .contains(&e));
        assert!(index.is_coherent());
    }

    #[test]
    fn enable_round_trip_restores_state() {
        let (mut index, mut interner) = setup();
        let position = interner.intern("position");
        let velocity = interner.intern("velocity");
        let e = EntityKey::new(0, 1);

        index.add(e, position, true);
        index.add(e, velocity, true);

        index.move_to_disabled(e, [position, velocity].into_iter());
        index.move_to_enabled(e, [position, velocity].into_iter());

        for key in [position, velocity] {
            assert!(index.entities_with(key, Some(true)).unwrap().contains(&e));
            assert!(index.entities_with(key, Some(false)).is_none());
        }
        assert!(index.is_coherent());
    }

    #[test]
    fn bucket_selects_by_filter() {
        let (mut index, mut interner) = setup();
        let position = interner.intern("position");

        index.add(EntityKey::new(0, 1), position, true);
        index.add(EntityKey::new(1, 1), position, false);

        assert_eq!(index.bucket(None)[&position].len(), 2);
        assert_eq!(index.bucket(Some(true))[&position].len(), 1);
        assert_eq!(index.bucket(Some(false))[&position].len(), 1);
    }
}
