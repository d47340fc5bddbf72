//! Relationship storage with bidirectional indices.
//!
//! A relationship is a (source entity, relation component, target) triple.
//! The forward index answers "which entities carry relation R"; the
//! reverse index answers "which entities are targeted by relation R". The
//! reverse index exists only for entity targets.

use std::collections::{HashMap, HashSet};

use weft_foundation::{EntityKey, Key};

use crate::component::Component;

/// Target of a relationship: a concrete entity or a component-type tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelTarget {
    /// A concrete entity.
    Entity(EntityKey),
    /// A component-type tag ("any entity of this kind").
    Type(Key),
}

/// A relationship carried by a source entity.
///
/// The relation itself is a component instance, so relations can carry
/// data. The target is optional: a target-less relationship is a plain
/// marker edge.
#[derive(Clone, Debug, PartialEq)]
pub struct Relationship {
    /// The relation component.
    pub relation: Component,
    /// The relationship target, if any.
    pub target: Option<RelTarget>,
}

impl Relationship {
    /// Creates a new relationship.
    #[must_use]
    pub fn new(relation: Component, target: Option<RelTarget>) -> Self {
        Self { relation, target }
    }

    /// Returns the relation's type key.
    #[must_use]
    pub fn key(&self) -> Key {
        self.relation.key()
    }

    /// Returns true if this relationship has the given relation key and
    /// target.
    #[must_use]
    pub fn matches(&self, relation: Key, target: Option<RelTarget>) -> bool {
        self.key() == relation && self.target == target
    }
}

/// Bidirectional relationship index.
///
/// Forward: relation key -> set of source entities carrying it.
/// Reverse: `reverse_<relation>` key -> set of targeted entities.
/// Empty sets are evicted so key presence means non-empty.
#[derive(Clone, Debug, Default)]
pub struct RelationshipIndex {
    forward: HashMap<Key, HashSet<EntityKey>>,
    reverse: HashMap<Key, HashSet<EntityKey>>,
}

impl RelationshipIndex {
    /// Creates a new empty relationship index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a source entity under a relation key in the forward index.
    pub fn link(&mut self, relation: Key, source: EntityKey) {
        self.forward.entry(relation).or_default().insert(source);
    }

    /// Records a target entity under a reverse key in the reverse index.
    pub fn link_reverse(&mut self, reverse_key: Key, target: EntityKey) {
        self.reverse.entry(reverse_key).or_default().insert(target);
    }

    /// Removes a source entity from a relation's forward set.
    ///
    /// Removing an absent entry is a no-op. Empty sets are evicted.
    pub fn unlink(&mut self, relation: Key, source: EntityKey) {
        if let Some(sources) = self.forward.get_mut(&relation) {
            sources.remove(&source);
            if sources.is_empty() {
                self.forward.remove(&relation);
            }
        }
    }

    /// Removes a target entity from a reverse set.
    ///
    /// Removing an absent entry is a no-op. Empty sets are evicted.
    pub fn unlink_reverse(&mut self, reverse_key: Key, target: EntityKey) {
        if let Some(targets) = self.reverse.get_mut(&reverse_key) {
            targets.remove(&target);
            if targets.is_empty() {
                self.reverse.remove(&reverse_key);
            }
        }
    }

    /// Gets the source entities carrying a relation.
    #[must_use]
    pub fn sources(&self, relation: Key) -> Option<&HashSet<EntityKey>> {
        self.forward.get(&relation)
    }

    /// Gets the entities targeted under a reverse key.
    #[must_use]
    pub fn targets(&self, reverse_key: Key) -> Option<&HashSet<EntityKey>> {
        self.reverse.get(&reverse_key)
    }

    /// Strips an entity from every set in both indices.
    ///
    /// Called when an entity is removed from the world; it may appear as
    /// a source in the forward index and as a target in the reverse.
    pub fn remove_entity(&mut self, entity: EntityKey) {
        self.forward.retain(|_, sources| {
            sources.remove(&entity);
            !sources.is_empty()
        });
        self.reverse.retain(|_, targets| {
            targets.remove(&entity);
            !targets.is_empty()
        });
    }

    /// Clears both indices.
    pub fn clear(&mut self) {
        self.forward.clear();
        self.reverse.clear();
    }

    /// Returns true if both indices are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty() && self.reverse.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_foundation::KeyInterner;

    fn setup() -> (RelationshipIndex, KeyInterner) {
        (RelationshipIndex::new(), KeyInterner::new())
    }

    #[test]
    fn link_and_lookup() {
        let (mut index, mut interner) = setup();
        let parent_of = interner.intern("parent_of");

        let source = EntityKey::new(0, 1);
        index.link(parent_of, source);

        assert!(index.sources(parent_of).unwrap().contains(&source));
    }

    #[test]
    fn reverse_link_and_lookup() {
        let (mut index, mut interner) = setup();
        let parent_of = interner.intern("parent_of");
        let rev = interner.reverse_of(parent_of);

        let target = EntityKey::new(1, 1);
        index.link_reverse(rev, target);

        assert!(index.targets(rev).unwrap().contains(&target));
    }

    #[test]
    fn unlink_evicts_empty_sets() {
        let (mut index, mut interner) = setup();
        let parent_of = interner.intern("parent_of");

        let source = EntityKey::new(0, 1);
        index.link(parent_of, source);
        index.unlink(parent_of, source);

        assert!(index.sources(parent_of).is_none());
    }

    #[test]
    fn unlink_is_idempotent() {
        let (mut index, mut interner) = setup();
        let parent_of = interner.intern("parent_of");

        // Unlinking a never-linked edge must not fail
        index.unlink(parent_of, EntityKey::new(0, 1));
        index.unlink_reverse(parent_of, EntityKey::new(0, 1));
    }

    #[test]
    fn remove_entity_strips_both_sides() {
        let (mut index, mut interner) = setup();
        let parent_of = interner.intern("parent_of");
        let rev = interner.reverse_of(parent_of);

        let a = EntityKey::new(0, 1);
        let b = EntityKey::new(1, 1);
        index.link(parent_of, a);
        index.link(parent_of, b);
        index.link_reverse(rev, a);

        index.remove_entity(a);

        assert!(!index.sources(parent_of).unwrap().contains(&a));
        assert!(index.sources(parent_of).unwrap().contains(&b));
        assert!(index.targets(rev).is_none());
    }

    #[test]
    fn relationship_matches() {
        let mut interner = KeyInterner::new();
        let likes = interner.intern("likes");
        let other = interner.intern("other");

        let target = RelTarget::Entity(EntityKey::new(3, 1));
        let rel = Relationship::new(Component::tag(likes), Some(target));

        assert!(rel.matches(likes, Some(target)));
        assert!(!rel.matches(other, Some(target)));
        assert!(!rel.matches(likes, None));
    }
}
