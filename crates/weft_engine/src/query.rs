//! Query planning and result caching.
//!
//! This module provides:
//! - [`QuerySpec`] - The three component lists plus enabled filter
//! - [`QueryCache`] - Keyed result cache with hit/miss counters
//! - [`plan`] - The set-algebra planner with min-seed intersection

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use weft_foundation::{EntityKey, Key};
use weft_storage::ComponentIndex;

// =============================================================================
// Query Spec
// =============================================================================

/// Role primes for the cache key. Membership within a role is combined
/// with XOR (commutative), while the primes keep the three roles disjoint
/// in the hash domain.
const ALL_PRIME: u64 = 3;
const ANY_PRIME: u64 = 5;
const EXCLUDE_PRIME: u64 = 7;

/// Salts distinguishing the enabled-filter variants of otherwise equal
/// specs. Invalidation is conservative (flush all), but an enabled/union
/// alias would survive without any mutation, so the filter must reach the
/// key.
const ENABLED_SALT: u64 = 0x9e37_79b9_7f4a_7c15;
const DISABLED_SALT: u64 = 0x517c_c1b7_2722_0a95;

/// A query description: required, alternative, and excluded component
/// keys, plus an optional enabled filter.
///
/// Duplicate keys within a list are tolerated; the set operations absorb
/// them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QuerySpec {
    all: Vec<Key>,
    any: Vec<Key>,
    exclude: Vec<Key>,
    enabled: Option<bool>,
}

impl QuerySpec {
    /// Creates an empty spec matching every entity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires every given component.
    #[must_use]
    pub fn with_all(mut self, keys: impl IntoIterator<Item = Key>) -> Self {
        self.all.extend(keys);
        self
    }

    /// Requires at least one of the given components.
    #[must_use]
    pub fn with_any(mut self, keys: impl IntoIterator<Item = Key>) -> Self {
        self.any.extend(keys);
        self
    }

    /// Excludes every carrier of the given components.
    #[must_use]
    pub fn with_none(mut self, keys: impl IntoIterator<Item = Key>) -> Self {
        self.exclude.extend(keys);
        self
    }

    /// Restricts the query to enabled (`true`) or disabled (`false`)
    /// entities. Without this the union index is consulted.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Returns the required component keys.
    #[must_use]
    pub fn all(&self) -> &[Key] {
        &self.all
    }

    /// Returns the alternative component keys.
    #[must_use]
    pub fn any(&self) -> &[Key] {
        &self.any
    }

    /// Returns the excluded component keys.
    #[must_use]
    pub fn exclude(&self) -> &[Key] {
        &self.exclude
    }

    /// Returns the enabled filter.
    #[must_use]
    pub fn enabled_filter(&self) -> Option<bool> {
        self.enabled
    }

    /// Returns true if no component list constrains the query.
    #[must_use]
    pub fn is_unfiltered(&self) -> bool {
        self.all.is_empty() && self.any.is_empty() && self.exclude.is_empty()
    }

    /// Computes the cache key for this spec.
    ///
    /// Key identities are folded with XOR per role so list order does not
    /// matter, multiplied by a distinct prime per role so the roles stay
    /// disjoint. Collisions are acceptable; invalidation flushes the
    /// whole cache.
    #[must_use]
    pub fn cache_key(&self) -> u64 {
        fn fold(keys: &[Key], prime: u64) -> u64 {
            keys.iter().fold(0, |acc, key| {
                acc ^ (u64::from(key.index()) + 1).wrapping_mul(prime)
            })
        }

        let salt = match self.enabled {
            Some(true) => ENABLED_SALT,
            Some(false) => DISABLED_SALT,
            None => 0,
        };
        fold(&self.all, ALL_PRIME) ^ fold(&self.any, ANY_PRIME) ^ fold(&self.exclude, EXCLUDE_PRIME) ^ salt
    }

    /// Resets the spec for pool reuse.
    pub(crate) fn reset(&mut self) {
        self.all.clear();
        self.any.clear();
        self.exclude.clear();
        self.enabled = None;
    }
}

// =============================================================================
// Planner
// =============================================================================

/// Executes a spec against the component index.
///
/// Implements the set-algebra plan: seed the intersection from the
/// smallest `all` set (short-circuiting to empty the moment the working
/// set drains), union the `any` sets, intersect the two when both are
/// present, seed from the full entity list when only `exclude` is given,
/// and finally subtract each excluded set.
///
/// The unfiltered fast path (no component lists at all) is the caller's
/// concern; it returns the entity list directly without caching.
#[must_use]
pub fn plan(spec: &QuerySpec, index: &ComponentIndex, entities: &[EntityKey]) -> Vec<EntityKey> {
    let bucket = index.bucket(spec.enabled_filter());

    let mut working: Option<HashSet<EntityKey>> = None;

    if !spec.all().is_empty() {
        let mut sets = Vec::with_capacity(spec.all().len());
        for key in spec.all() {
            // A required key with no carriers empties the whole result
            let Some(set) = bucket.get(key) else {
                return Vec::new();
            };
            sets.push(set);
        }

        // Min-seed: start from the smallest required set
        let seed_pos = sets
            .iter()
            .enumerate()
            .min_by_key(|(_, set)| set.len())
            .map_or(0, |(pos, _)| pos);

        let mut result: HashSet<EntityKey> = sets[seed_pos].iter().copied().collect();
        for (pos, set) in sets.iter().enumerate() {
            if pos == seed_pos {
                continue;
            }
            result.retain(|entity| set.contains(entity));
            if result.is_empty() {
                return Vec::new();
            }
        }
        working = Some(result);
    }

    if !spec.any().is_empty() {
        let mut union: HashSet<EntityKey> = HashSet::new();
        for key in spec.any() {
            if let Some(set) = bucket.get(key) {
                union.extend(set.iter().copied());
            }
        }
        working = Some(match working {
            Some(mut result) => {
                result.retain(|entity| union.contains(entity));
                result
            }
            None => union,
        });
    }

    // Exclude-only queries subtract from the full entity list
    let mut result = working.unwrap_or_else(|| entities.iter().copied().collect());

    for key in spec.exclude() {
        if result.is_empty() {
            break;
        }
        if let Some(set) = bucket.get(key) {
            result.retain(|entity| !set.contains(entity));
        }
    }

    result.into_iter().collect()
}

// =============================================================================
// Query Builder
// =============================================================================

/// Fluent query over the world, ending in [`QueryBuilder::execute`].
///
/// The builder's spec comes from the world's size-bounded free list and
/// returns to it on execute.
pub struct QueryBuilder<'w> {
    world: &'w mut crate::world::World,
    spec: QuerySpec,
}

impl<'w> QueryBuilder<'w> {
    pub(crate) fn new(world: &'w mut crate::world::World, spec: QuerySpec) -> Self {
        Self { world, spec }
    }

    /// Requires every given component.
    #[must_use]
    pub fn with_all(mut self, keys: impl IntoIterator<Item = Key>) -> Self {
        self.spec.all.extend(keys);
        self
    }

    /// Requires at least one of the given components.
    #[must_use]
    pub fn with_any(mut self, keys: impl IntoIterator<Item = Key>) -> Self {
        self.spec.any.extend(keys);
        self
    }

    /// Excludes every carrier of the given components.
    #[must_use]
    pub fn with_none(mut self, keys: impl IntoIterator<Item = Key>) -> Self {
        self.spec.exclude.extend(keys);
        self
    }

    /// Restricts the query to enabled or disabled entities.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.spec.enabled = Some(enabled);
        self
    }

    /// Runs the query. The result is shared with the cache; treat it as
    /// read-only.
    pub fn execute(self) -> Arc<[EntityKey]> {
        let Self { world, spec } = self;
        let result = world.execute_spec(&spec);
        world.recycle_spec(spec);
        result
    }
}

impl fmt::Debug for QueryBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder").field("spec", &self.spec).finish_non_exhaustive()
    }
}

// =============================================================================
// Cache
// =============================================================================

/// Cache introspection counters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CacheStats {
    /// Number of lookups answered from the cache.
    pub cache_hits: u64,
    /// Number of lookups that had to run the planner.
    pub cache_misses: u64,
    /// Hits over total lookups, 0.0 when no lookups happened.
    pub hit_rate: f64,
    /// Number of results currently cached.
    pub cached_queries: usize,
}

/// Keyed query-result cache.
///
/// Results are shared as `Arc` slices; callers must treat them as
/// read-only. The cache is flushed conservatively on every mutation that
/// could change any set membership.
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: std::collections::HashMap<u64, Arc<[EntityKey]>>,
    hits: u64,
    misses: u64,
}

impl QueryCache {
    /// Creates a new empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a cached result, counting a hit or a miss.
    pub fn lookup(&mut self, key: u64) -> Option<Arc<[EntityKey]>> {
        match self.entries.get(&key) {
            Some(result) => {
                self.hits += 1;
                Some(Arc::clone(result))
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Stores a result under a key.
    pub fn insert(&mut self, key: u64, result: Arc<[EntityKey]>) {
        self.entries.insert(key, result);
    }

    /// Drops every cached result, returning true if any were present.
    ///
    /// Counters survive invalidation; they describe lookups, not entries.
    pub fn invalidate(&mut self) -> bool {
        let had_entries = !self.entries.is_empty();
        self.entries.clear();
        had_entries
    }

    /// Returns the current counters.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let total = self.hits + self.misses;
        CacheStats {
            cache_hits: self.hits,
            cache_misses: self.misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                self.hits as f64 / total as f64
            },
            cached_queries: self.entries.len(),
        }
    }

    /// Resets the hit/miss counters without touching cached entries.
    pub fn reset_stats(&mut self) {
        self.hits = 0;
        self.misses = 0;
    }

    /// Returns the number of cached results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_foundation::KeyInterner;

    fn keys(interner: &mut KeyInterner, names: &[&str]) -> Vec<Key> {
        names.iter().map(|n| interner.intern(n)).collect()
    }

    fn entity(index: u32) -> EntityKey {
        EntityKey::new(index, 1)
    }

    /// Builds an index where entity i carries the components whose bit is
    /// set in `membership[i]`.
    fn build_index(components: &[Key], membership: &[u32]) -> (ComponentIndex, Vec<EntityKey>) {
        let mut index = ComponentIndex::new();
        let mut entities = Vec::new();
        for (i, mask) in membership.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let key = entity(i as u32);
            entities.push(key);
            for (bit, component) in components.iter().enumerate() {
                if mask & (1 << bit) != 0 {
                    index.add(key, *component, true);
                }
            }
        }
        (index, entities)
    }

    #[test]
    fn all_intersects() {
        let mut interner = KeyInterner::new();
        let c = keys(&mut interner, &["x", "y"]);
        // e0: {x}, e1: {x, y}, e2: {y}
        let (index, entities) = build_index(&c, &[0b01, 0b11, 0b10]);

        let spec = QuerySpec::new().with_all(c.clone());
        let result = plan(&spec, &index, &entities);
        assert_eq!(result, vec![entity(1)]);
    }

    #[test]
    fn absent_required_key_short_circuits() {
        let mut interner = KeyInterner::new();
        let c = keys(&mut interner, &["x", "ghost"]);
        let (index, entities) = build_index(&c[..1], &[0b1, 0b1]);

        let spec = QuerySpec::new().with_all(c);
        assert!(plan(&spec, &index, &entities).is_empty());
    }

    #[test]
    fn any_unions() {
        let mut interner = KeyInterner::new();
        let c = keys(&mut interner, &["x", "y"]);
        let (index, entities) = build_index(&c, &[0b01, 0b10, 0b00]);

        let spec = QuerySpec::new().with_any(c);
        let mut result = plan(&spec, &index, &entities);
        result.sort_by_key(|e| e.index);
        assert_eq!(result, vec![entity(0), entity(1)]);
    }

    #[test]
    fn all_and_any_intersect() {
        let mut interner = KeyInterner::new();
        let c = keys(&mut interner, &["x", "y", "z"]);
        // e0: {x, y}, e1: {x, z}, e2: {x}
        let (index, entities) = build_index(&c, &[0b011, 0b101, 0b001]);

        let spec = QuerySpec::new()
            .with_all(vec![c[0]])
            .with_any(vec![c[1], c[2]]);
        let mut result = plan(&spec, &index, &entities);
        result.sort_by_key(|e| e.index);
        assert_eq!(result, vec![entity(0), entity(1)]);
    }

    #[test]
    fn exclude_only_seeds_from_entity_list() {
        let mut interner = KeyInterner::new();
        let c = keys(&mut interner, &["x"]);
        let (index, entities) = build_index(&c, &[0b1, 0b0, 0b0]);

        let spec = QuerySpec::new().with_none(c);
        let mut result = plan(&spec, &index, &entities);
        result.sort_by_key(|e| e.index);
        assert_eq!(result, vec![entity(1), entity(2)]);
    }

    #[test]
    fn duplicates_are_absorbed() {
        let mut interner = KeyInterner::new();
        let c = keys(&mut interner, &["x"]);
        let (index, entities) = build_index(&c, &[0b1, 0b1]);

        let spec = QuerySpec::new().with_all(vec![c[0], c[0], c[0]]);
        assert_eq!(plan(&spec, &index, &entities).len(), 2);
    }

    #[test]
    fn min_seed_equals_naive_scan() {
        let mut interner = KeyInterner::new();
        let c = keys(&mut interner, &["a", "b", "c"]);
        let membership = [0b111, 0b011, 0b101, 0b110, 0b001, 0b000, 0b111];
        let (index, entities) = build_index(&c, &membership);

        let spec = QuerySpec::new().with_all(vec![c[0], c[1]]).with_none(vec![c[2]]);
        let mut planned = plan(&spec, &index, &entities);
        planned.sort_by_key(|e| e.index);

        // Naive full scan over the membership table
        let mut naive: Vec<EntityKey> = membership
            .iter()
            .enumerate()
            .filter(|(_, m)| (*m & 0b011) == 0b011 && (*m & 0b100) == 0)
            .map(|(i, _)| {
                #[allow(clippy::cast_possible_truncation)]
                let key = entity(i as u32);
                key
            })
            .collect();
        naive.sort_by_key(|e| e.index);

        assert_eq!(planned, naive);
    }

    #[test]
    fn cache_key_is_commutative_within_role() {
        let mut interner = KeyInterner::new();
        let c = keys(&mut interner, &["x", "y"]);

        let a = QuerySpec::new().with_all(vec![c[0], c[1]]).cache_key();
        let b = QuerySpec::new().with_all(vec![c[1], c[0]]).cache_key();
        assert_eq!(a, b);
    }

    #[test]
    fn cache_key_separates_roles() {
        let mut interner = KeyInterner::new();
        let c = keys(&mut interner, &["x"]);

        let all = QuerySpec::new().with_all(c.clone()).cache_key();
        let any = QuerySpec::new().with_any(c.clone()).cache_key();
        let none = QuerySpec::new().with_none(c).cache_key();
        assert_ne!(all, any);
        assert_ne!(all, none);
        assert_ne!(any, none);
    }

    #[test]
    fn cache_key_separates_enabled_filter() {
        let mut interner = KeyInterner::new();
        let c = keys(&mut interner, &["x"]);

        let union = QuerySpec::new().with_all(c.clone()).cache_key();
        let enabled = QuerySpec::new().with_all(c).with_enabled(true).cache_key();
        assert_ne!(union, enabled);
    }

    #[test]
    fn cache_counts_hits_and_misses() {
        let mut cache = QueryCache::new();

        assert!(cache.lookup(7).is_none());
        cache.insert(7, Arc::from(vec![entity(0)].as_slice()));
        assert!(cache.lookup(7).is_some());

        let stats = cache.stats();
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(stats.cached_queries, 1);
    }

    #[test]
    fn invalidate_reports_occupancy() {
        let mut cache = QueryCache::new();
        assert!(!cache.invalidate());

        cache.insert(1, Arc::from(Vec::new().as_slice()));
        assert!(cache.invalidate());
        assert!(cache.is_empty());
    }
}
