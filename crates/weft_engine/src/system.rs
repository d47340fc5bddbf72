//! Systems: per-tick behavior over queried entity sets.
//!
//! A system either runs a list of subsystem tuples or a single query
//! whose result is handed to `process_all`. The registry wraps each
//! system in a [`SystemEntry`](crate::schedule) holding its runtime
//! flags and memoized query state.

use std::collections::HashSet;

use weft_foundation::EntityKey;
use weft_storage::Entity;

use crate::query::QuerySpec;
use crate::world::World;

/// Registration-time configuration of a system.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SystemConfig {
    /// Group the system is dispatched with. The default group is `""`.
    pub group: String,
    /// Whether `process_all` runs even on an empty query result.
    pub process_empty: bool,
    /// Initial active flag; inactive systems are skipped wholesale.
    pub active: bool,
    /// Whether large result sets fan out to the worker pool.
    pub parallel_processing: bool,
    /// Result size at which the parallel path engages.
    pub parallel_threshold: usize,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            group: String::new(),
            process_empty: false,
            active: true,
            parallel_processing: false,
            parallel_threshold: 50,
        }
    }
}

/// Declared ordering constraints, by system name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SystemDeps {
    /// Systems this one must run before.
    pub before: Vec<String>,
    /// Systems this one must run after.
    pub after: Vec<String>,
}

impl SystemDeps {
    /// Creates an empty dependency set.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Declares that this system runs before the named one.
    #[must_use]
    pub fn run_before(mut self, name: impl Into<String>) -> Self {
        self.before.push(name.into());
        self
    }

    /// Declares that this system runs after the named one.
    #[must_use]
    pub fn run_after(mut self, name: impl Into<String>) -> Self {
        self.after.push(name.into());
        self
    }
}

/// Callable bound to a subsystem tuple.
///
/// Receives the world, the query result (a single-entity slice in
/// per-entity mode), and the tick delta.
pub type SubSystemFn = Box<dyn FnMut(&mut World, &[EntityKey], f64) + Send>;

/// A subsystem tuple: a query, a callable, and the all-at-once flag.
///
/// Tuples run in declaration order. With `all_at_once` the callable is
/// invoked once with the whole result; otherwise once per entity.
pub struct SubSystem {
    /// The tuple's query.
    pub query: QuerySpec,
    /// The callable to run over the query result.
    pub run: SubSystemFn,
    /// Invoke once with the whole result instead of per entity.
    pub all_at_once: bool,
}

impl SubSystem {
    /// Creates a per-entity subsystem tuple.
    #[must_use]
    pub fn new(
        query: QuerySpec,
        run: impl FnMut(&mut World, &[EntityKey], f64) + Send + 'static,
    ) -> Self {
        Self {
            query,
            run: Box::new(run),
            all_at_once: false,
        }
    }

    /// Creates an all-at-once subsystem tuple.
    #[must_use]
    pub fn new_batched(
        query: QuerySpec,
        run: impl FnMut(&mut World, &[EntityKey], f64) + Send + 'static,
    ) -> Self {
        Self {
            query,
            run: Box::new(run),
            all_at_once: true,
        }
    }
}

impl std::fmt::Debug for SubSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubSystem")
            .field("query", &self.query)
            .field("all_at_once", &self.all_at_once)
            .finish_non_exhaustive()
    }
}

/// Per-tick behavior over a queried set of entities.
///
/// Implementors override either `process` (single-query path) or
/// `sub_systems` (tuple path). The scheduler memoizes `query()` and the
/// first `sub_systems()` result; an empty first result permanently marks
/// the system as single-query.
#[allow(unused_variables)]
pub trait System: Send + Sync {
    /// The system's unique name; dependency declarations refer to it.
    fn name(&self) -> &str;

    /// Registration-time configuration.
    fn config(&self) -> SystemConfig {
        SystemConfig::default()
    }

    /// Declared ordering constraints.
    fn deps(&self) -> SystemDeps {
        SystemDeps::none()
    }

    /// Called once when the system is registered.
    fn setup(&mut self, world: &mut World) {}

    /// The system's query. Called once and memoized; an unfiltered spec
    /// matches every entity.
    fn query(&self) -> QuerySpec {
        QuerySpec::new()
    }

    /// The system's subsystem tuples. Called lazily once; an empty list
    /// marks the system as single-query from then on.
    fn sub_systems(&mut self, world: &mut World) -> Vec<SubSystem> {
        Vec::new()
    }

    /// Whether the system keeps running while the world is paused.
    fn can_process(&self, world_paused: bool) -> bool {
        !world_paused
    }

    /// Processes one entity (or no entity, for `process_empty` systems
    /// whose query came back empty).
    fn process(&mut self, world: &mut World, entity: Option<EntityKey>, delta: f64) {
        debug_assert!(
            false,
            "system {:?} has no subsystems and does not override process",
            self.name()
        );
    }

    /// Processes the whole query result.
    ///
    /// The default dispatches `process` per entity, fanning out to the
    /// worker pool when parallel processing is on and the result crosses
    /// the threshold. An empty result reaches this method only when
    /// `process_empty` is set, in which case `process(None)` runs once.
    fn process_all(&mut self, world: &mut World, entities: &[EntityKey], delta: f64) {
        if entities.is_empty() {
            self.process(world, None, delta);
            return;
        }

        let config = self.config();
        if config.parallel_processing && entities.len() >= config.parallel_threshold {
            let selected: HashSet<EntityKey> = entities.iter().copied().collect();
            let this: &Self = self;
            world.par_each(&selected, |entity| this.process_parallel(entity, delta));
        } else {
            for &entity in entities {
                self.process(world, Some(entity), delta);
            }
        }
    }

    /// Per-entity body for the parallel path.
    ///
    /// Workers receive only their own entity, so the world's indices and
    /// entity set are unreachable from here; field writes are silent.
    fn process_parallel(&self, entity: &mut Entity, delta: f64) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = SystemConfig::default();
        assert_eq!(config.group, "");
        assert!(config.active);
        assert!(!config.process_empty);
        assert!(!config.parallel_processing);
        assert_eq!(config.parallel_threshold, 50);
    }

    #[test]
    fn deps_builder() {
        let deps = SystemDeps::none().run_before("render").run_after("input");
        assert_eq!(deps.before, vec!["render".to_string()]);
        assert_eq!(deps.after, vec!["input".to_string()]);
    }
}
