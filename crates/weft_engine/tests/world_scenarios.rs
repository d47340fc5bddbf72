//! End-to-end scenarios over the full world runtime.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use weft_foundation::{EntityKey, Key};
use weft_storage::{Component, Entity, RelTarget, Relationship};
use weft_engine::{
    Observer, QuerySpec, SubSystem, System, SystemConfig, SystemDeps, World,
};

#[test]
fn query_and_cache_follow_membership() {
    let mut world = World::new();
    let x = world.key("x");
    let y = world.key("y");

    world.add_entity(Entity::new("a").with_component(Component::tag(x)));
    let b = world.add_entity(
        Entity::new("b")
            .with_component(Component::tag(x))
            .with_component(Component::tag(y)),
    );
    world.add_entity(Entity::new("c").with_component(Component::tag(y)));
    world.reset_cache_stats();

    let result = world.query().with_all([x, y]).execute();
    assert_eq!(result.as_ref(), &[b]);

    world.remove_component(b, y);
    let result = world.query().with_all([x, y]).execute();
    assert!(result.is_empty());

    let stats = world.get_cache_stats();
    assert!(stats.cache_misses >= 2);
    assert_eq!(stats.cache_hits, 0);

    let _ = world.query().with_all([x, y]).execute();
    assert_eq!(world.get_cache_stats().cache_hits, stats.cache_hits + 1);
}

#[derive(Clone)]
struct TickLog(Arc<Mutex<Vec<&'static str>>>);

struct Ordered {
    name: &'static str,
    after: Option<&'static str>,
    log: TickLog,
}

impl System for Ordered {
    fn name(&self) -> &str {
        self.name
    }

    fn deps(&self) -> SystemDeps {
        match self.after {
            Some(name) => SystemDeps::none().run_after(name),
            None => SystemDeps::none(),
        }
    }

    fn config(&self) -> SystemConfig {
        SystemConfig {
            process_empty: true,
            ..SystemConfig::default()
        }
    }

    fn process(&mut self, _world: &mut World, _entity: Option<EntityKey>, _delta: f64) {
        self.log.0.lock().unwrap().push(self.name);
    }
}

#[test]
fn topo_sort_orders_dispatch() {
    let mut world = World::new();
    let log = TickLog(Arc::new(Mutex::new(Vec::new())));

    world
        .add_systems(
            vec![
                Box::new(Ordered {
                    name: "s1",
                    after: Some("s2"),
                    log: log.clone(),
                }),
                Box::new(Ordered {
                    name: "s2",
                    after: None,
                    log: log.clone(),
                }),
            ],
            true,
        )
        .unwrap();

    assert_eq!(world.system_order(""), ["s2", "s1"]);

    world.process(0.016, "");
    assert_eq!(*log.0.lock().unwrap(), ["s2", "s1"]);
}

struct WatchAdds {
    watch: Key,
    require: Vec<Key>,
    fired: Arc<AtomicUsize>,
}

impl Observer for WatchAdds {
    fn name(&self) -> &str {
        "watch-adds"
    }

    fn watch(&self) -> Key {
        self.watch
    }

    fn match_query(&self) -> QuerySpec {
        QuerySpec::new().with_all(self.require.clone())
    }

    fn on_component_added(&mut self, _world: &mut World, _entity: EntityKey, _component: Key) {
        self.fired.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn observer_fires_once_when_match_completes() {
    let mut world = World::new();
    let x = world.key("x");
    let y = world.key("y");
    let fired = Arc::new(AtomicUsize::new(0));
    world.add_observer(Box::new(WatchAdds {
        watch: x,
        require: vec![x, y],
        fired: Arc::clone(&fired),
    }));

    // y is already present when x lands, so the match holds on x-add
    let e = world.add_entity(Entity::new("e"));
    world.add_component(e, Component::tag(y));
    world.add_component(e, Component::tag(x));
    world.process(0.016, "");
    assert_eq!(fired.load(Ordering::Relaxed), 1);

    // Overwriting x never re-notifies the same (entity, component) pair
    world.add_component(e, Component::tag(x));
    world.process(0.016, "");
    assert_eq!(fired.load(Ordering::Relaxed), 1);
}

struct ParallelCounter {
    query_key: Key,
    visits: Arc<AtomicUsize>,
}

impl System for ParallelCounter {
    fn name(&self) -> &str {
        "parallel-counter"
    }

    fn config(&self) -> SystemConfig {
        SystemConfig {
            parallel_processing: true,
            parallel_threshold: 50,
            ..SystemConfig::default()
        }
    }

    fn query(&self) -> QuerySpec {
        QuerySpec::new().with_all([self.query_key])
    }

    fn process_parallel(&self, entity: &mut weft_storage::Entity, _delta: f64) {
        assert!(entity.enabled());
        self.visits.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn parallel_batch_visits_every_entity_once() {
    let mut world = World::new();
    let x = world.key("x");
    for i in 0..200 {
        world.add_entity(Entity::new(&format!("e{i}")).with_component(Component::tag(x)));
    }

    let visits = Arc::new(AtomicUsize::new(0));
    world
        .add_system(
            Box::new(ParallelCounter {
                query_key: x,
                visits: Arc::clone(&visits),
            }),
            false,
        )
        .unwrap();

    // process blocks until every worker joins, so the count is complete
    // the moment it returns
    world.process(0.016, "");
    assert_eq!(visits.load(Ordering::Relaxed), 200);

    world.process(0.016, "");
    assert_eq!(visits.load(Ordering::Relaxed), 400);
}

#[test]
fn duplicate_id_keeps_only_the_second_claimant() {
    let mut world = World::new();
    let x = world.key("x");

    let first = world.add_entity(Entity::new("hero").with_component(Component::tag(x)));
    let second = world.add_entity(Entity::new("hero"));

    assert!(world.entity(first).is_none());
    assert_eq!(world.get_entity_by_id("hero"), Some(second));
    assert_eq!(world.entity_count(), 1);

    // The first claimant's index entries were cleaned with it
    assert!(world.query().with_all([x]).execute().is_empty());

    // Mutating through the stale key is a no-op, not a ghost event
    world.add_component(first, Component::tag(x));
    assert!(world.query().with_all([x]).execute().is_empty());
}

#[test]
fn relationships_index_forward_and_reverse() {
    let mut world = World::new();
    let owns = world.key("owns");

    let e = world.add_entity(Entity::new("e"));
    let t = world.add_entity(Entity::new("t"));

    world.add_relationship(
        e,
        Relationship::new(Component::tag(owns), Some(RelTarget::Entity(t))),
    );
    assert_eq!(world.sources_of(owns), vec![e]);
    assert_eq!(world.targets_of(owns), vec![t]);

    world.remove_relationship(e, owns, Some(RelTarget::Entity(t)));
    assert!(world.sources_of(owns).is_empty());
    assert!(world.targets_of(owns).is_empty());
    // Removing again stays a quiet no-op
    assert!(!world.remove_relationship(e, owns, Some(RelTarget::Entity(t))));

    // A freed target only reaches the forward index
    let ghost = world.add_entity(Entity::new("ghost"));
    world.remove_entity(ghost);
    world.add_relationship(
        e,
        Relationship::new(Component::tag(owns), Some(RelTarget::Entity(ghost))),
    );
    assert_eq!(world.sources_of(owns), vec![e]);
    assert!(world.targets_of(owns).is_empty());
}

struct TwoPhase {
    solid: Key,
    ghost: Key,
    log: Arc<Mutex<Vec<String>>>,
}

impl System for TwoPhase {
    fn name(&self) -> &str {
        "two-phase"
    }

    fn sub_systems(&mut self, _world: &mut World) -> Vec<SubSystem> {
        let solid_log = Arc::clone(&self.log);
        let ghost_log = Arc::clone(&self.log);
        vec![
            SubSystem::new(
                QuerySpec::new().with_all([self.solid]),
                move |world, entities, _delta| {
                    for &entity in entities {
                        let id = world.entity(entity).unwrap().id().to_string();
                        solid_log.lock().unwrap().push(format!("solid {id}"));
                    }
                },
            ),
            SubSystem::new_batched(
                QuerySpec::new().with_all([self.ghost]),
                move |_world, entities, _delta| {
                    ghost_log.lock().unwrap().push(format!("ghosts {}", entities.len()));
                },
            ),
        ]
    }
}

#[test]
fn subsystem_driver_runs_tuples_in_order() {
    let mut world = World::new();
    let solid = world.key("solid");
    let ghost = world.key("ghost");

    world.add_entity(Entity::new("wall").with_component(Component::tag(solid)));
    world.add_entity(Entity::new("spirit").with_component(Component::tag(ghost)));

    let log = Arc::new(Mutex::new(Vec::new()));
    world
        .add_system(
            Box::new(TwoPhase {
                solid,
                ghost,
                log: Arc::clone(&log),
            }),
            false,
        )
        .unwrap();

    world.process(0.016, "");
    assert_eq!(*log.lock().unwrap(), ["solid wall", "ghosts 1"]);
}
