//! System registry and dispatch ordering.
//!
//! Systems are grouped by a string tag; each group holds an ordered list.
//! Topological sorting orders a group by the systems' declared
//! before/after constraints, breaking ties by insertion order and
//! rejecting cycles.

use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;
use weft_foundation::{Error, Result};

use crate::query::QuerySpec;
use crate::system::{SubSystem, System, SystemConfig};

/// A registered system plus its runtime state.
///
/// The boxed system and the memoized subsystem list are `Option`s so the
/// dispatch loop can vacate them while the system runs against the world.
pub struct SystemEntry {
    pub(crate) name: String,
    pub(crate) config: SystemConfig,
    pub(crate) paused: bool,
    pub(crate) system: Option<Box<dyn System>>,
    /// Lazily memoized query spec.
    pub(crate) query: Option<QuerySpec>,
    /// Lazily fetched subsystem tuples.
    pub(crate) subsystems: Option<Vec<SubSystem>>,
    /// Set once `sub_systems()` has signalled "none".
    pub(crate) single_query: bool,
}

impl SystemEntry {
    pub(crate) fn new(system: Box<dyn System>) -> Self {
        Self {
            name: system.name().to_string(),
            config: system.config(),
            paused: false,
            system: Some(system),
            query: None,
            subsystems: None,
            single_query: false,
        }
    }

    /// Returns the system's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the system's registration config.
    #[must_use]
    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// Returns true if the entry is currently paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

impl std::fmt::Debug for SystemEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemEntry")
            .field("name", &self.name)
            .field("group", &self.config.group)
            .field("paused", &self.paused)
            .field("single_query", &self.single_query)
            .finish_non_exhaustive()
    }
}

/// Parts of an entry vacated for the duration of one dispatch.
pub(crate) struct DispatchSlot {
    pub(crate) name: String,
    pub(crate) config: SystemConfig,
    pub(crate) system: Box<dyn System>,
    pub(crate) query: Option<QuerySpec>,
    pub(crate) subsystems: Option<Vec<SubSystem>>,
    pub(crate) single_query: bool,
}

/// Group-keyed system registry with dependency ordering.
#[derive(Default)]
pub struct Scheduler {
    groups: IndexMap<String, Vec<SystemEntry>>,
}

impl Scheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a system to its group.
    pub fn add(&mut self, entry: SystemEntry) {
        self.groups
            .entry(entry.config.group.clone())
            .or_default()
            .push(entry);
    }

    /// Removes a system by name, deleting its group when it empties.
    pub fn remove(&mut self, name: &str) -> Option<SystemEntry> {
        let mut removed = None;
        self.groups.retain(|_, entries| {
            if removed.is_none() {
                if let Some(pos) = entries.iter().position(|e| e.name == name) {
                    removed = Some(entries.remove(pos));
                }
            }
            !entries.is_empty()
        });
        removed
    }

    /// Returns true if any group holds a system with the given name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.groups
            .values()
            .any(|entries| entries.iter().any(|e| e.name == name))
    }

    /// Returns the number of systems in a group.
    #[must_use]
    pub fn group_len(&self, group: &str) -> usize {
        self.groups.get(group).map_or(0, Vec::len)
    }

    /// Returns the system names of a group, in dispatch order.
    #[must_use]
    pub fn group_order(&self, group: &str) -> Vec<String> {
        self.groups
            .get(group)
            .map(|entries| entries.iter().map(|e| e.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Returns the names of all registered systems across groups.
    #[must_use]
    pub fn system_names(&self) -> Vec<String> {
        self.groups
            .values()
            .flat_map(|entries| entries.iter().map(|e| e.name.clone()))
            .collect()
    }

    /// Returns the total number of registered systems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Returns true if no systems are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub(crate) fn entry_mut(&mut self, name: &str) -> Option<&mut SystemEntry> {
        self.groups
            .values_mut()
            .flat_map(|entries| entries.iter_mut())
            .find(|e| e.name == name)
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = &mut SystemEntry> {
        self.groups.values_mut().flat_map(|entries| entries.iter_mut())
    }

    /// Vacates the entry at `group[index]` for dispatch, returning `None`
    /// for inactive, paused, or already-vacated entries.
    pub(crate) fn begin_dispatch(&mut self, group: &str, index: usize) -> Option<DispatchSlot> {
        let entry = self.groups.get_mut(group)?.get_mut(index)?;
        if !entry.config.active || entry.paused {
            return None;
        }
        let system = entry.system.take()?;
        Some(DispatchSlot {
            name: entry.name.clone(),
            config: entry.config.clone(),
            system,
            query: entry.query.take(),
            subsystems: entry.subsystems.take(),
            single_query: entry.single_query,
        })
    }

    /// Restores a vacated entry after dispatch.
    ///
    /// The entry is located by name rather than index: the system may
    /// have removed or reordered systems while it ran. A slot whose entry
    /// vanished is dropped.
    pub(crate) fn end_dispatch(&mut self, slot: DispatchSlot) {
        let Some(entry) = self.entry_mut(&slot.name) else {
            tracing::warn!(system = %slot.name, "system removed during its own dispatch");
            return;
        };
        entry.system = Some(slot.system);
        entry.query = slot.query;
        entry.subsystems = slot.subsystems;
        entry.single_query = slot.single_query;
    }

    /// Topologically sorts every group by the systems' declared
    /// before/after constraints.
    ///
    /// Ties are broken by insertion order. Dependencies naming systems
    /// outside the group are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`weft_foundation::ErrorKind::DependencyCycle`] when a
    /// group's constraints form a cycle; the group is left unsorted.
    pub fn sort(&mut self) -> Result<()> {
        for (group, entries) in &mut self.groups {
            Self::sort_group(group, entries)?;
        }
        Ok(())
    }

    fn sort_group(group: &str, entries: &mut Vec<SystemEntry>) -> Result<()> {
        let n = entries.len();
        if n < 2 {
            return Ok(());
        }

        let index_of: HashMap<String, usize> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.clone(), i))
            .collect();

        // adjacency[u] holds v-edges meaning "u runs before v"
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut indegree = vec![0usize; n];
        for (i, entry) in entries.iter().enumerate() {
            let Some(system) = entry.system.as_ref() else {
                continue;
            };
            let deps = system.deps();
            for name in &deps.before {
                if let Some(&j) = index_of.get(name) {
                    adjacency[i].push(j);
                    indegree[j] += 1;
                }
            }
            for name in &deps.after {
                if let Some(&j) = index_of.get(name) {
                    adjacency[j].push(i);
                    indegree[i] += 1;
                }
            }
        }

        // Kahn's algorithm; the BTreeSet keeps ready systems in insertion
        // order so unconstrained pairs never reorder.
        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(&i) = ready.iter().next() {
            ready.remove(&i);
            order.push(i);
            for &j in &adjacency[i] {
                indegree[j] -= 1;
                if indegree[j] == 0 {
                    ready.insert(j);
                }
            }
        }

        if order.len() != n {
            let stuck: Vec<String> = (0..n)
                .filter(|i| !order.contains(i))
                .map(|i| entries[i].name.clone())
                .collect();
            return Err(Error::dependency_cycle(group, stuck));
        }

        let mut slots: Vec<Option<SystemEntry>> = entries.drain(..).map(Some).collect();
        entries.extend(order.into_iter().map(|i| slots[i].take().expect("sorted index used once")));
        Ok(())
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.groups.iter().map(|(g, entries)| {
                (g, entries.iter().map(SystemEntry::name).collect::<Vec<_>>())
            }))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::SystemDeps;
    use crate::world::World;
    use weft_foundation::{EntityKey, ErrorKind};

    struct Named {
        name: &'static str,
        deps: SystemDeps,
    }

    impl Named {
        fn boxed(name: &'static str, deps: SystemDeps) -> Box<dyn System> {
            Box::new(Self { name, deps })
        }
    }

    impl System for Named {
        fn name(&self) -> &str {
            self.name
        }

        fn deps(&self) -> SystemDeps {
            self.deps.clone()
        }

        fn process(&mut self, _world: &mut World, _entity: Option<EntityKey>, _delta: f64) {}
    }

    fn scheduler_with(systems: Vec<Box<dyn System>>) -> Scheduler {
        let mut scheduler = Scheduler::new();
        for system in systems {
            scheduler.add(SystemEntry::new(system));
        }
        scheduler
    }

    #[test]
    fn insertion_order_without_deps() {
        let mut scheduler = scheduler_with(vec![
            Named::boxed("a", SystemDeps::none()),
            Named::boxed("b", SystemDeps::none()),
            Named::boxed("c", SystemDeps::none()),
        ]);
        scheduler.sort().unwrap();
        assert_eq!(scheduler.group_order(""), ["a", "b", "c"]);
    }

    #[test]
    fn after_constraint_reorders() {
        let mut scheduler = scheduler_with(vec![
            Named::boxed("s1", SystemDeps::none().run_after("s2")),
            Named::boxed("s2", SystemDeps::none()),
        ]);
        scheduler.sort().unwrap();
        assert_eq!(scheduler.group_order(""), ["s2", "s1"]);
    }

    #[test]
    fn before_constraint_reorders() {
        let mut scheduler = scheduler_with(vec![
            Named::boxed("a", SystemDeps::none()),
            Named::boxed("z", SystemDeps::none().run_before("a")),
        ]);
        scheduler.sort().unwrap();
        assert_eq!(scheduler.group_order(""), ["z", "a"]);
    }

    #[test]
    fn chain_is_fully_ordered() {
        let mut scheduler = scheduler_with(vec![
            Named::boxed("c", SystemDeps::none().run_after("b")),
            Named::boxed("b", SystemDeps::none().run_after("a")),
            Named::boxed("a", SystemDeps::none()),
        ]);
        scheduler.sort().unwrap();
        assert_eq!(scheduler.group_order(""), ["a", "b", "c"]);
    }

    #[test]
    fn cycle_is_rejected() {
        let mut scheduler = scheduler_with(vec![
            Named::boxed("a", SystemDeps::none().run_after("b")),
            Named::boxed("b", SystemDeps::none().run_after("a")),
        ]);
        let err = scheduler.sort().unwrap_err();
        assert!(matches!(err.kind, ErrorKind::DependencyCycle { .. }));
    }

    #[test]
    fn unknown_dep_names_are_ignored() {
        let mut scheduler = scheduler_with(vec![Named::boxed(
            "a",
            SystemDeps::none().run_after("never-registered"),
        )]);
        scheduler.sort().unwrap();
        assert_eq!(scheduler.group_order(""), ["a"]);
    }

    #[test]
    fn remove_deletes_empty_group() {
        let mut scheduler = scheduler_with(vec![Named::boxed("only", SystemDeps::none())]);
        assert!(scheduler.remove("only").is_some());
        assert!(scheduler.is_empty());
        assert!(scheduler.remove("only").is_none());
    }
}
