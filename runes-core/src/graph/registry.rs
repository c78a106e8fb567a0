//! Node Registry
//!
//! The canonical tables of state cells, derived cells and effects for one
//! graph. Tables are insertion ordered, so iterating them walks nodes in
//! creation order.
//!
//! The registry only stores type-erased entries. Typed access lives in the
//! handles (`State<T>`, `Derived<T>`), which downcast the slots they own.
//!
//! Nothing in here runs user code. Callers clone what they need out of the
//! registry and release the borrow before invoking a derived body or an
//! effect, since those bodies read the registry again.

use std::any::Any;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use super::node::{NodeId, NodeKind};
use super::scheduler::UpdateScheduler;
use crate::error::{GraphError, Result};
use crate::reactive::Cleanup;

/// Ids read during one evaluation, in first-read order.
pub(crate) type DependencySet = IndexSet<NodeId>;

/// Type-erased effect body. Returns the cleanup to run before the next run.
pub(crate) type EffectFn = Rc<dyn Fn() -> Option<Cleanup>>;

/// A derived cell with its value type erased.
pub(crate) trait DerivedCell {
    /// Re-run the computation and store the result.
    ///
    /// Returns `true` if the cell's equality policy considers the new value
    /// a change.
    fn recompute(&self) -> bool;

    /// Access the concrete cell for downcasting.
    fn as_any(&self) -> &dyn Any;
}

struct DerivedEntry {
    cell: Rc<dyn DerivedCell>,
    dependencies: DependencySet,
}

struct EffectEntry {
    run: EffectFn,
    dependencies: DependencySet,
    cleanup: Option<Cleanup>,
    runs: usize,
}

/// Tables for every node of a graph.
#[derive(Default)]
pub(crate) struct Registry {
    states: IndexMap<NodeId, Box<dyn Any>>,
    deriveds: IndexMap<NodeId, DerivedEntry>,
    effects: IndexMap<NodeId, EffectEntry>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Which table `id` lives in, if any.
    pub(crate) fn kind(&self, id: NodeId) -> Option<NodeKind> {
        if self.states.contains_key(&id) {
            Some(NodeKind::State)
        } else if self.deriveds.contains_key(&id) {
            Some(NodeKind::Derived)
        } else if self.effects.contains_key(&id) {
            Some(NodeKind::Effect)
        } else {
            None
        }
    }

    /// Total number of registered nodes.
    pub(crate) fn len(&self) -> usize {
        self.states.len() + self.deriveds.len() + self.effects.len()
    }

    /// Every registered id with its kind: states, then derived cells, then
    /// effects, each in creation order.
    pub(crate) fn ids(&self) -> Vec<(NodeId, NodeKind)> {
        self.states
            .keys()
            .map(|id| (*id, NodeKind::State))
            .chain(self.deriveds.keys().map(|id| (*id, NodeKind::Derived)))
            .chain(self.effects.keys().map(|id| (*id, NodeKind::Effect)))
            .collect()
    }

    fn lookup_error(&self, id: NodeId, expected: NodeKind) -> GraphError {
        match self.kind(id) {
            Some(actual) => GraphError::KindMismatch {
                id,
                expected,
                actual,
            },
            None => GraphError::UnknownNode(id),
        }
    }

    // ------------------------------------------------------------------
    // State cells
    // ------------------------------------------------------------------

    pub(crate) fn insert_state(&mut self, id: NodeId, slot: Box<dyn Any>) {
        self.states.insert(id, slot);
    }

    pub(crate) fn state(&self, id: NodeId) -> Result<&dyn Any> {
        match self.states.get(&id) {
            Some(slot) => Ok(slot.as_ref()),
            None => Err(self.lookup_error(id, NodeKind::State)),
        }
    }

    pub(crate) fn state_mut(&mut self, id: NodeId) -> Result<&mut dyn Any> {
        if !self.states.contains_key(&id) {
            return Err(self.lookup_error(id, NodeKind::State));
        }
        match self.states.get_mut(&id) {
            Some(slot) => Ok(slot.as_mut()),
            None => Err(GraphError::UnknownNode(id)),
        }
    }

    // ------------------------------------------------------------------
    // Derived cells
    // ------------------------------------------------------------------

    pub(crate) fn insert_derived(
        &mut self,
        id: NodeId,
        cell: Rc<dyn DerivedCell>,
        dependencies: DependencySet,
    ) {
        self.deriveds.insert(id, DerivedEntry { cell, dependencies });
    }

    pub(crate) fn derived(&self, id: NodeId) -> Result<Rc<dyn DerivedCell>> {
        match self.deriveds.get(&id) {
            Some(entry) => Ok(Rc::clone(&entry.cell)),
            None => Err(self.lookup_error(id, NodeKind::Derived)),
        }
    }

    /// Replace the dependency set of a derived cell after a recomputation.
    pub(crate) fn set_dependencies(&mut self, id: NodeId, dependencies: DependencySet) {
        if let Some(entry) = self.deriveds.get_mut(&id) {
            entry.dependencies = dependencies;
        }
    }

    // ------------------------------------------------------------------
    // Effects
    // ------------------------------------------------------------------

    pub(crate) fn insert_effect(
        &mut self,
        id: NodeId,
        run: EffectFn,
        dependencies: DependencySet,
        cleanup: Option<Cleanup>,
    ) {
        self.effects.insert(
            id,
            EffectEntry {
                run,
                dependencies,
                cleanup,
                runs: 1,
            },
        );
    }

    /// Take what is needed to re-run an effect: its body and its
    /// outstanding cleanup, which the caller must run first.
    pub(crate) fn begin_effect_run(&mut self, id: NodeId) -> Option<(EffectFn, Option<Cleanup>)> {
        self.effects
            .get_mut(&id)
            .map(|entry| (Rc::clone(&entry.run), entry.cleanup.take()))
    }

    pub(crate) fn contains_effect(&self, id: NodeId) -> bool {
        self.effects.contains_key(&id)
    }

    /// Store the results of an effect run.
    ///
    /// If the effect was disposed while it ran, the new cleanup is handed
    /// back so the caller can run it right away.
    pub(crate) fn finish_effect_run(
        &mut self,
        id: NodeId,
        dependencies: DependencySet,
        cleanup: Option<Cleanup>,
    ) -> Option<Cleanup> {
        match self.effects.get_mut(&id) {
            Some(entry) => {
                entry.dependencies = dependencies;
                entry.cleanup = cleanup;
                entry.runs += 1;
                None
            }
            None => cleanup,
        }
    }

    /// Remove an effect, returning its outstanding cleanup.
    pub(crate) fn remove_effect(&mut self, id: NodeId) -> Result<Option<Cleanup>> {
        match self.effects.shift_remove(&id) {
            Some(entry) => Ok(entry.cleanup),
            None => Err(self.lookup_error(id, NodeKind::Effect)),
        }
    }

    pub(crate) fn effect_runs(&self, id: NodeId) -> Result<usize> {
        match self.effects.get(&id) {
            Some(entry) => Ok(entry.runs),
            None => Err(self.lookup_error(id, NodeKind::Effect)),
        }
    }

    // ------------------------------------------------------------------
    // Edges
    // ------------------------------------------------------------------

    /// The dependency set recorded by the most recent evaluation of a
    /// derived cell or effect. State cells have none.
    pub(crate) fn dependencies(&self, id: NodeId) -> Result<&DependencySet> {
        if let Some(entry) = self.deriveds.get(&id) {
            return Ok(&entry.dependencies);
        }
        if let Some(entry) = self.effects.get(&id) {
            return Ok(&entry.dependencies);
        }
        Err(GraphError::UnknownNode(id))
    }

    /// Derived cells and effects whose current dependency set contains `id`.
    pub(crate) fn dependents_of(&self, id: NodeId) -> Vec<NodeId> {
        let deriveds = self
            .deriveds
            .iter()
            .filter(|(_, entry)| entry.dependencies.contains(&id))
            .map(|(dependent, _)| *dependent);
        let effects = self
            .effects
            .iter()
            .filter(|(_, entry)| entry.dependencies.contains(&id))
            .map(|(dependent, _)| *dependent);
        deriveds.chain(effects).collect()
    }

    /// Build a scheduler over the current edges.
    pub(crate) fn scheduler(&self) -> UpdateScheduler {
        let mut scheduler = UpdateScheduler::new();
        for (id, entry) in &self.deriveds {
            scheduler.add_node(*id, entry.dependencies.iter().copied());
        }
        for (id, entry) in &self.effects {
            scheduler.add_node(*id, entry.dependencies.iter().copied());
        }
        scheduler
    }

    /// Drop every node, returning the outstanding effect cleanups in
    /// creation order.
    pub(crate) fn clear(&mut self) -> Vec<Cleanup> {
        self.states.clear();
        self.deriveds.clear();
        self.effects
            .drain(..)
            .filter_map(|(_, entry)| entry.cleanup)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Constant;

    impl DerivedCell for Constant {
        fn recompute(&self) -> bool {
            false
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn deps(ids: &[NodeId]) -> DependencySet {
        ids.iter().copied().collect()
    }

    #[test]
    fn kinds_and_lookup_errors() {
        let mut registry = Registry::new();
        let state = NodeId::next();
        let derived = NodeId::next();

        registry.insert_state(state, Box::new(1_i32));
        registry.insert_derived(derived, Rc::new(Constant), deps(&[state]));

        assert_eq!(registry.kind(state), Some(NodeKind::State));
        assert_eq!(registry.kind(derived), Some(NodeKind::Derived));
        assert_eq!(registry.len(), 2);

        assert_eq!(
            registry.state(derived).err(),
            Some(GraphError::KindMismatch {
                id: derived,
                expected: NodeKind::State,
                actual: NodeKind::Derived,
            })
        );

        let missing = NodeId::next();
        assert_eq!(registry.derived(missing).err(), Some(GraphError::UnknownNode(missing)));
    }

    #[test]
    fn dependents_follow_current_edges() {
        let mut registry = Registry::new();
        let a = NodeId::next();
        let b = NodeId::next();
        let d = NodeId::next();

        registry.insert_state(a, Box::new(0_i32));
        registry.insert_state(b, Box::new(0_i32));
        registry.insert_derived(d, Rc::new(Constant), deps(&[a]));

        assert_eq!(registry.dependents_of(a), vec![d]);
        assert!(registry.dependents_of(b).is_empty());

        registry.set_dependencies(d, deps(&[b]));
        assert!(registry.dependents_of(a).is_empty());
        assert_eq!(registry.dependents_of(b), vec![d]);
    }

    #[test]
    fn effect_run_bookkeeping() {
        let mut registry = Registry::new();
        let effect = NodeId::next();
        let cleaned = Rc::new(Cell::new(0));

        let counter = Rc::clone(&cleaned);
        let run: EffectFn = Rc::new(move || {
            let counter = Rc::clone(&counter);
            Some(Cleanup::new(move || counter.set(counter.get() + 1)))
        });
        let first = run();
        registry.insert_effect(effect, run, DependencySet::new(), first);

        let (run, cleanup) = registry.begin_effect_run(effect).expect("effect registered");
        cleanup.expect("first run left a cleanup").run();
        assert_eq!(cleaned.get(), 1);

        assert!(registry.finish_effect_run(effect, DependencySet::new(), run()).is_none());
        assert_eq!(registry.effect_runs(effect), Ok(2));

        let outstanding = registry.remove_effect(effect).expect("effect registered");
        assert!(outstanding.is_some());
        assert!(!registry.contains_effect(effect));
        assert_eq!(registry.remove_effect(effect).err(), Some(GraphError::UnknownNode(effect)));
    }

    #[test]
    fn finishing_a_removed_effect_returns_its_cleanup() {
        let mut registry = Registry::new();
        let effect = NodeId::next();
        let leftover = registry.finish_effect_run(effect, DependencySet::new(), Some(Cleanup::new(|| {})));
        assert!(leftover.is_some());
    }

    #[test]
    fn clear_returns_outstanding_cleanups() {
        let mut registry = Registry::new();
        let with_cleanup = NodeId::next();
        let without_cleanup = NodeId::next();

        registry.insert_state(NodeId::next(), Box::new(()));
        registry.insert_effect(
            with_cleanup,
            Rc::new(|| None),
            DependencySet::new(),
            Some(Cleanup::new(|| {})),
        );
        registry.insert_effect(without_cleanup, Rc::new(|| None), DependencySet::new(), None);

        let cleanups = registry.clear();
        assert_eq!(cleanups.len(), 1);
        assert_eq!(registry.len(), 0);
    }
}
