//! Reactive Runtime
//!
//! The [`Graph`] is the central coordinator that connects state cells,
//! derived cells and effects. It owns the node tables, the tracking stack,
//! the pending-dirty set and the subscriber fan-out for one independent
//! reactive graph.
//!
//! # How It Works
//!
//! 1. Creating a derived cell or an effect evaluates it once inside a
//!    tracking frame; the ids it reads become its dependency set.
//!
//! 2. Writing a state cell stores the value, marks the id dirty and asks the
//!    wave scheduler for a wave (once per burst of writes).
//!
//! 3. When the wave runs, the propagator revisits the affected derived cells
//!    and effects in dependency order, then notifies subscribers of every
//!    cell that changed.
//!
//! # Threading
//!
//! A graph is single threaded: handles are `!Send` and nothing is locked.
//! Independent graphs can live side by side, one per thread or one per test.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use super::context::Tracker;
use super::derived::{Derived, DerivedSlot};
use super::effect::{EffectHandle, IntoCleanup};
use super::equality::{Equality, SameValue};
use super::state::{State, StateSlot};
use super::subscriber::{Subscription, SubscriptionRegistry};
use super::wave::{ManualScheduler, Wave, WaveReport, WaveScheduler};
use crate::error::Result;
use crate::graph::registry::{EffectFn, Registry};
use crate::graph::{NodeId, NodeKind};

/// Tunables for a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphConfig {
    /// Upper bound on passes per wave. Each pass handles the writes made by
    /// recomputation bodies during the previous one; a body that keeps
    /// writing a cell it depends on would otherwise never settle.
    pub max_passes_per_wave: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_passes_per_wave: 100,
        }
    }
}

/// Shared state behind a [`Graph`] and its handles.
pub(crate) struct Inner {
    pub(crate) registry: RefCell<Registry>,
    pub(crate) tracker: Tracker,
    pub(crate) subscriptions: RefCell<SubscriptionRegistry>,

    /// Ids dirtied since the last pass started, in write order.
    pub(crate) pending: RefCell<IndexSet<NodeId>>,
    pub(crate) wave_scheduled: Cell<bool>,
    pub(crate) wave_running: Cell<bool>,

    /// Step of the node being visited in the current pass; 0 outside one.
    pub(crate) pass_step: Cell<usize>,
    /// Derived cells and effects created during the current pass, with the
    /// step that created them.
    pub(crate) created_in_pass: RefCell<IndexMap<NodeId, usize>>,

    pub(crate) config: GraphConfig,
    scheduler: Box<dyn WaveScheduler>,
    this: Weak<Inner>,
}

impl Inner {
    /// Ask the scheduler for a wave unless one is already pending or
    /// running. A running wave picks up new dirty ids in its next pass.
    pub(crate) fn schedule_wave(&self) {
        if self.wave_running.get() || self.wave_scheduled.get() {
            return;
        }
        self.wave_scheduled.set(true);
        debug!(pending = self.pending.borrow().len(), "scheduling wave");
        self.scheduler.schedule(Wave::new(self.this.clone()));
    }

    /// Remember a node created while a pass runs. Its first evaluation may
    /// have read cells the pass had not reached yet.
    pub(crate) fn note_created(&self, id: NodeId) {
        if self.wave_running.get() {
            self.created_in_pass
                .borrow_mut()
                .insert(id, self.pass_step.get());
        }
    }

    pub(crate) fn weak(&self) -> Weak<Inner> {
        self.this.clone()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for cleanup in self.registry.get_mut().clear() {
            cleanup.run();
        }
    }
}

/// Builder for a [`Graph`] with a custom scheduler or configuration.
///
/// # Example
///
/// ```
/// use runes_core::reactive::{Graph, ManualScheduler};
///
/// let graph = Graph::builder()
///     .scheduler(ManualScheduler)
///     .max_passes_per_wave(10)
///     .build();
/// assert_eq!(graph.config().max_passes_per_wave, 10);
/// ```
pub struct GraphBuilder {
    config: GraphConfig,
    scheduler: Box<dyn WaveScheduler>,
}

impl GraphBuilder {
    /// Use `scheduler` to decide when waves run.
    pub fn scheduler(mut self, scheduler: impl WaveScheduler + 'static) -> Self {
        self.scheduler = Box::new(scheduler);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: GraphConfig) -> Self {
        self.config = config;
        self
    }

    /// Cap the number of passes per wave (at least one).
    pub fn max_passes_per_wave(mut self, passes: usize) -> Self {
        self.config.max_passes_per_wave = passes;
        self
    }

    /// Create the graph.
    pub fn build(self) -> Graph {
        let mut config = self.config;
        config.max_passes_per_wave = config.max_passes_per_wave.max(1);
        let scheduler = self.scheduler;

        let inner = Rc::new_cyclic(|this| Inner {
            registry: RefCell::new(Registry::new()),
            tracker: Tracker::new(),
            subscriptions: RefCell::new(SubscriptionRegistry::new()),
            pending: RefCell::new(IndexSet::new()),
            wave_scheduled: Cell::new(false),
            wave_running: Cell::new(false),
            pass_step: Cell::new(0),
            created_in_pass: RefCell::new(IndexMap::new()),
            config,
            scheduler,
            this: this.clone(),
        });
        Graph { inner }
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self {
            config: GraphConfig::default(),
            scheduler: Box::new(ManualScheduler),
        }
    }
}

/// One reactive graph.
///
/// Cloning a `Graph` is cheap and yields another handle to the same graph.
/// Cell handles only hold weak references, so dropping the last `Graph`
/// tears everything down: outstanding effect cleanups run and later reads
/// through old handles report [`GraphError::GraphDropped`].
///
/// # Example
///
/// ```
/// use runes_core::reactive::Graph;
///
/// let graph = Graph::new();
/// let count = graph.state(0);
/// let doubled = graph.derived({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// count.set(5);
/// assert_eq!(doubled.get(), 0); // not propagated yet
///
/// graph.flush().unwrap();
/// assert_eq!(doubled.get(), 10);
/// ```
///
/// [`GraphError::GraphDropped`]: crate::GraphError::GraphDropped
#[derive(Clone)]
pub struct Graph {
    inner: Rc<Inner>,
}

impl Graph {
    /// Create a graph with the [`ManualScheduler`] and default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start building a graph.
    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    pub(crate) fn downgrade(&self) -> Weak<Inner> {
        self.inner.weak()
    }

    /// The configuration this graph was built with.
    pub fn config(&self) -> &GraphConfig {
        &self.inner.config
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Create a state cell compared with [`SameValue`].
    pub fn state<T>(&self, initial: T) -> State<T>
    where
        T: SameValue + 'static,
    {
        self.state_with(initial, Equality::same_value())
    }

    /// Create a state cell with a custom equality policy.
    pub fn state_with<T: 'static>(&self, initial: T, equals: Equality<T>) -> State<T> {
        let id = NodeId::next();
        self.inner.registry.borrow_mut().insert_state(
            id,
            Box::new(StateSlot {
                value: initial,
                equals,
            }),
        );
        State::new(id, self.inner.weak())
    }

    /// Create a derived cell compared with [`SameValue`].
    ///
    /// `compute` runs once right away to seed the value and dependencies.
    pub fn derived<T, F>(&self, compute: F) -> Derived<T>
    where
        T: SameValue + 'static,
        F: Fn() -> T + 'static,
    {
        self.derived_with(compute, Equality::same_value())
    }

    /// Create a derived cell with a custom equality policy.
    pub fn derived_with<T, F>(&self, compute: F, equals: Equality<T>) -> Derived<T>
    where
        T: 'static,
        F: Fn() -> T + 'static,
    {
        let id = NodeId::next();
        let (value, dependencies) = self.inner.tracker.run_tracked(id, &compute);
        let slot = DerivedSlot::new(Box::new(compute), value, equals);
        self.inner
            .registry
            .borrow_mut()
            .insert_derived(id, Rc::new(slot), dependencies);
        self.inner.note_created(id);
        Derived::new(id, self.inner.weak())
    }

    /// Register an effect and run it once right away.
    ///
    /// The body may return a [`Cleanup`](super::Cleanup), which runs before
    /// the next re-run and when the effect is disposed.
    ///
    /// A body that captures a clone of this `Graph` keeps the graph alive
    /// through its own node table. Such a graph is never dropped, and its
    /// outstanding cleanups never run, until [`clear`](Self::clear) drops
    /// the body. The same holds for derived cells. Cell handles are weak and
    /// safe to capture.
    pub fn effect<F, R>(&self, run: F) -> EffectHandle
    where
        F: Fn() -> R + 'static,
        R: IntoCleanup,
    {
        let id = NodeId::next();
        let run: EffectFn = Rc::new(move || run().into_cleanup());
        let (cleanup, dependencies) = self.inner.tracker.run_tracked(id, || run());
        self.inner
            .registry
            .borrow_mut()
            .insert_effect(id, run, dependencies, cleanup);
        self.inner.note_created(id);
        EffectHandle::new(id, self.inner.weak())
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    /// Call `callback` after every wave in which `node` changed.
    ///
    /// Any id is accepted, including ids this graph does not know yet.
    pub fn subscribe<F>(&self, node: NodeId, callback: F) -> Subscription
    where
        F: Fn() + 'static,
    {
        let id = self
            .inner
            .subscriptions
            .borrow_mut()
            .insert(node, Rc::new(callback));
        Subscription::new(node, id, self.inner.weak())
    }

    /// Number of callbacks subscribed to `node`.
    pub fn subscriber_count(&self, node: NodeId) -> usize {
        self.inner.subscriptions.borrow().count(node)
    }

    // ------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------

    /// Run `f` without attributing its reads to the evaluation in progress.
    pub fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.tracker.untrack(f)
    }

    /// Check if a read right now would become a dependency.
    pub fn is_tracking(&self) -> bool {
        self.inner.tracker.is_tracking()
    }

    /// The derived cell or effect currently being evaluated, if any.
    pub fn current_owner(&self) -> Option<NodeId> {
        self.inner.tracker.current_owner()
    }

    // ------------------------------------------------------------------
    // Waves
    // ------------------------------------------------------------------

    /// Run the pending wave now.
    ///
    /// Returns an empty report if nothing is pending or if called from
    /// inside a running wave.
    ///
    /// # Errors
    ///
    /// [`GraphError::WaveDidNotSettle`](crate::GraphError::WaveDidNotSettle)
    /// if recomputation bodies kept writing past the pass limit.
    pub fn flush(&self) -> Result<WaveReport> {
        self.inner.flush()
    }

    /// Check if writes are waiting for a wave.
    pub fn has_pending_wave(&self) -> bool {
        self.inner.wave_scheduled.get() || !self.inner.pending.borrow().is_empty()
    }

    /// Drop every node, subscription and pending write.
    ///
    /// Outstanding effect cleanups run in creation order. Handles created
    /// before the call report [`GraphError::UnknownNode`](crate::GraphError::UnknownNode)
    /// afterwards.
    pub fn clear(&self) {
        let cleanups = self.inner.registry.borrow_mut().clear();
        self.inner.pending.borrow_mut().clear();
        self.inner.subscriptions.borrow_mut().clear();
        self.inner.wave_scheduled.set(false);
        debug!(cleanups = cleanups.len(), "graph cleared");
        for cleanup in cleanups {
            cleanup.run();
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Number of registered nodes.
    pub fn node_count(&self) -> usize {
        self.inner.registry.borrow().len()
    }

    /// The kind of `node`, or `None` if it is not registered.
    pub fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.inner.registry.borrow().kind(node)
    }

    /// The dependency set from the most recent evaluation of a derived cell
    /// or effect, in first-read order. Empty for state cells.
    pub fn dependencies(&self, node: NodeId) -> Result<Vec<NodeId>> {
        let registry = self.inner.registry.borrow();
        match registry.kind(node) {
            Some(NodeKind::State) => Ok(Vec::new()),
            _ => Ok(registry.dependencies(node)?.iter().copied().collect()),
        }
    }

    /// Capture the shape of the graph: every node, its edges and its
    /// subscriber count.
    pub fn snapshot(&self) -> GraphSnapshot {
        let registry = self.inner.registry.borrow();
        let subscriptions = self.inner.subscriptions.borrow();
        let nodes = registry
            .ids()
            .into_iter()
            .map(|(id, kind)| NodeSnapshot {
                id,
                kind,
                dependencies: registry
                    .dependencies(id)
                    .map(|deps| deps.iter().copied().collect())
                    .unwrap_or_default(),
                subscribers: subscriptions.count(id),
            })
            .collect();
        GraphSnapshot { nodes }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.node_count())
            .field("pending", &self.inner.pending.borrow().len())
            .field("wave_scheduled", &self.inner.wave_scheduled.get())
            .field("wave_running", &self.inner.wave_running.get())
            .finish()
    }
}

/// Shape of a graph at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GraphSnapshot {
    /// States, then derived cells, then effects, each in creation order.
    pub nodes: Vec<NodeSnapshot>,
}

/// One node of a [`GraphSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Most recent dependency set; empty for state cells.
    pub dependencies: Vec<NodeId>,
    pub subscribers: usize,
}
