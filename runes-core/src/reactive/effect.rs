//! Effects
//!
//! An effect is a side-effecting computation that re-runs whenever the cells
//! it read last time change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs immediately to establish its initial
//!    dependencies.
//!
//! 2. When a wave finds a dependency changed, the effect's outstanding
//!    cleanup runs first, then the body runs again inside a fresh tracking
//!    frame. Its dependencies become whatever that run read.
//!
//! 3. Disposing the effect runs the outstanding cleanup and removes the
//!    node. It never runs again.
//!
//! # Cleanup
//!
//! The body may return a [`Cleanup`]. Returning `()` means there is nothing
//! to undo. Cleanups are one-shot: each runs at most once, either before
//! the next run, on dispose, or when the graph is cleared or dropped.

use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use super::runtime::Inner;
use crate::error::{GraphError, Result};
use crate::graph::NodeId;

/// Teardown returned by an effect body.
pub struct Cleanup(Box<dyn FnOnce()>);

impl Cleanup {
    /// Wrap a teardown function.
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Box::new(f))
    }

    pub(crate) fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cleanup").finish_non_exhaustive()
    }
}

/// Return types an effect body may have.
pub trait IntoCleanup {
    /// Convert into the cleanup to run before the next run, if any.
    fn into_cleanup(self) -> Option<Cleanup>;
}

impl IntoCleanup for () {
    fn into_cleanup(self) -> Option<Cleanup> {
        None
    }
}

impl IntoCleanup for Cleanup {
    fn into_cleanup(self) -> Option<Cleanup> {
        Some(self)
    }
}

impl IntoCleanup for Option<Cleanup> {
    fn into_cleanup(self) -> Option<Cleanup> {
        self
    }
}

/// Handle to an effect.
///
/// Dropping the handle does not stop the effect. Call
/// [`dispose`](Self::dispose).
///
/// # Example
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// use runes_core::reactive::Graph;
///
/// let graph = Graph::new();
/// let count = graph.state(0);
/// let seen = Rc::new(RefCell::new(Vec::new()));
///
/// let effect = graph.effect({
///     let (count, seen) = (count.clone(), Rc::clone(&seen));
///     move || seen.borrow_mut().push(count.get())
/// });
///
/// count.set(1);
/// graph.flush().unwrap();
/// effect.dispose().unwrap();
///
/// count.set(2);
/// graph.flush().unwrap();
/// assert_eq!(*seen.borrow(), vec![0, 1]);
/// ```
pub struct EffectHandle {
    id: NodeId,
    graph: Weak<Inner>,
}

impl EffectHandle {
    pub(crate) fn new(id: NodeId, graph: Weak<Inner>) -> Self {
        Self { id, graph }
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    fn inner(&self) -> Result<Rc<Inner>> {
        self.graph.upgrade().ok_or(GraphError::GraphDropped)
    }

    /// How many times the body has run, the initial run included.
    pub fn run_count(&self) -> Result<usize> {
        self.inner()?.registry.borrow().effect_runs(self.id)
    }

    /// Check if the effect is still registered.
    pub fn is_active(&self) -> bool {
        self.inner()
            .map(|inner| inner.registry.borrow().contains_effect(self.id))
            .unwrap_or(false)
    }

    /// Remove the effect and run its outstanding cleanup.
    ///
    /// # Errors
    ///
    /// [`GraphError::UnknownNode`] if the effect was already disposed or
    /// cleared, [`GraphError::GraphDropped`] if the graph is gone.
    pub fn dispose(self) -> Result<()> {
        let inner = self.inner()?;
        let cleanup = inner.registry.borrow_mut().remove_effect(self.id)?;
        debug!(node = %self.id, "effect disposed");
        if let Some(cleanup) = cleanup {
            cleanup.run();
        }
        Ok(())
    }
}

impl fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectHandle").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::reactive::{Cleanup, Graph};
    use crate::GraphError;

    type Log = Rc<RefCell<Vec<String>>>;

    fn log() -> Log {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn cleanup_runs_before_each_rerun() {
        let graph = Graph::new();
        let count = graph.state(0);
        let events = log();

        let effect = graph.effect({
            let (count, events) = (count.clone(), Rc::clone(&events));
            move || {
                let n = count.get();
                events.borrow_mut().push(format!("run {n}"));
                let events = Rc::clone(&events);
                Cleanup::new(move || events.borrow_mut().push(format!("cleanup {n}")))
            }
        });

        count.set(1);
        graph.flush().unwrap();
        count.set(2);
        graph.flush().unwrap();

        assert_eq!(
            *events.borrow(),
            vec!["run 0", "cleanup 0", "run 1", "cleanup 1", "run 2"]
        );
        assert_eq!(effect.run_count(), Ok(3));
    }

    #[test]
    fn dispose_runs_the_outstanding_cleanup_once() {
        let graph = Graph::new();
        let count = graph.state(0);
        let events = log();

        let effect = graph.effect({
            let (count, events) = (count.clone(), Rc::clone(&events));
            move || {
                count.get();
                let events = Rc::clone(&events);
                Some(Cleanup::new(move || events.borrow_mut().push("cleanup".into())))
            }
        });
        let id = effect.id();
        assert!(effect.is_active());

        effect.dispose().unwrap();
        assert_eq!(*events.borrow(), vec!["cleanup"]);
        assert_eq!(graph.kind(id), None);

        count.set(1);
        let report = graph.flush().unwrap();
        assert!(report.effects_run.is_empty());
        assert_eq!(events.borrow().len(), 1);
    }

    #[test]
    fn disposing_twice_is_an_error() {
        let graph = Graph::new();
        let first = graph.effect(|| {});
        let id = first.id();
        let again = crate::reactive::EffectHandle::new(id, graph.downgrade());

        first.dispose().unwrap();
        assert_eq!(again.dispose(), Err(GraphError::UnknownNode(id)));
    }

    #[test]
    fn effect_without_reads_never_reruns() {
        let graph = Graph::new();
        let count = graph.state(0);
        let effect = graph.effect(|| {});

        count.set(1);
        graph.flush().unwrap();
        assert_eq!(effect.run_count(), Ok(1));
    }

    #[test]
    fn handle_outlives_graph() {
        let graph = Graph::new();
        let effect = graph.effect(|| {});
        drop(graph);

        assert!(!effect.is_active());
        assert_eq!(effect.run_count(), Err(GraphError::GraphDropped));
    }
}
