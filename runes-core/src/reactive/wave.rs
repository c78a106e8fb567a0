//! Wave Scheduling
//!
//! A write does not propagate immediately. It marks the cell dirty and, if
//! no wave is pending yet, asks the graph's [`WaveScheduler`] to run one
//! later. Every write that lands before the wave runs joins it, so a burst
//! of writes costs one wave.
//!
//! Two schedulers are provided:
//!
//! - [`ManualScheduler`]: the host calls [`Graph::flush`] at the end of its
//!   own turn (a frame, an event handler, a test step). This is the default.
//! - [`LocalTaskScheduler`]: the wave is spawned on the current tokio
//!   [`LocalSet`](tokio::task::LocalSet) and runs as soon as the task that
//!   wrote yields.
//!
//! [`Graph::flush`]: super::Graph::flush

use std::rc::Weak;

use tracing::{error, trace};

use super::runtime::Inner;
use crate::error::Result;
use crate::graph::NodeId;

/// Decides when a pending wave runs.
pub trait WaveScheduler {
    /// Arrange for `wave` to run after the current turn.
    ///
    /// Called at most once per wave. Dropping the token without running it
    /// is allowed; the wave then runs on the next [`Graph::flush`].
    ///
    /// [`Graph::flush`]: super::Graph::flush
    fn schedule(&self, wave: Wave);
}

/// Token for one scheduled wave.
///
/// A token is not tied to the writes that caused it: running it flushes
/// whatever is pending at that moment. After an explicit
/// [`Graph::flush`] that is usually nothing, but writes made since then
/// are picked up too. Running a token whose graph is gone does nothing.
///
/// [`Graph::flush`]: super::Graph::flush
pub struct Wave {
    graph: Weak<Inner>,
}

impl Wave {
    pub(crate) fn new(graph: Weak<Inner>) -> Self {
        Self { graph }
    }

    /// Run the wave now.
    pub fn run(self) -> Result<WaveReport> {
        match self.graph.upgrade() {
            Some(inner) => inner.flush(),
            None => Ok(WaveReport::default()),
        }
    }
}

/// Leaves pending waves for the host to flush.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualScheduler;

impl WaveScheduler for ManualScheduler {
    fn schedule(&self, _wave: Wave) {
        trace!("wave pending until the next flush");
    }
}

/// Runs each wave as a task on the current tokio `LocalSet`.
///
/// Failures of a deferred wave have no caller to return to; they are
/// logged. Panics from user code surface through the spawned task's
/// `JoinHandle`, which the `LocalSet` reports.
///
/// # Panics
///
/// Scheduling panics when called outside of a `LocalSet`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTaskScheduler;

impl WaveScheduler for LocalTaskScheduler {
    fn schedule(&self, wave: Wave) {
        tokio::task::spawn_local(async move {
            if let Err(err) = wave.run() {
                error!(%err, "deferred wave failed");
            }
        });
    }
}

/// What one wave did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WaveReport {
    /// Number of passes. More than one means recomputation bodies wrote to
    /// state cells while the wave ran.
    pub passes: usize,

    /// Derived cells recomputed, in order. A cell appears at most once per
    /// pass.
    pub recomputed: Vec<NodeId>,

    /// Effects re-run, in order.
    pub effects_run: Vec<NodeId>,

    /// Cells that changed and whose subscribers were notified, in
    /// notification order. Each id appears at most once.
    pub changed: Vec<NodeId>,
}

impl WaveReport {
    /// Check if the wave had nothing to do.
    pub fn is_empty(&self) -> bool {
        self.passes == 0
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::reactive::Graph;

    /// Keeps tokens for the test to run by hand.
    #[derive(Clone, Default)]
    struct Collect(Rc<RefCell<Vec<Wave>>>);

    impl WaveScheduler for Collect {
        fn schedule(&self, wave: Wave) {
            self.0.borrow_mut().push(wave);
        }
    }

    #[test]
    fn one_token_per_burst() {
        let tokens = Collect::default();
        let graph = Graph::builder().scheduler(tokens.clone()).build();
        let a = graph.state(0);

        a.set(1);
        a.set(2);
        assert_eq!(tokens.0.borrow().len(), 1);

        let token = tokens.0.borrow_mut().pop().unwrap();
        let report = token.run().unwrap();
        assert_eq!(report.changed, vec![a.id()]);
    }

    #[test]
    fn token_runs_whatever_is_pending() {
        let tokens = Collect::default();
        let graph = Graph::builder().scheduler(tokens.clone()).build();
        let a = graph.state(0);

        a.set(1);
        graph.flush().unwrap();
        a.set(2);
        assert_eq!(tokens.0.borrow().len(), 2);

        // The first token's own writes were flushed; it picks up the later one.
        let first = tokens.0.borrow_mut().remove(0);
        assert_eq!(first.run().unwrap().changed, vec![a.id()]);

        let second = tokens.0.borrow_mut().remove(0);
        assert!(second.run().unwrap().is_empty());
    }

    #[test]
    fn token_outliving_its_graph_is_inert() {
        let tokens = Collect::default();
        let graph = Graph::builder().scheduler(tokens.clone()).build();
        let a = graph.state(0);
        a.set(1);
        drop(graph);

        let token = tokens.0.borrow_mut().pop().unwrap();
        assert!(token.run().unwrap().is_empty());
    }
}
