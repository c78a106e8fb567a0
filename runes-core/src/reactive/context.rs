//! Dependency Tracker
//!
//! The tracker records which cells are read while a derived cell or effect
//! evaluates. Reads are instrumented, not analyzed: every cell accessor calls
//! [`Tracker::track`] before returning its value, and whichever evaluation is
//! innermost on the stack captures the read.
//!
//! # Implementation
//!
//! Each graph owns a stack of frames. Running an evaluation pushes a
//! capturing frame and pops it when the evaluation returns. [`untrack`]
//! pushes a frame that captures nothing. Frames are popped by guards, so
//! the stack stays balanced when a user body panics.
//!
//! Nested evaluations (a derived cell created or recomputed while another
//! one runs) get their own frame and never leak reads into the outer one.
//!
//! [`untrack`]: Tracker::untrack

use std::cell::RefCell;

use smallvec::SmallVec;

use crate::graph::registry::DependencySet;
use crate::graph::NodeId;

/// An entry in the tracking stack.
#[derive(Debug)]
enum Frame {
    /// An evaluation in progress, collecting the ids it reads.
    Capturing {
        owner: NodeId,
        reads: SmallVec<[NodeId; 8]>,
    },

    /// Reads are not attributed to anyone.
    Untracked,
}

/// Per-graph stack of tracking frames.
#[derive(Debug, Default)]
pub(crate) struct Tracker {
    stack: RefCell<Vec<Frame>>,
}

impl Tracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record a read of `id` in the innermost frame, if it captures.
    pub(crate) fn track(&self, id: NodeId) {
        if let Some(Frame::Capturing { reads, .. }) = self.stack.borrow_mut().last_mut() {
            if !reads.contains(&id) {
                reads.push(id);
            }
        }
    }

    /// Check if a read right now would be captured.
    pub(crate) fn is_tracking(&self) -> bool {
        matches!(self.stack.borrow().last(), Some(Frame::Capturing { .. }))
    }

    /// The node whose evaluation would capture a read right now.
    pub(crate) fn current_owner(&self) -> Option<NodeId> {
        match self.stack.borrow().last() {
            Some(Frame::Capturing { owner, .. }) => Some(*owner),
            _ => None,
        }
    }

    /// Run `f` as the evaluation of `owner`, returning its result and the
    /// ids it read.
    pub(crate) fn run_tracked<R>(&self, owner: NodeId, f: impl FnOnce() -> R) -> (R, DependencySet) {
        let guard = self.enter(owner);
        let value = f();
        (value, guard.finish())
    }

    /// Run `f` with reads not attributed to any evaluation.
    pub(crate) fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        self.stack.borrow_mut().push(Frame::Untracked);
        let _guard = PopGuard { tracker: self };
        f()
    }

    fn enter(&self, owner: NodeId) -> TrackingGuard<'_> {
        self.stack.borrow_mut().push(Frame::Capturing {
            owner,
            reads: SmallVec::new(),
        });
        TrackingGuard {
            tracker: self,
            owner,
            finished: false,
        }
    }

    fn pop(&self) -> Option<Frame> {
        self.stack.borrow_mut().pop()
    }
}

/// Pops a capturing frame when dropped.
///
/// The frame is normally consumed by [`TrackingGuard::finish`]; dropping
/// the guard unfinished only happens when the evaluation unwinds.
struct TrackingGuard<'a> {
    tracker: &'a Tracker,
    owner: NodeId,
    finished: bool,
}

impl TrackingGuard<'_> {
    fn finish(mut self) -> DependencySet {
        self.finished = true;
        match self.tracker.pop() {
            Some(Frame::Capturing { owner, reads }) => {
                debug_assert_eq!(
                    owner, self.owner,
                    "tracking frame mismatch: expected {}, got {}",
                    self.owner, owner
                );
                reads.into_iter().collect()
            }
            other => {
                debug_assert!(false, "tracking frame mismatch: expected {}, got {:?}", self.owner, other);
                DependencySet::new()
            }
        }
    }
}

impl Drop for TrackingGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.tracker.pop();
        }
    }
}

struct PopGuard<'a> {
    tracker: &'a Tracker,
}

impl Drop for PopGuard<'_> {
    fn drop(&mut self) {
        self.tracker.pop();
    }
}
