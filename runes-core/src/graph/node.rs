//! Graph Nodes
//!
//! Identifiers and kinds for the nodes that live in the reactive graph.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a node in the reactive graph.
///
/// Ids come from a process-wide counter, so they are never reused, not even
/// across independent graphs. A handle presented to the wrong graph therefore
/// reports an unknown node instead of aliasing some other cell. Ids are
/// ordered by creation, which the scheduler uses as its tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(u64);

impl NodeId {
    /// Allocate a fresh id.
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the reactive graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum NodeKind {
    /// A mutable source cell. Roots of the graph: no dependencies.
    State,

    /// A cached value computed from other cells.
    Derived,

    /// A side-effecting subscription. Leaves of the graph: nothing reads them.
    Effect,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeKind::State => "state",
            NodeKind::Derived => "derived",
            NodeKind::Effect => "effect",
        })
    }
}
