//! Error types for graph operations.
//!
//! User code that panics inside a derived body, an effect, an equality
//! predicate or a subscriber is never caught: the panic unwinds out of the
//! call that triggered it. The variants here cover misuse of the graph itself.

use thiserror::Error;

use crate::graph::{NodeId, NodeKind};

/// Errors reported by the reactive graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The id is not registered in this graph (never created here, or the
    /// graph was cleared since).
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    /// The id exists but names a different kind of node.
    #[error("node {id} is a {actual} node, expected a {expected} node")]
    KindMismatch {
        /// The node that was looked up.
        id: NodeId,
        /// The kind the caller asked for.
        expected: NodeKind,
        /// The kind actually registered.
        actual: NodeKind,
    },

    /// The node holds a value of a different Rust type than the handle.
    #[error("node {0} holds a value of a different type")]
    TypeMismatch(NodeId),

    /// The graph owning this handle has been dropped.
    #[error("the owning graph has been dropped")]
    GraphDropped,

    /// Writes kept landing during the wave and it never reached a fixpoint.
    #[error("wave did not settle after {passes} passes")]
    WaveDidNotSettle {
        /// Number of passes executed before giving up.
        passes: usize,
    },
}

/// Result type for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;

impl GraphError {
    /// Check if this error means the node could not be found.
    pub fn is_unknown_node(&self) -> bool {
        matches!(self, GraphError::UnknownNode(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_node() {
        let id = NodeId::from(7);
        assert_eq!(GraphError::UnknownNode(id).to_string(), "unknown node: #7");

        let err = GraphError::KindMismatch {
            id,
            expected: NodeKind::State,
            actual: NodeKind::Derived,
        };
        assert_eq!(err.to_string(), "node #7 is a derived node, expected a state node");
    }

    #[test]
    fn unknown_node_predicate() {
        assert!(GraphError::UnknownNode(NodeId::from(1)).is_unknown_node());
        assert!(!GraphError::GraphDropped.is_unknown_node());
    }
}
