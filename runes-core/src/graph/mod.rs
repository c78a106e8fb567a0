//! Dependency Graph
//!
//! This module holds the bookkeeping side of the reactive graph: node
//! identifiers, the registry of node tables and the scheduler that orders
//! recomputation.
//!
//! # Overview
//!
//! The graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes are state cells, derived cells and effects
//! - Edges are dependencies: if A reads B, there is an edge from B to A
//!
//! Edges are not declared. They are whatever a derived cell or effect read
//! during its most recent evaluation, so they change as conditional bodies
//! take different branches.
//!
//! # Design Decisions
//!
//! 1. Each node stores only its forward edges (what it read). Reverse edges
//!    are rebuilt by the scheduler at the start of every pass, which keeps a
//!    single source of truth while dependency sets churn.
//!
//! 2. Tables are indexed by node ID for O(1) lookups and remember insertion
//!    order, which doubles as creation order.

mod node;
pub(crate) mod registry;
mod scheduler;

pub use node::{NodeId, NodeKind};
pub use scheduler::UpdateScheduler;
