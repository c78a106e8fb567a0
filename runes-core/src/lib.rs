//! Runes Core
//!
//! This crate provides a fine-grained reactive value graph. It implements:
//!
//! - State cells: writable sources
//! - Derived cells: cached computations over other cells
//! - Effects: side effects that re-run when what they read changes
//! - Batched propagation in waves, with subscriber notification
//!
//! Dependencies are discovered at run time by recording which cells an
//! evaluation reads. Writes are applied immediately; dependents catch up in
//! the next wave, which the graph's scheduler decides when to run.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: the graph handle, cell handles, tracking and propagation
//! - `graph`: node identifiers, the node registry and the update scheduler
//! - `error`: the error type shared by both
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use runes_core::reactive::Graph;
//!
//! let graph = Graph::new();
//!
//! // Create a state cell
//! let count = graph.state(0);
//!
//! // Create a derived cell
//! let doubled = graph.derived({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! // Observe it from outside the graph
//! let seen = Rc::new(Cell::new(0));
//! let _subscription = graph.subscribe(doubled.id(), {
//!     let (doubled, seen) = (doubled.clone(), Rc::clone(&seen));
//!     move || seen.set(doubled.peek())
//! });
//!
//! // Write, then let the wave run
//! count.set(5);
//! graph.flush()?;
//! assert_eq!(seen.get(), 10);
//! # Ok::<(), runes_core::GraphError>(())
//! ```

pub mod error;
pub mod graph;
pub mod reactive;

pub use error::{GraphError, Result};
pub use graph::{NodeId, NodeKind};
pub use reactive::{Derived, EffectHandle, Graph, State};
