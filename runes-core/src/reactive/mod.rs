//! Reactive Primitives
//!
//! This module implements the reactive side of the graph: state cells,
//! derived cells, effects and the machinery that keeps them consistent.
//!
//! # Concepts
//!
//! ## State Cells
//!
//! A [`State`] is a container for mutable state. When it is read while a
//! derived cell or effect is being evaluated, that evaluation records the
//! read as a dependency. When it is written with a value its equality
//! policy considers different, a wave is scheduled.
//!
//! ## Derived Cells
//!
//! A [`Derived`] cell caches the result of a computation over other cells.
//! It is recomputed during a wave when one of the cells it read last time
//! changed, and only counts as changed itself if the new value differs.
//!
//! ## Effects
//!
//! An effect runs a side-effecting body whenever its dependencies change.
//! Effects synchronize the graph with the outside world. The body may
//! return a [`Cleanup`] that runs before the next run and on dispose.
//!
//! ## Subscribers
//!
//! [`Graph::subscribe`] attaches a plain callback to any cell. Subscribers
//! are not part of the graph; they hear about changes once per wave.
//!
//! # Implementation Notes
//!
//! Dependencies are detected automatically. Each graph keeps a stack of
//! tracking frames; a read checks the top frame and, if it is capturing,
//! adds the cell's id to it. The frame is popped when the evaluation
//! finishes, and its reads replace the node's previous dependency set.

mod context;
mod derived;
mod effect;
mod equality;
mod propagator;
mod runtime;
mod state;
mod subscriber;
mod wave;

pub use derived::Derived;
pub use effect::{Cleanup, EffectHandle, IntoCleanup};
pub use equality::{Equality, SameValue, ShallowEq};
pub use runtime::{Graph, GraphBuilder, GraphConfig, GraphSnapshot, NodeSnapshot};
pub use state::State;
pub use subscriber::{Subscription, SubscriptionId};
pub use wave::{LocalTaskScheduler, ManualScheduler, Wave, WaveReport, WaveScheduler};
