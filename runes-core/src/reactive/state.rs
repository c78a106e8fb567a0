//! State Cells
//!
//! A state cell is a writable source of the graph. It holds a value and an
//! equality policy; it never depends on anything.
//!
//! # How State Cells Work
//!
//! 1. Reading a state cell inside a derived cell or effect records the cell
//!    as a dependency of that evaluation.
//!
//! 2. Writing a state cell stores the new value right away, unless the
//!    equality policy calls it the same as the old one.
//!
//! 3. Dependents catch up when the wave runs.
//!
//! The [`State`] handle is a typed view: it holds the cell's id and a weak
//! reference to its graph. Every accessor has a `try_` form that reports a
//! cleared node or a dropped graph as an error, and a panicking form for
//! the common case where neither can happen.

use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use super::equality::Equality;
use super::runtime::Inner;
use crate::error::{GraphError, Result};
use crate::graph::NodeId;

/// Storage for one state cell inside the registry.
pub(crate) struct StateSlot<T> {
    pub(crate) value: T,
    pub(crate) equals: Equality<T>,
}

/// Handle to a state cell.
///
/// # Example
///
/// ```
/// use runes_core::reactive::Graph;
///
/// let graph = Graph::new();
/// let count = graph.state(0);
///
/// count.set(5);
/// count.update(|n| n + 1);
/// assert_eq!(count.get(), 6);
/// ```
pub struct State<T> {
    id: NodeId,
    graph: Weak<Inner>,
    marker: PhantomData<fn() -> T>,
}

impl<T: 'static> State<T> {
    pub(crate) fn new(id: NodeId, graph: Weak<Inner>) -> Self {
        Self {
            id,
            graph,
            marker: PhantomData,
        }
    }

    /// Get the cell's unique ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    fn inner(&self) -> Result<Rc<Inner>> {
        self.graph.upgrade().ok_or(GraphError::GraphDropped)
    }

    /// Get a copy of the current value, recording the read.
    pub fn try_get(&self) -> Result<T>
    where
        T: Clone,
    {
        self.try_with(T::clone)
    }

    /// Get a copy of the current value, recording the read.
    ///
    /// # Panics
    ///
    /// Panics if the cell was cleared or its graph dropped.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Borrow the current value, recording the read.
    ///
    /// # Panics
    ///
    /// `f` runs while the node table is borrowed. Writing a state cell or
    /// creating a node from inside `f` panics with a `RefCell` borrow
    /// error. Read what is needed and write after `f` returns.
    pub fn try_with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        self.inner()?.read_state(self.id, true, f)
    }

    /// Borrow the current value, recording the read.
    ///
    /// # Panics
    ///
    /// Panics if the cell was cleared or its graph dropped, and if `f`
    /// writes to the graph (see [`try_with`](Self::try_with)).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        match self.try_with(f) {
            Ok(value) => value,
            Err(err) => panic!("cannot read state {}: {err}", self.id),
        }
    }

    /// Get a copy of the current value without recording the read.
    pub fn try_peek(&self) -> Result<T>
    where
        T: Clone,
    {
        self.inner()?.read_state(self.id, false, T::clone)
    }

    /// Get a copy of the current value without recording the read.
    ///
    /// # Panics
    ///
    /// Panics if the cell was cleared or its graph dropped.
    pub fn peek(&self) -> T
    where
        T: Clone,
    {
        match self.try_peek() {
            Ok(value) => value,
            Err(err) => panic!("cannot read state {}: {err}", self.id),
        }
    }

    /// Replace the value.
    ///
    /// A value equal to the current one under the cell's policy is dropped
    /// and schedules nothing.
    pub fn try_set(&self, value: T) -> Result<()> {
        self.inner()?.write_state(self.id, value)
    }

    /// Replace the value.
    ///
    /// # Panics
    ///
    /// Panics if the cell was cleared or its graph dropped.
    pub fn set(&self, value: T) {
        if let Err(err) = self.try_set(value) {
            panic!("cannot write state {}: {err}", self.id);
        }
    }

    /// Compute the new value from the current one.
    ///
    /// The read is not tracked, so an effect that bumps a counter this way
    /// does not depend on it.
    pub fn try_update(&self, f: impl FnOnce(&T) -> T) -> Result<()> {
        let inner = self.inner()?;
        let next = inner.read_state(self.id, false, f)?;
        inner.write_state(self.id, next)
    }

    /// Compute the new value from the current one.
    ///
    /// # Panics
    ///
    /// Panics if the cell was cleared or its graph dropped.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        if let Err(err) = self.try_update(f) {
            panic!("cannot write state {}: {err}", self.id);
        }
    }
}

impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            graph: self.graph.clone(),
            marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for State<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State").field("id", &self.id).finish()
    }
}
