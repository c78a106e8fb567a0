//! Derived Cells
//!
//! A derived cell caches the result of a pure computation over other cells.
//!
//! # How Derived Cells Work
//!
//! 1. On creation, the computation runs once inside a tracking frame. The
//!    result is cached and the cells it read become its dependencies.
//!
//! 2. Reads return the cached value. They never recompute.
//!
//! 3. When a wave finds a dependency changed, the propagator recomputes the
//!    cell. The dependency set is replaced by whatever this run read, so
//!    conditional branches may add or drop edges from one run to the next.
//!
//! 4. If the equality policy calls the new value the same as the cached
//!    one, the cache is left alone and propagation stops here.
//!
//! # Differences from State
//!
//! - Derived cells have no setter.
//! - Between a write and the next wave, a derived cell may lag behind the
//!   state it reads. The wave is what brings it up to date.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use super::equality::Equality;
use super::runtime::Inner;
use crate::error::{GraphError, Result};
use crate::graph::registry::DerivedCell;
use crate::graph::NodeId;

/// Computation, cache and policy of one derived cell.
pub(crate) struct DerivedSlot<T> {
    compute: Box<dyn Fn() -> T>,
    value: RefCell<T>,
    equals: Equality<T>,
}

impl<T: 'static> DerivedSlot<T> {
    pub(crate) fn new(compute: Box<dyn Fn() -> T>, value: T, equals: Equality<T>) -> Self {
        Self {
            compute,
            value: RefCell::new(value),
            equals,
        }
    }

    pub(crate) fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.borrow())
    }
}

impl<T: 'static> DerivedCell for DerivedSlot<T> {
    fn recompute(&self) -> bool {
        // No borrow is held while user code runs; it may read this cell.
        let next = (self.compute)();
        if self.equals.equals(&self.value.borrow(), &next) {
            return false;
        }
        let previous = self.value.replace(next);
        drop(previous);
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Handle to a derived cell.
///
/// # Example
///
/// ```
/// use runes_core::reactive::Graph;
///
/// let graph = Graph::new();
/// let first = graph.state("Ada".to_string());
/// let last = graph.state("Lovelace".to_string());
/// let full = graph.derived({
///     let (first, last) = (first.clone(), last.clone());
///     move || format!("{} {}", first.get(), last.get())
/// });
///
/// last.set("Byron".to_string());
/// graph.flush().unwrap();
/// assert_eq!(full.get(), "Ada Byron");
/// ```
pub struct Derived<T> {
    id: NodeId,
    graph: Weak<Inner>,
    marker: PhantomData<fn() -> T>,
}

impl<T: 'static> Derived<T> {
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

    /// Get a copy of the cached value, recording the read.
    pub fn try_get(&self) -> Result<T>
    where
        T: Clone,
    {
        self.try_with(T::clone)
    }

    /// Get a copy of the cached value, recording the read.
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

    /// Borrow the cached value, recording the read.
    pub fn try_with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        self.inner()?.read_derived(self.id, true, f)
    }

    /// Borrow the cached value, recording the read.
    ///
    /// # Panics
    ///
    /// Panics if the cell was cleared or its graph dropped.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        match self.try_with(f) {
            Ok(value) => value,
            Err(err) => panic!("cannot read derived {}: {err}", self.id),
        }
    }

    /// Get a copy of the cached value without recording the read.
    pub fn try_peek(&self) -> Result<T>
    where
        T: Clone,
    {
        self.inner()?.read_derived(self.id, false, T::clone)
    }

    /// Get a copy of the cached value without recording the read.
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
            Err(err) => panic!("cannot read derived {}: {err}", self.id),
        }
    }
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            graph: self.graph.clone(),
            marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Derived").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::reactive::Graph;

    #[test]
    fn slot_keeps_cache_when_equal() {
        let source = Rc::new(Cell::new(1));
        let input = Rc::clone(&source);
        let slot = DerivedSlot::new(
            Box::new(move || input.get() / 10),
            0,
            Equality::same_value(),
        );

        source.set(5);
        assert!(!slot.recompute());
        source.set(42);
        assert!(slot.recompute());
        assert_eq!(slot.with_value(|v| *v), 4);
    }

    #[test]
    fn dynamic_dependencies_follow_the_branch() {
        let graph = Graph::new();
        let use_a = graph.state(true);
        let a = graph.state(1);
        let b = graph.state(2);
        let pick = graph.derived({
            let (use_a, a, b) = (use_a.clone(), a.clone(), b.clone());
            move || if use_a.get() { a.get() } else { b.get() }
        });
        assert_eq!(graph.dependencies(pick.id()), Ok(vec![use_a.id(), a.id()]));

        use_a.set(false);
        graph.flush().unwrap();
        assert_eq!(pick.get(), 2);
        assert_eq!(graph.dependencies(pick.id()), Ok(vec![use_a.id(), b.id()]));

        // `a` is no longer read, so writing it recomputes nothing.
        a.set(10);
        let report = graph.flush().unwrap();
        assert!(report.recomputed.is_empty());
        assert_eq!(pick.get(), 2);
    }

    #[test]
    fn custom_equality_stops_propagation() {
        let graph = Graph::new();
        let raw = graph.state(1.04_f64);
        let rounded = graph.derived_with(
            {
                let raw = raw.clone();
                move || raw.get()
            },
            Equality::new(|a: &f64, b: &f64| (a - b).abs() < 0.1),
        );

        raw.set(1.06);
        graph.flush().unwrap();
        assert_eq!(rounded.get(), 1.04);

        raw.set(2.0);
        graph.flush().unwrap();
        assert_eq!(rounded.get(), 2.0);
    }

    #[test]
    fn reading_a_state_as_derived_is_a_kind_mismatch() {
        let graph = Graph::new();
        let a = graph.state(1);
        let wrong = Derived::<i32>::new(a.id(), graph.downgrade());
        assert_eq!(
            wrong.try_get(),
            Err(GraphError::KindMismatch {
                id: a.id(),
                expected: crate::graph::NodeKind::Derived,
                actual: crate::graph::NodeKind::State,
            })
        );
    }
}
