//! Subscription Registry
//!
//! External observers (a UI binding that re-renders, a logger, a test) hook
//! into cells through plain callbacks. This is a fan-out next to the graph,
//! not part of it: subscribing never creates a dependency edge, and a
//! subscriber is told *that* a cell changed, not what the new value is.
//!
//! Callbacks fire after a wave settles, once per changed cell per wave.

use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::runtime::Inner;
use crate::graph::NodeId;

/// Unique identifier for one subscription.
///
/// Two subscriptions of the same callback to the same cell get distinct ids
/// and both fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub(crate) type Callback = Rc<dyn Fn()>;

/// Callbacks per cell id.
#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    next_id: u64,
    by_node: HashMap<NodeId, IndexMap<SubscriptionId, Callback>>,
}

impl SubscriptionRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, node: NodeId, callback: Callback) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.by_node.entry(node).or_default().insert(id, callback);
        id
    }

    /// Remove one subscription. The entry for `node` goes away with its last
    /// callback.
    pub(crate) fn remove(&mut self, node: NodeId, id: SubscriptionId) -> bool {
        let Some(callbacks) = self.by_node.get_mut(&node) else {
            return false;
        };
        let removed = callbacks.shift_remove(&id).is_some();
        if callbacks.is_empty() {
            self.by_node.remove(&node);
        }
        removed
    }

    /// Snapshot of the callbacks for `node`, in subscription order.
    pub(crate) fn callbacks(&self, node: NodeId) -> Vec<Callback> {
        self.by_node
            .get(&node)
            .map(|callbacks| callbacks.values().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn count(&self, node: NodeId) -> usize {
        self.by_node.get(&node).map_or(0, IndexMap::len)
    }

    /// Number of cells with at least one subscriber.
    pub(crate) fn node_count(&self) -> usize {
        self.by_node.len()
    }

    pub(crate) fn clear(&mut self) {
        self.by_node.clear();
    }
}

/// Handle returned by [`Graph::subscribe`](super::Graph::subscribe).
///
/// Dropping the handle keeps the subscription alive; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
pub struct Subscription {
    node: NodeId,
    id: SubscriptionId,
    graph: Weak<Inner>,
}

impl Subscription {
    pub(crate) fn new(node: NodeId, id: SubscriptionId, graph: Weak<Inner>) -> Self {
        Self { node, id, graph }
    }

    /// The cell this subscription watches.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Get the subscription's unique ID.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the callback.
    ///
    /// Returns `false` if it was already gone (the graph was cleared or
    /// dropped).
    pub fn unsubscribe(self) -> bool {
        match self.graph.upgrade() {
            Some(inner) => inner.subscriptions.borrow_mut().remove(self.node, self.id),
            None => false,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("node", &self.node)
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn identical_callbacks_are_independent() {
        let mut registry = SubscriptionRegistry::new();
        let node = NodeId::next();
        let calls = Rc::new(Cell::new(0));

        let counter = Rc::clone(&calls);
        let callback: Callback = Rc::new(move || counter.set(counter.get() + 1));

        let first = registry.insert(node, Rc::clone(&callback));
        let second = registry.insert(node, callback);
        assert_ne!(first, second);
        assert_eq!(registry.count(node), 2);

        for callback in registry.callbacks(node) {
            callback();
        }
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn entry_is_dropped_with_its_last_callback() {
        let mut registry = SubscriptionRegistry::new();
        let node = NodeId::next();

        let first = registry.insert(node, Rc::new(|| {}));
        let second = registry.insert(node, Rc::new(|| {}));
        assert_eq!(registry.node_count(), 1);

        assert!(registry.remove(node, first));
        assert_eq!(registry.node_count(), 1);
        assert!(registry.remove(node, second));
        assert_eq!(registry.node_count(), 0);

        // Removing twice is harmless.
        assert!(!registry.remove(node, second));
    }

    #[test]
    fn callbacks_of_unknown_nodes_are_empty() {
        let registry = SubscriptionRegistry::new();
        assert!(registry.callbacks(NodeId::next()).is_empty());
        assert_eq!(registry.count(NodeId::next()), 0);
    }
}
