//! Update Scheduler
//!
//! The scheduler determines the order in which derived cells and effects are
//! revisited during one pass of a wave. It ensures that a node is visited
//! only after every affected node it depends on.
//!
//! # Algorithm
//!
//! 1. Start from the ids dirtied since the last pass.
//! 2. Walk dependent edges breadth-first to collect every reachable node.
//! 3. Sort the collected nodes topologically with Kahn's algorithm, using
//!    only edges inside the collected set.
//! 4. When several nodes are ready at once, the one created first wins, so
//!    the order is deterministic.
//!
//! Edges are a snapshot of the dependency sets at the start of the pass.
//! The propagator handles edges that appear while the pass runs.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use super::node::NodeId;

/// Dependency edges of a graph, indexed in both directions.
#[derive(Debug, Default)]
pub struct UpdateScheduler {
    /// For each derived cell or effect, the nodes it read.
    dependencies: HashMap<NodeId, Vec<NodeId>>,

    /// For each node, the derived cells and effects that read it.
    dependents: HashMap<NodeId, BTreeSet<NodeId>>,
}

impl UpdateScheduler {
    /// Create a new empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node together with the nodes it depends on.
    pub fn add_node(&mut self, node_id: NodeId, dependencies: impl IntoIterator<Item = NodeId>) {
        let dependencies: Vec<NodeId> = dependencies.into_iter().collect();
        for dependency in &dependencies {
            self.dependents.entry(*dependency).or_default().insert(node_id);
        }
        self.dependencies.insert(node_id, dependencies);
    }

    /// Nodes that read `node_id`, in creation order.
    pub fn dependents(&self, node_id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.dependents
            .get(&node_id)
            .into_iter()
            .flat_map(|dependents| dependents.iter().copied())
    }

    /// Collect every node reachable from the changed sources and return it
    /// in visiting order. The sources themselves are not included.
    pub fn mark_changed(&self, sources: impl IntoIterator<Item = NodeId>) -> Vec<NodeId> {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<NodeId> = VecDeque::new();

        for source in sources {
            queue.extend(self.dependents(source));
        }

        while let Some(node_id) = queue.pop_front() {
            if visited.insert(node_id) {
                queue.extend(self.dependents(node_id));
            }
        }

        self.topological_sort(visited)
    }

    /// Order `nodes` so that dependencies come before dependents.
    ///
    /// Nodes caught in a cycle are appended in creation order.
    fn topological_sort(&self, nodes: HashSet<NodeId>) -> Vec<NodeId> {
        let mut in_degree: HashMap<NodeId, usize> = HashMap::with_capacity(nodes.len());
        let mut ready = BTreeSet::new();
        let mut result = Vec::with_capacity(nodes.len());

        // Only edges within the set count.
        for &node_id in &nodes {
            let degree = self
                .dependencies
                .get(&node_id)
                .map(|deps| deps.iter().filter(|d| nodes.contains(d)).count())
                .unwrap_or(0);
            in_degree.insert(node_id, degree);
            if degree == 0 {
                ready.insert(node_id);
            }
        }

        while let Some(node_id) = ready.pop_first() {
            result.push(node_id);
            in_degree.remove(&node_id);

            for dependent_id in self.dependents(node_id) {
                if let Some(degree) = in_degree.get_mut(&dependent_id) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.insert(dependent_id);
                    }
                }
            }
        }

        if !in_degree.is_empty() {
            let mut leftover: Vec<NodeId> = in_degree.into_keys().collect();
            leftover.sort();
            result.extend(leftover);
        }

        result
    }

    /// Get the number of nodes with recorded dependencies.
    pub fn node_count(&self) -> usize {
        self.dependencies.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<NodeId> {
        (0..n).map(|_| NodeId::next()).collect()
    }

    #[test]
    fn chain_is_ordered() {
        // source -> derived1 -> derived2
        let ids = ids(3);
        let (source, derived1, derived2) = (ids[0], ids[1], ids[2]);

        let mut scheduler = UpdateScheduler::new();
        // Registered out of order on purpose.
        scheduler.add_node(derived2, [derived1]);
        scheduler.add_node(derived1, [source]);

        let order = scheduler.mark_changed([source]);
        assert_eq!(order, vec![derived1, derived2]);
    }

    #[test]
    fn diamond_visits_join_once_and_last() {
        //      a
        //     / \
        //    b   c
        //     \ /
        //      d
        let ids = ids(4);
        let (a, b, c, d) = (ids[0], ids[1], ids[2], ids[3]);

        let mut scheduler = UpdateScheduler::new();
        scheduler.add_node(b, [a]);
        scheduler.add_node(c, [a]);
        scheduler.add_node(d, [b, c]);

        let order = scheduler.mark_changed([a]);
        assert_eq!(order, vec![b, c, d]);
    }

    #[test]
    fn independent_nodes_tie_break_by_creation_order() {
        let ids = ids(4);
        let (a, first, second, third) = (ids[0], ids[1], ids[2], ids[3]);

        let mut scheduler = UpdateScheduler::new();
        scheduler.add_node(third, [a]);
        scheduler.add_node(first, [a]);
        scheduler.add_node(second, [a]);

        assert_eq!(scheduler.mark_changed([a]), vec![first, second, third]);
    }

    #[test]
    fn unaffected_nodes_are_skipped() {
        let ids = ids(4);
        let (a, b, from_a, from_b) = (ids[0], ids[1], ids[2], ids[3]);

        let mut scheduler = UpdateScheduler::new();
        scheduler.add_node(from_a, [a]);
        scheduler.add_node(from_b, [b]);

        assert_eq!(scheduler.mark_changed([a]), vec![from_a]);
        assert_eq!(scheduler.node_count(), 2);
    }

    #[test]
    fn multiple_sources_share_one_order() {
        let ids = ids(4);
        let (a, b, sum, doubled) = (ids[0], ids[1], ids[2], ids[3]);

        let mut scheduler = UpdateScheduler::new();
        scheduler.add_node(sum, [a, b]);
        scheduler.add_node(doubled, [sum]);

        assert_eq!(scheduler.mark_changed([a, b]), vec![sum, doubled]);
    }

    #[test]
    fn cycles_do_not_drop_nodes() {
        let ids = ids(3);
        let (a, x, y) = (ids[0], ids[1], ids[2]);

        let mut scheduler = UpdateScheduler::new();
        scheduler.add_node(x, [a, y]);
        scheduler.add_node(y, [x]);

        assert_eq!(scheduler.mark_changed([a]), vec![x, y]);
    }
}
