//! Mark-and-sweep reachability over factory nodes.
//!
//! The graph does not store edges. Edges are discovered lazily: the driver pops a node
//! from the worklist, asks the factory for that node's dependencies (compiling method
//! bodies on the way), and marks each of them. A node is processed exactly once no
//! matter how many nodes depend on it.

use std::collections::VecDeque;

use crate::dependency::NodeId;

/// Marked set plus breadth-first worklist.
///
/// # Examples
///
/// ```rust
/// use readytorun::dependency::{DependencyGraph, NodeId};
///
/// let mut graph = DependencyGraph::new();
/// graph.add_root(NodeId::new(3), "header");
/// assert!(!graph.mark(NodeId::new(3)));
/// assert!(graph.mark(NodeId::new(1)));
///
/// assert_eq!(graph.next_pending(), Some(NodeId::new(3)));
/// assert_eq!(graph.next_pending(), Some(NodeId::new(1)));
/// assert_eq!(graph.next_pending(), None);
/// ```
#[derive(Debug, Default)]
pub struct DependencyGraph {
    marked: Vec<bool>,
    order: Vec<NodeId>,
    pending: VecDeque<NodeId>,
    roots: Vec<(NodeId, &'static str)>,
}

impl DependencyGraph {
    /// Creates an empty graph
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `node` as a root, recording why it must be emitted
    pub fn add_root(&mut self, node: NodeId, reason: &'static str) {
        self.roots.push((node, reason));
        self.mark(node);
    }

    /// Marks `node` reachable.
    ///
    /// Returns `true` if the node was not marked before, in which case it is queued
    /// for processing.
    pub fn mark(&mut self, node: NodeId) -> bool {
        let index = node.index();
        if index >= self.marked.len() {
            self.marked.resize(index + 1, false);
        }
        if self.marked[index] {
            return false;
        }

        self.marked[index] = true;
        self.order.push(node);
        self.pending.push_back(node);
        true
    }

    /// Takes the next marked node whose dependencies have not been processed
    pub fn next_pending(&mut self) -> Option<NodeId> {
        self.pending.pop_front()
    }

    /// Returns `true` while marked nodes remain unprocessed
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Returns `true` if `node` was marked
    #[must_use]
    pub fn is_marked(&self, node: NodeId) -> bool {
        self.marked.get(node.index()).copied().unwrap_or(false)
    }

    /// All marked nodes in marking order
    #[must_use]
    pub fn marked_nodes(&self) -> &[NodeId] {
        &self.order
    }

    /// Number of marked nodes
    #[must_use]
    pub fn marked_count(&self) -> usize {
        self.order.len()
    }

    /// Roots with the reason each was added
    #[must_use]
    pub fn roots(&self) -> &[(NodeId, &'static str)] {
        &self.roots
    }
}
