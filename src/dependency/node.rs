//! Node identifier of the dependency graph.

use std::fmt;

/// A strongly-typed identifier for nodes owned by a [`NodeFactory`](crate::factory::NodeFactory).
///
/// Node ids are assigned sequentially starting from 0 as the factory creates nodes, so
/// they double as a stable creation order. Two lookups of the same entity through the
/// factory yield the same id.
///
/// # Examples
///
/// ```rust
/// use readytorun::dependency::NodeId;
/// use std::collections::HashMap;
///
/// let a = NodeId::new(0);
/// let b = NodeId::new(1);
/// assert!(a < b);
///
/// let mut sizes: HashMap<NodeId, usize> = HashMap::new();
/// sizes.insert(a, 16);
/// assert_eq!(format!("{b}"), "n1");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Creates a `NodeId` from a raw index.
    ///
    /// Intended for tests; ids normally come from the factory.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// Returns the raw index of this node.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl From<usize> for NodeId {
    fn from(index: usize) -> Self {
        NodeId(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_formatting() {
        let node = NodeId::new(42);
        assert_eq!(format!("{node:?}"), "NodeId(42)");
        assert_eq!(format!("{node}"), "n42");
        assert_eq!(node.index(), 42);
        assert_eq!(NodeId::from(42), node);
    }
}
