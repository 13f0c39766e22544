//! Dependency-graph primitives shared by the node factory and the driver.
//!
//! Nodes themselves live in the [`NodeFactory`](crate::factory::NodeFactory) arena and
//! are addressed by [`NodeId`]. This module provides the identifier, the reachability
//! worklist, and the [`ObjectData`] every emitted node produces.

mod graph;
mod node;
mod objectdata;

pub use graph::DependencyGraph;
pub use node::NodeId;
pub use objectdata::{ObjectData, ObjectDataBuilder, ObjectNodeSection, Relocation, RelocationKind};
