//! Stable ID newtypes for graph entities.
//!
//! All IDs are distinct newtype wrappers, providing type safety so that a
//! `NodeId` cannot be accidentally used where an `EdgeId` is expected.
//!
//! `NodeId` additionally carries a generation. The graph arena reuses vacant
//! slots, so a handle kept across a `destroy` must not alias the node that
//! later lands in the same slot.

use std::fmt;

use petgraph::graph::{EdgeIndex, NodeIndex};
use serde::{Deserialize, Serialize};

/// Generation-checked node handle. `index` maps to a petgraph `NodeIndex<u32>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub index: u32,
    pub generation: u32,
}

/// Stable edge identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub u32);

/// A property is addressed by its owning node and its position on that node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyId {
    pub node: NodeId,
    pub index: u16,
}

/// Native function identity within a [`Language`](crate::language::Language).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvokableId(pub u32);

impl NodeId {
    pub fn new(index: u32, generation: u32) -> Self {
        NodeId { index, generation }
    }

    /// The arena slot this handle points at, ignoring the generation.
    pub fn node_index(self) -> NodeIndex<u32> {
        NodeIndex::new(self.index as usize)
    }
}

impl PropertyId {
    pub fn new(node: NodeId, index: u16) -> Self {
        PropertyId { node, index }
    }
}

// Display implementations.

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.index)
    }
}

impl fmt::Display for InvokableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Bridge between EdgeId and petgraph's EdgeIndex<u32>.

impl From<EdgeIndex<u32>> for EdgeId {
    fn from(idx: EdgeIndex<u32>) -> Self {
        EdgeId(idx.index() as u32)
    }
}

impl From<EdgeId> for EdgeIndex<u32> {
    fn from(id: EdgeId) -> Self {
        EdgeIndex::new(id.0 as usize)
    }
}
