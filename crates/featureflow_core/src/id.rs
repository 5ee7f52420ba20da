//! Identifiers for graph nodes and invocations.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Node identifier - the node's position in its graph's node array
///
/// Ids are handed out by the graph builder in insertion order, so a node
/// with id `n` is always found at index `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    /// Create from a raw index
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        Self(index)
    }

    /// Get the index into the graph's node array
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node_{}", self.0)
    }
}

/// Invocation identifier - identifies one transform or train-transform run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InvocationId(Uuid);

impl InvocationId {
    /// Create a new random InvocationId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get as UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "inv_{}", self.0)
    }
}
