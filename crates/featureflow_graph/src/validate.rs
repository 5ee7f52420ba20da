//! Build-time checks on the declared node set.

use crate::node::GraphNode;
use crate::topo::TopoSorter;
use crate::transform::Payload;
use featureflow_core::{ExecutionMode, GraphError, GraphResult, NodeId};

/// Check that every declared source refers to an existing node
///
/// # Errors
///
/// Returns [`GraphError::MissingNode`] for the first dangling reference
pub fn check_references<D: Payload>(nodes: &[GraphNode<D>]) -> GraphResult<()> {
    for node in nodes {
        for input in node.sources_for(ExecutionMode::TrainTransform) {
            if input.source.index() >= nodes.len() {
                return Err(GraphError::MissingNode { id: input.source });
            }
        }
    }
    Ok(())
}

/// Check that no node depends on itself, over every edge kind
///
/// Unlike the sorts, this looks at the whole node set, including nodes the
/// result does not depend on.
///
/// # Errors
///
/// Returns [`GraphError::Cycle`] naming a node on the cycle
pub fn check_acyclic<D: Payload>(nodes: &[GraphNode<D>]) -> GraphResult<()> {
    let mut sorter = TopoSorter::new(nodes.len(), |id: NodeId| {
        nodes[id.index()]
            .sources_for(ExecutionMode::TrainTransform)
            .map(|s| s.source)
            .collect::<Vec<_>>()
    });
    for node in nodes {
        sorter.visit(node.id())?;
    }
    Ok(())
}

/// Nodes missing from `reached`, in id order
#[must_use]
pub fn unreached(node_count: usize, reached: &[NodeId]) -> Vec<NodeId> {
    let mut seen = vec![false; node_count];
    for id in reached {
        if let Some(flag) = seen.get_mut(id.index()) {
            *flag = true;
        }
    }
    seen.iter()
        .enumerate()
        .filter(|(_, hit)| !**hit)
        .map(|(idx, _)| NodeId::from_index(idx))
        .collect()
}
