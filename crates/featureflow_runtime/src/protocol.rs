//! The execution protocol between an invocation and its node managers.
//!
//! Data flows into a manager through [`NodeExecutionManager::on_data_available`].
//! Once the manager has every input it needs it calls
//! [`ExecutionProtocol::on_ready_to_run`] on its parent exactly once, and the
//! parent eventually calls [`NodeExecutionManager::run`].

use featureflow_core::{GraphError, GraphResult, NodeId};
use featureflow_graph::Payload;
use futures::future::BoxFuture;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Future of one node's output
pub type NodeFuture<D> = BoxFuture<'static, GraphResult<Arc<D>>>;

/// Receives readiness notifications from node managers
pub trait ExecutionProtocol<D: Payload>: Send + Sync {
    /// `manager` has all of its inputs and can run
    fn on_ready_to_run(&self, manager: Arc<dyn NodeExecutionManager<D>>);
}

/// Per-invocation state of one node
pub trait NodeExecutionManager<D: Payload>: Send + Sync {
    /// Node this manager runs
    fn node_id(&self) -> NodeId;

    /// Deliver the input for subscription `sub_id`
    ///
    /// # Errors
    ///
    /// Returns a protocol violation if the delivery is a duplicate, out of
    /// range, or sent to a node that takes no part in the protocol
    fn on_data_available(self: Arc<Self>, sub_id: usize, data: Arc<D>) -> GraphResult<()>;

    /// Compute the node's output from the retained inputs
    ///
    /// The inputs are released when this is called.
    fn run(&self) -> NodeFuture<D>;
}

/// Manager of `node` in a per-invocation list indexed by node
///
/// # Errors
///
/// Returns [`GraphError::UnknownSubscriber`] if `node` is out of range
pub(crate) fn manager_for<D: Payload>(
    managers: &[Arc<dyn NodeExecutionManager<D>>],
    node: NodeId,
) -> GraphResult<Arc<dyn NodeExecutionManager<D>>> {
    managers
        .get(node.index())
        .map(Arc::clone)
        .ok_or(GraphError::UnknownSubscriber { node })
}

/// Tell `parent` that `manager` is ready, if the parent still exists
pub(crate) fn notify_ready<D: Payload>(
    parent: &Weak<dyn ExecutionProtocol<D>>,
    manager: Arc<dyn NodeExecutionManager<D>>,
) {
    match parent.upgrade() {
        Some(parent) => parent.on_ready_to_run(manager),
        None => debug!(node = %manager.node_id(), "execution dropped before node became ready"),
    }
}
