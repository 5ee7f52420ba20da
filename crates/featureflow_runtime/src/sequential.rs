//! Deterministic single-task execution.
//!
//! Uses the same managers as [`GraphExecution`](crate::GraphExecution) but
//! runs them one at a time on the calling task, in topological order. Every
//! visited node must already be ready, so a graph whose wiring disagrees
//! with its declared fan-in fails with [`GraphError::NotReady`] at the
//! first node it affects instead of hanging.

use crate::fan_in::lock;
use crate::managers::ManagerFactory;
use crate::protocol::{ExecutionProtocol, NodeExecutionManager, manager_for};
use featureflow_core::{ExecutionMode, GraphError, GraphResult, NodeId};
use featureflow_graph::{DataGraph, Payload, sort_for_mode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{Instrument, debug, info, info_span};

/// Ready managers, keyed by node
struct ReadySet<D: Payload> {
    ready: Mutex<HashMap<NodeId, Arc<dyn NodeExecutionManager<D>>>>,
}

impl<D: Payload> ExecutionProtocol<D> for ReadySet<D> {
    fn on_ready_to_run(&self, manager: Arc<dyn NodeExecutionManager<D>>) {
        debug!(node = %manager.node_id(), "ready to run");
        lock(&self.ready).insert(manager.node_id(), manager);
    }
}

/// One invocation, run in order on the caller's task
pub struct SequentialExecution<D: Payload> {
    graph: Arc<DataGraph<D>>,
    mode: ExecutionMode,
    ready: Arc<ReadySet<D>>,
    managers: Vec<Arc<dyn NodeExecutionManager<D>>>,
    started: AtomicBool,
}

impl<D: Payload> SequentialExecution<D> {
    /// Prepare an invocation of `graph` in `mode`
    #[must_use]
    pub fn new(graph: Arc<DataGraph<D>>, mode: ExecutionMode) -> Self {
        let ready = Arc::new(ReadySet {
            ready: Mutex::new(HashMap::new()),
        });
        let weak: Weak<ReadySet<D>> = Arc::downgrade(&ready);
        let parent: Weak<dyn ExecutionProtocol<D>> = weak;
        let managers = graph
            .nodes()
            .iter()
            .map(|node| node.execution_manager(parent.clone(), mode))
            .collect();
        Self {
            graph,
            mode,
            ready,
            managers,
            started: AtomicBool::new(false),
        }
    }

    /// Run the invocation to completion
    ///
    /// # Errors
    ///
    /// Returns the first failure: a transform error, a protocol violation,
    /// [`GraphError::NotReady`] for a node visited before all of its inputs
    /// arrived, or [`GraphError::AlreadyStarted`] on a second call
    pub async fn execute(&self, input: Arc<D>) -> GraphResult<Arc<D>> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(GraphError::AlreadyStarted {
                invocation: "sequential".to_string(),
            });
        }
        let span = info_span!("sequential_execution", mode = %self.mode);
        self.run(input).instrument(span).await
    }

    async fn run(&self, input: Arc<D>) -> GraphResult<Arc<D>> {
        let source = self.graph.source();
        let result = self.graph.result();
        if source == result {
            return Ok(input);
        }

        let order = sort_for_mode(&self.graph, self.mode)?;
        info!(nodes = order.len(), "running in topological order");
        self.deliver(source, input)?;

        for node in order.into_iter().filter(|n| *n != source) {
            let manager = lock(&self.ready.ready)
                .remove(&node)
                .ok_or(GraphError::NotReady { node })?;
            let output = manager.run().await?;
            debug!(node = %node, "node computed");
            if node == result {
                return Ok(output);
            }
            self.deliver(node, output)?;
        }
        Err(GraphError::Abandoned)
    }

    fn deliver(&self, from: NodeId, output: Arc<D>) -> GraphResult<()> {
        for subscription in self.graph.node(from)?.subscribers_for(self.mode) {
            let manager = manager_for(&self.managers, subscription.subscriber)?;
            manager.on_data_available(subscription.sub_id, Arc::clone(&output))?;
        }
        Ok(())
    }
}
