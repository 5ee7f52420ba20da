//! A whole graph used as one transform of another graph.

use async_trait::async_trait;
use crate::execution::GraphExecution;
use featureflow_core::{ExecutionMode, GraphError, TransformDescription};
use featureflow_graph::{DataGraph, LearningTransform, Payload, SingleTransform, TransformResult};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::debug;

/// Runs an inner graph per call
///
/// The inner invocation is spawned on the pool the caller is running on,
/// so nesting needs no pool of its own.
pub struct GraphTransform<D: Payload> {
    graph: Arc<DataGraph<D>>,
}

impl<D: Payload> GraphTransform<D> {
    /// Wrap `graph`
    #[must_use]
    pub fn new(graph: Arc<DataGraph<D>>) -> Self {
        Self { graph }
    }

    /// The inner graph
    #[must_use]
    pub fn graph(&self) -> &Arc<DataGraph<D>> {
        &self.graph
    }

    async fn invoke(&self, input: Arc<D>, mode: ExecutionMode) -> TransformResult<D> {
        let handle = Handle::try_current().map_err(|err| GraphError::Runtime {
            message: err.to_string(),
        })?;
        debug!(mode = %mode, nodes = self.graph.len(), "running nested graph");
        let execution = GraphExecution::new(Arc::clone(&self.graph), mode, handle);
        Ok(execution.execute(input).await?)
    }
}

#[async_trait]
impl<D: Payload> SingleTransform<D> for GraphTransform<D> {
    fn description(&self) -> &TransformDescription {
        self.graph.description()
    }

    async fn transform(&self, input: Arc<D>) -> TransformResult<D> {
        self.invoke(input, ExecutionMode::Transform).await
    }
}

#[async_trait]
impl<D: Payload> LearningTransform<D> for GraphTransform<D> {
    async fn train_transform(&self, input: Arc<D>) -> TransformResult<D> {
        self.invoke(input, ExecutionMode::TrainTransform).await
    }
}
