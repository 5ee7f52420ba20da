//! Running a graph without holding on to its execution.

use crate::execution::{GraphExecution, InvocationHandle};
use featureflow_core::ExecutionMode;
use featureflow_graph::{DataGraph, Payload};
use std::sync::Arc;
use tokio::runtime::Handle;

/// One-call invocations of a shared graph
pub trait DataGraphExt<D: Payload> {
    /// Run in [`ExecutionMode::Transform`] on `handle`
    fn transform(&self, input: Arc<D>, handle: &Handle) -> InvocationHandle<D>;

    /// Run in [`ExecutionMode::TrainTransform`] on `handle`
    fn train_transform(&self, input: Arc<D>, handle: &Handle) -> InvocationHandle<D>;
}

impl<D: Payload> DataGraphExt<D> for Arc<DataGraph<D>> {
    fn transform(&self, input: Arc<D>, handle: &Handle) -> InvocationHandle<D> {
        GraphExecution::new(Arc::clone(self), ExecutionMode::Transform, handle.clone())
            .execute(input)
    }

    fn train_transform(&self, input: Arc<D>, handle: &Handle) -> InvocationHandle<D> {
        GraphExecution::new(
            Arc::clone(self),
            ExecutionMode::TrainTransform,
            handle.clone(),
        )
        .execute(input)
    }
}
