//! Transform contracts.
//!
//! The graph never looks inside the data it moves. A node's computation is
//! one of the traits below, operating on an opaque payload `D` that is
//! shared between subscribers as `Arc<D>`.

use async_trait::async_trait;
use featureflow_core::{BoxError, TransformDescription};
use std::sync::Arc;

/// Data that can flow through a graph
pub trait Payload: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Payload for T {}

/// Outcome of one transform call
pub type TransformResult<D> = Result<Arc<D>, BoxError>;

/// A stateless (or already trained) transform with one input
#[async_trait]
pub trait SingleTransform<D: Payload>: Send + Sync {
    /// What the output contains
    fn description(&self) -> &TransformDescription;

    /// Produce the output for one input
    async fn transform(&self, input: Arc<D>) -> TransformResult<D>;
}

/// A transform that learns from its input when trained
///
/// `train_transform` trains on the input and returns the transformed
/// input; after training, `transform` applies what was learned.
#[async_trait]
pub trait LearningTransform<D: Payload>: SingleTransform<D> {
    /// Train, then transform the training input
    async fn train_transform(&self, input: Arc<D>) -> TransformResult<D>;
}

/// A transform trained from a main input and a target
#[async_trait]
pub trait SupervisedTransform<D: Payload>: SingleTransform<D> {
    /// Train from `main` and `target`, then transform `main`
    async fn train_transform(&self, main: Arc<D>, target: Arc<D>) -> TransformResult<D>;
}

/// A transform combining several inputs, passed in declaration order
#[async_trait]
pub trait MultiTransform<D: Payload>: Send + Sync {
    /// What the output contains
    fn description(&self) -> &TransformDescription;

    /// Combine the inputs
    async fn transform(&self, inputs: Vec<Arc<D>>) -> TransformResult<D>;
}
