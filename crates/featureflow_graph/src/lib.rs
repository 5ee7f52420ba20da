//! FEATUREFLOW Graph
//!
//! The static half of the engine: transform contracts, graph nodes and
//! their subscriptions, the builder that freezes a [`DataGraph`], and the
//! topological orderings used for validation and sequential execution.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod graph;
pub mod node;
pub mod topo;
pub mod transform;
pub mod validate;

#[cfg(test)]
pub(crate) mod test_support;

pub use graph::{DataGraph, GraphBuilder};
pub use node::{
    GraphNode, MAIN_DS_ID, NodeKind, SubscribedTo, Subscription, TARGET_DS_ID, TargetSource,
};
pub use topo::{
    TopoSorter, TopologicalIterator, sort, sort_backwards, sort_for_mode, sort_with_train,
    sort_with_train_backwards,
};
pub use transform::{
    LearningTransform, MultiTransform, Payload, SingleTransform, SupervisedTransform,
    TransformResult,
};
