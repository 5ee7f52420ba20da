//! Graph nodes and subscriptions.

use crate::transform::{
    LearningTransform, MultiTransform, Payload, SingleTransform, SupervisedTransform,
};
use featureflow_core::{ColumnId, ExecutionMode, NodeId, TransformDescription};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Subscription id of a supervised node's main input
pub const MAIN_DS_ID: usize = 0;

/// Subscription id of a supervised node's target input
pub const TARGET_DS_ID: usize = 1;

/// Edge as seen from the producer: who receives its output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscription {
    /// Receiving node
    pub subscriber: NodeId,
    /// Id the receiver uses to tell its inputs apart
    pub sub_id: usize,
}

/// Edge as seen from the consumer: where an input comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscribedTo {
    /// Producing node
    pub source: NodeId,
    /// Id the consumer uses to tell its inputs apart
    pub sub_id: usize,
}

/// Where a supervised node gets its target from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSource {
    /// Main and target are the same upstream output
    SameAsMain,
    /// The target comes from another node, over a train-only edge
    Separate,
}

/// What a node computes
pub enum NodeKind<D: Payload> {
    /// Graph input with declared columns
    Source {
        /// Columns only present in training data
        train_only_columns: Vec<ColumnId>,
    },
    /// Graph input whose shape is whatever the caller passes
    DataSetSource,
    /// Single-input transform
    Transform(Arc<dyn SingleTransform<D>>),
    /// Single-input transform trained without a target
    Learning(Arc<dyn LearningTransform<D>>),
    /// Multi-input transform
    Merge(Arc<dyn MultiTransform<D>>),
    /// Transform trained from a main input and a target
    Supervised {
        /// The transform
        transform: Arc<dyn SupervisedTransform<D>>,
        /// Whether the target is a separate input
        target: TargetSource,
    },
}

impl<D: Payload> NodeKind<D> {
    /// Short name of the variant
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Source { .. } => "source",
            Self::DataSetSource => "data_set_source",
            Self::Transform(_) => "transform",
            Self::Learning(_) => "learning",
            Self::Merge(_) => "merge",
            Self::Supervised { .. } => "supervised",
        }
    }

    /// Whether this is one of the source variants
    #[must_use]
    pub fn is_source(&self) -> bool {
        matches!(self, Self::Source { .. } | Self::DataSetSource)
    }
}

impl<D: Payload> std::fmt::Debug for NodeKind<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source { train_only_columns } => f
                .debug_struct("Source")
                .field("train_only_columns", train_only_columns)
                .finish(),
            Self::Supervised { target, .. } => f
                .debug_struct("Supervised")
                .field("target", target)
                .finish(),
            other => f.write_str(other.name()),
        }
    }
}

/// One step of a data graph
///
/// Sources are declared by the builder; the subscriber lists are their
/// mirror image and are filled when the graph is built.
pub struct GraphNode<D: Payload> {
    pub(crate) id: NodeId,
    pub(crate) label: Option<String>,
    pub(crate) sources: Vec<SubscribedTo>,
    pub(crate) train_only_sources: Vec<SubscribedTo>,
    pub(crate) subscribers: Vec<Subscription>,
    pub(crate) train_only_subscribers: Vec<Subscription>,
    pub(crate) description: TransformDescription,
    pub(crate) kind: NodeKind<D>,
}

impl<D: Payload> GraphNode<D> {
    pub(crate) fn new(id: NodeId, kind: NodeKind<D>, description: TransformDescription) -> Self {
        Self {
            id,
            label: None,
            sources: Vec::new(),
            train_only_sources: Vec::new(),
            subscribers: Vec::new(),
            train_only_subscribers: Vec::new(),
            description,
            kind,
        }
    }

    pub(crate) fn with_source(mut self, source: NodeId, sub_id: usize) -> Self {
        self.sources.push(SubscribedTo { source, sub_id });
        self
    }

    pub(crate) fn with_train_only_source(mut self, source: NodeId, sub_id: usize) -> Self {
        self.train_only_sources
            .push(SubscribedTo { source, sub_id });
        self
    }

    /// Node id
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Label, if one was set
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Inputs used in every mode
    #[must_use]
    pub fn sources(&self) -> &[SubscribedTo] {
        &self.sources
    }

    /// Inputs used only when training
    #[must_use]
    pub fn train_only_sources(&self) -> &[SubscribedTo] {
        &self.train_only_sources
    }

    /// Receivers in every mode
    #[must_use]
    pub fn subscribers(&self) -> &[Subscription] {
        &self.subscribers
    }

    /// Receivers only when training
    #[must_use]
    pub fn train_only_subscribers(&self) -> &[Subscription] {
        &self.train_only_subscribers
    }

    /// Inputs active in `mode`
    pub fn sources_for(&self, mode: ExecutionMode) -> impl Iterator<Item = &SubscribedTo> {
        let train_only: &[SubscribedTo] = if mode.follows_train_only() {
            &self.train_only_sources
        } else {
            &[]
        };
        self.sources.iter().chain(train_only)
    }

    /// Receivers active in `mode`
    pub fn subscribers_for(&self, mode: ExecutionMode) -> impl Iterator<Item = &Subscription> {
        let train_only: &[Subscription] = if mode.follows_train_only() {
            &self.train_only_subscribers
        } else {
            &[]
        };
        self.subscribers.iter().chain(train_only)
    }

    /// Number of declared inputs, regular and train-only
    #[must_use]
    pub fn input_count(&self) -> usize {
        self.sources.len() + self.train_only_sources.len()
    }

    /// What the node's output contains
    #[must_use]
    pub fn description(&self) -> &TransformDescription {
        &self.description
    }

    /// What the node computes
    #[must_use]
    pub fn kind(&self) -> &NodeKind<D> {
        &self.kind
    }

    /// Whether this is the graph's source
    #[must_use]
    pub fn is_source(&self) -> bool {
        self.kind.is_source()
    }
}

impl<D: Payload> std::fmt::Debug for GraphNode<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphNode")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("sources", &self.sources)
            .field("train_only_sources", &self.train_only_sources)
            .field("subscribers", &self.subscribers)
            .field("train_only_subscribers", &self.train_only_subscribers)
            .finish()
    }
}
