//! Node managers, one per node variant and mode.
//!
//! | node                      | transform            | train_transform              |
//! |---------------------------|----------------------|------------------------------|
//! | source                    | [`SourceManager`]    | [`SourceManager`]            |
//! | transform                 | single input         | single input                 |
//! | learning                  | single input         | single input, trains         |
//! | merge                     | [`MergeManager`]     | [`MergeManager`]             |
//! | supervised, same target   | single input         | single input, trains on x, x |
//! | supervised, other target  | single input         | [`TrainingManager`]          |

use crate::fan_in::FanIn;
use crate::protocol::{ExecutionProtocol, NodeExecutionManager, NodeFuture, notify_ready};
use featureflow_core::{BoxError, ExecutionMode, GraphError, GraphResult, NodeId};
use featureflow_graph::{
    GraphNode, LearningTransform, MAIN_DS_ID, MultiTransform, NodeKind, Payload, SingleTransform,
    SupervisedTransform, TARGET_DS_ID, TargetSource, TransformResult,
};
use futures::FutureExt;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Builds the manager a node needs for one invocation
pub trait ManagerFactory<D: Payload> {
    /// Manager for `mode`, reporting readiness to `parent`
    fn execution_manager(
        &self,
        parent: Weak<dyn ExecutionProtocol<D>>,
        mode: ExecutionMode,
    ) -> Arc<dyn NodeExecutionManager<D>>;
}

impl<D: Payload> ManagerFactory<D> for GraphNode<D> {
    fn execution_manager(
        &self,
        parent: Weak<dyn ExecutionProtocol<D>>,
        mode: ExecutionMode,
    ) -> Arc<dyn NodeExecutionManager<D>> {
        let id = self.id();
        let train = mode.follows_train_only();
        match self.kind() {
            NodeKind::Source { .. } | NodeKind::DataSetSource => Arc::new(SourceManager::new(id)),
            NodeKind::Transform(t) => {
                Arc::new(SingleInputManager::new(id, SingleOp::Transform(Arc::clone(t)), parent))
            }
            NodeKind::Learning(t) => Arc::new(SingleInputManager::new(
                id,
                SingleOp::Learning {
                    transform: Arc::clone(t),
                    train,
                },
                parent,
            )),
            NodeKind::Merge(t) => {
                Arc::new(MergeManager::new(id, Arc::clone(t), self.input_count(), parent))
            }
            NodeKind::Supervised { transform, target } => match (train, target) {
                (true, TargetSource::Separate) => {
                    Arc::new(TrainingManager::new(id, Arc::clone(transform), parent))
                }
                (train, _) => Arc::new(SingleInputManager::new(
                    id,
                    SingleOp::Supervised {
                        transform: Arc::clone(transform),
                        train,
                    },
                    parent,
                )),
            },
        }
    }
}

fn transform_failed(node: NodeId) -> impl FnOnce(BoxError) -> GraphError {
    move |source| GraphError::Transform { node, source }
}

/// The graph source; its data is injected by the execution itself
pub struct SourceManager {
    node: NodeId,
}

impl SourceManager {
    /// Create a manager for the source `node`
    #[must_use]
    pub fn new(node: NodeId) -> Self {
        Self { node }
    }
}

impl<D: Payload> NodeExecutionManager<D> for SourceManager {
    fn node_id(&self) -> NodeId {
        self.node
    }

    fn on_data_available(self: Arc<Self>, _sub_id: usize, _data: Arc<D>) -> GraphResult<()> {
        Err(GraphError::SourceExecuted { node: self.node })
    }

    fn run(&self) -> NodeFuture<D> {
        futures::future::ready(Err(GraphError::SourceExecuted { node: self.node })).boxed()
    }
}

/// What a single-input node does with its input
pub enum SingleOp<D: Payload> {
    /// Plain transform
    Transform(Arc<dyn SingleTransform<D>>),
    /// Learning transform, training when `train` is set
    Learning {
        /// The transform
        transform: Arc<dyn LearningTransform<D>>,
        /// Call `train_transform` instead of `transform`
        train: bool,
    },
    /// Supervised transform; when training, the input is also the target
    Supervised {
        /// The transform
        transform: Arc<dyn SupervisedTransform<D>>,
        /// Call `train_transform(input, input)` instead of `transform`
        train: bool,
    },
}

impl<D: Payload> SingleOp<D> {
    fn apply(&self, input: Arc<D>) -> futures::future::BoxFuture<'static, TransformResult<D>> {
        match self {
            Self::Transform(t) => {
                let t = Arc::clone(t);
                async move { t.transform(input).await }.boxed()
            }
            Self::Learning { transform, train } => {
                let t = Arc::clone(transform);
                let train = *train;
                async move {
                    if train {
                        t.train_transform(input).await
                    } else {
                        t.transform(input).await
                    }
                }
                .boxed()
            }
            Self::Supervised { transform, train } => {
                let t = Arc::clone(transform);
                let train = *train;
                async move {
                    if train {
                        t.train_transform(Arc::clone(&input), input).await
                    } else {
                        t.transform(input).await
                    }
                }
                .boxed()
            }
        }
    }
}

/// Node that runs as soon as its one input arrives
pub struct SingleInputManager<D: Payload> {
    node: NodeId,
    op: SingleOp<D>,
    input: FanIn<D>,
    parent: Weak<dyn ExecutionProtocol<D>>,
}

impl<D: Payload> SingleInputManager<D> {
    /// Create a manager for `node`
    #[must_use]
    pub fn new(node: NodeId, op: SingleOp<D>, parent: Weak<dyn ExecutionProtocol<D>>) -> Self {
        Self {
            node,
            op,
            input: FanIn::new(node, 1),
            parent,
        }
    }
}

impl<D: Payload> NodeExecutionManager<D> for SingleInputManager<D> {
    fn node_id(&self) -> NodeId {
        self.node
    }

    fn on_data_available(self: Arc<Self>, sub_id: usize, data: Arc<D>) -> GraphResult<()> {
        debug!(node = %self.node, sub_id, "data available");
        if self.input.deliver(sub_id, data)? {
            let parent = self.parent.clone();
            notify_ready(&parent, self);
        }
        Ok(())
    }

    fn run(&self) -> NodeFuture<D> {
        let node = self.node;
        match self.input.take(0) {
            Ok(input) => self
                .op
                .apply(input)
                .map(move |r| r.map_err(transform_failed(node)))
                .boxed(),
            Err(err) => futures::future::ready(Err(err)).boxed(),
        }
    }
}

/// Node with several ordered inputs
pub struct MergeManager<D: Payload> {
    node: NodeId,
    transform: Arc<dyn MultiTransform<D>>,
    inputs: FanIn<D>,
    parent: Weak<dyn ExecutionProtocol<D>>,
}

impl<D: Payload> MergeManager<D> {
    /// Create a manager expecting `inputs` deliveries
    #[must_use]
    pub fn new(
        node: NodeId,
        transform: Arc<dyn MultiTransform<D>>,
        inputs: usize,
        parent: Weak<dyn ExecutionProtocol<D>>,
    ) -> Self {
        Self {
            node,
            transform,
            inputs: FanIn::new(node, inputs),
            parent,
        }
    }
}

impl<D: Payload> NodeExecutionManager<D> for MergeManager<D> {
    fn node_id(&self) -> NodeId {
        self.node
    }

    fn on_data_available(self: Arc<Self>, sub_id: usize, data: Arc<D>) -> GraphResult<()> {
        let ready = self.inputs.deliver(sub_id, data)?;
        debug!(
            node = %self.node,
            sub_id,
            filled = self.inputs.filled(),
            expected = self.inputs.len(),
            "data available"
        );
        if ready {
            let parent = self.parent.clone();
            notify_ready(&parent, self);
        }
        Ok(())
    }

    fn run(&self) -> NodeFuture<D> {
        let node = self.node;
        let transform = Arc::clone(&self.transform);
        match self.inputs.take_all() {
            Ok(inputs) => async move {
                transform
                    .transform(inputs)
                    .await
                    .map_err(transform_failed(node))
            }
            .boxed(),
            Err(err) => futures::future::ready(Err(err)).boxed(),
        }
    }
}

/// Supervised node in training with a separate target input
pub struct TrainingManager<D: Payload> {
    node: NodeId,
    transform: Arc<dyn SupervisedTransform<D>>,
    inputs: FanIn<D>,
    parent: Weak<dyn ExecutionProtocol<D>>,
}

impl<D: Payload> TrainingManager<D> {
    /// Create a manager waiting for main and target
    #[must_use]
    pub fn new(
        node: NodeId,
        transform: Arc<dyn SupervisedTransform<D>>,
        parent: Weak<dyn ExecutionProtocol<D>>,
    ) -> Self {
        Self {
            node,
            transform,
            inputs: FanIn::new(node, 2),
            parent,
        }
    }
}

impl<D: Payload> NodeExecutionManager<D> for TrainingManager<D> {
    fn node_id(&self) -> NodeId {
        self.node
    }

    fn on_data_available(self: Arc<Self>, sub_id: usize, data: Arc<D>) -> GraphResult<()> {
        debug!(node = %self.node, sub_id, "training data available");
        if self.inputs.deliver(sub_id, data)? {
            let parent = self.parent.clone();
            notify_ready(&parent, self);
        }
        Ok(())
    }

    fn run(&self) -> NodeFuture<D> {
        let node = self.node;
        let transform = Arc::clone(&self.transform);
        let inputs = self
            .inputs
            .take(MAIN_DS_ID)
            .and_then(|main| Ok((main, self.inputs.take(TARGET_DS_ID)?)));
        match inputs {
            Ok((main, target)) => async move {
                transform
                    .train_transform(main, target)
                    .await
                    .map_err(transform_failed(node))
            }
            .boxed(),
            Err(err) => futures::future::ready(Err(err)).boxed(),
        }
    }
}
