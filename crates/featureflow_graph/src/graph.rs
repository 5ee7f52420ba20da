//! Data graph and its builder.
//!
//! Nodes only declare where their inputs come from. [`GraphBuilder::build`]
//! checks the declarations, then walks backwards from the result and fills
//! every node's subscriber lists. During that walk a node whose consumers
//! are all train-only has its own inputs demoted to train-only, so whole
//! branches that only feed training drop out of the inference sub-graph.

use crate::node::{
    GraphNode, MAIN_DS_ID, NodeKind, SubscribedTo, Subscription, TARGET_DS_ID, TargetSource,
};
use crate::topo::TopoSorter;
use crate::transform::{
    LearningTransform, MultiTransform, Payload, SingleTransform, SupervisedTransform,
};
use crate::validate;
use featureflow_core::{
    ColumnId, ExecutionMode, GraphError, GraphResult, NodeId, TransformDescription,
};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// An immutable graph of transforms
///
/// Built once and shared between any number of concurrent invocations.
pub struct DataGraph<D: Payload> {
    nodes: Vec<GraphNode<D>>,
    source: NodeId,
    result: NodeId,
    labels: IndexMap<String, NodeId>,
}

impl<D: Payload> DataGraph<D> {
    /// Start building a graph
    #[must_use]
    pub fn builder() -> GraphBuilder<D> {
        GraphBuilder::new()
    }

    /// Id of the source node
    #[must_use]
    pub fn source(&self) -> NodeId {
        self.source
    }

    /// Id of the result node
    #[must_use]
    pub fn result(&self) -> NodeId {
        self.result
    }

    /// All nodes, indexed by id
    #[must_use]
    pub fn nodes(&self) -> &[GraphNode<D>] {
        &self.nodes
    }

    /// Number of nodes
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes (never true for a built graph)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node
    ///
    /// # Errors
    ///
    /// Returns error if the id is out of range
    pub fn node(&self, id: NodeId) -> GraphResult<&GraphNode<D>> {
        self.nodes
            .get(id.index())
            .ok_or(GraphError::MissingNode { id })
    }

    /// The source node
    #[must_use]
    pub fn source_node(&self) -> &GraphNode<D> {
        &self.nodes[self.source.index()]
    }

    /// The result node
    #[must_use]
    pub fn result_node(&self) -> &GraphNode<D> {
        &self.nodes[self.result.index()]
    }

    /// What the graph's output contains
    #[must_use]
    pub fn description(&self) -> &TransformDescription {
        self.result_node().description()
    }

    /// Node carrying `label`
    #[must_use]
    pub fn node_by_label(&self, label: &str) -> Option<NodeId> {
        self.labels.get(label).copied()
    }

    /// All labels, in the order they were set
    pub fn labels(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.labels.iter().map(|(label, id)| (label.as_str(), *id))
    }

    /// Columns the caller must supply in `mode`
    ///
    /// Empty for a data-set source, which accepts any input.
    #[must_use]
    pub fn input_columns(&self, mode: ExecutionMode) -> Vec<&ColumnId> {
        let source = self.source_node();
        match source.kind() {
            NodeKind::Source { train_only_columns } if !mode.follows_train_only() => source
                .description()
                .columns()
                .iter()
                .filter(|c| !train_only_columns.contains(*c))
                .collect(),
            NodeKind::Source { .. } => source.description().columns().iter().collect(),
            _ => Vec::new(),
        }
    }
}

impl<D: Payload> std::fmt::Debug for DataGraph<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataGraph")
            .field("source", &self.source)
            .field("result", &self.result)
            .field("nodes", &self.nodes)
            .field("labels", &self.labels)
            .finish()
    }
}

/// Accumulates nodes for a [`DataGraph`]
///
/// Ids handed out by the builder can be used as sources right away;
/// references are only checked by [`GraphBuilder::build`].
pub struct GraphBuilder<D: Payload> {
    nodes: Vec<GraphNode<D>>,
    source: Option<NodeId>,
    result: Option<NodeId>,
    labels: IndexMap<String, NodeId>,
}

impl<D: Payload> GraphBuilder<D> {
    /// Create an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            source: None,
            result: None,
            labels: IndexMap::new(),
        }
    }

    fn next_id(&self) -> NodeId {
        NodeId::from_index(self.nodes.len())
    }

    fn push(&mut self, node: GraphNode<D>) -> NodeId {
        let id = node.id;
        debug!(node = %id, kind = node.kind.name(), "adding node");
        self.nodes.push(node);
        id
    }

    fn set_source(&mut self, node: GraphNode<D>) -> GraphResult<NodeId> {
        if let Some(existing) = self.source {
            return Err(GraphError::SourceAlreadySet { existing });
        }
        let id = self.push(node);
        self.source = Some(id);
        Ok(id)
    }

    /// Declare the source with its columns
    ///
    /// `train_only_columns` are only present in training input, for example
    /// the target of a supervised transform.
    ///
    /// # Errors
    ///
    /// Returns error if a source already exists or a column name repeats
    pub fn source(
        &mut self,
        columns: Vec<ColumnId>,
        train_only_columns: Vec<ColumnId>,
    ) -> GraphResult<NodeId> {
        let all = columns
            .into_iter()
            .chain(train_only_columns.iter().cloned())
            .collect();
        let description = TransformDescription::from_columns(all)?;
        let kind = NodeKind::Source { train_only_columns };
        let node = GraphNode::new(self.next_id(), kind, description);
        self.set_source(node)
    }

    /// Declare a source that accepts any input
    ///
    /// # Errors
    ///
    /// Returns error if a source already exists
    pub fn data_set_source(&mut self) -> GraphResult<NodeId> {
        let description = TransformDescription::empty();
        let node = GraphNode::new(self.next_id(), NodeKind::DataSetSource, description);
        self.set_source(node)
    }

    /// Add a single-input transform
    pub fn add_transform(
        &mut self,
        source: NodeId,
        transform: Arc<dyn SingleTransform<D>>,
    ) -> NodeId {
        let description = transform.description().clone();
        let node = GraphNode::new(self.next_id(), NodeKind::Transform(transform), description)
            .with_source(source, 0);
        self.push(node)
    }

    /// Add a transform that is trained on its input
    pub fn add_learning(
        &mut self,
        source: NodeId,
        transform: Arc<dyn LearningTransform<D>>,
    ) -> NodeId {
        let description = transform.description().clone();
        let node = GraphNode::new(self.next_id(), NodeKind::Learning(transform), description)
            .with_source(source, 0);
        self.push(node)
    }

    /// Add a transform trained from `main` and `target`
    ///
    /// The target is only needed for training, so it is a train-only input.
    /// When `main` and `target` are the same node there is no second input.
    pub fn add_supervised(
        &mut self,
        main: NodeId,
        target: NodeId,
        transform: Arc<dyn SupervisedTransform<D>>,
    ) -> NodeId {
        let description = transform.description().clone();
        let id = self.next_id();
        let node = if main == target {
            debug!(node = %id, "main and target are the same node; no train-only input");
            let kind = NodeKind::Supervised {
                transform,
                target: TargetSource::SameAsMain,
            };
            GraphNode::new(id, kind, description).with_source(main, MAIN_DS_ID)
        } else {
            let kind = NodeKind::Supervised {
                transform,
                target: TargetSource::Separate,
            };
            GraphNode::new(id, kind, description)
                .with_source(main, MAIN_DS_ID)
                .with_train_only_source(target, TARGET_DS_ID)
        };
        self.push(node)
    }

    /// Add a transform over several inputs
    ///
    /// The transform receives its inputs in the order of `sources`.
    ///
    /// # Errors
    ///
    /// Returns error if `sources` is empty
    pub fn merge(
        &mut self,
        sources: &[NodeId],
        transform: Arc<dyn MultiTransform<D>>,
    ) -> GraphResult<NodeId> {
        if sources.is_empty() {
            return Err(GraphError::EmptyMerge);
        }
        let description = transform.description().clone();
        let mut node = GraphNode::new(self.next_id(), NodeKind::Merge(transform), description);
        node.sources = sources
            .iter()
            .enumerate()
            .map(|(sub_id, source)| SubscribedTo {
                source: *source,
                sub_id,
            })
            .collect();
        Ok(self.push(node))
    }

    /// Attach a label to a node, replacing any label it had
    ///
    /// # Errors
    ///
    /// Returns error if the node does not exist or another node already
    /// carries the label
    pub fn set_label(&mut self, node: NodeId, label: impl Into<String>) -> GraphResult<()> {
        let label = label.into();
        if let Some(&existing) = self.labels.get(&label) {
            if existing == node {
                return Ok(());
            }
            return Err(GraphError::DuplicateLabel { label, existing });
        }

        let target = self
            .nodes
            .get_mut(node.index())
            .ok_or(GraphError::MissingNode { id: node })?;
        if let Some(old) = target.label.replace(label.clone()) {
            self.labels.shift_remove(&old);
        }
        self.labels.insert(label, node);
        Ok(())
    }

    /// Designate the node whose output is the graph's output
    pub fn set_result(&mut self, node: NodeId) {
        self.result = Some(node);
    }

    /// Check the declarations and freeze the graph
    ///
    /// # Errors
    ///
    /// Returns error if the source or result is missing, a source reference
    /// is dangling, or the nodes contain a cycle
    pub fn build(self) -> GraphResult<DataGraph<D>> {
        let Self {
            mut nodes,
            source,
            result,
            labels,
        } = self;

        let source = source.ok_or(GraphError::MissingSource)?;
        let result = result.ok_or(GraphError::MissingResult)?;
        if result.index() >= nodes.len() {
            return Err(GraphError::MissingNode { id: result });
        }

        validate::check_references(&nodes)?;
        validate::check_acyclic(&nodes)?;

        let order = {
            let mut sorter = TopoSorter::new(nodes.len(), |id: NodeId| {
                nodes[id.index()]
                    .sources_for(ExecutionMode::TrainTransform)
                    .map(|s| s.source)
                    .collect::<Vec<_>>()
            });
            sorter.visit(result)?;
            sorter.into_order()
        };
        link_subscribers(&mut nodes, &order);

        for id in validate::unreached(nodes.len(), &order) {
            warn!(node = %id, "node does not contribute to the result and will never run");
        }

        debug!(nodes = nodes.len(), source = %source, result = %result, "data graph built");
        Ok(DataGraph {
            nodes,
            source,
            result,
            labels,
        })
    }
}

impl<D: Payload> Default for GraphBuilder<D> {
    fn default() -> Self {
        Self::new()
    }
}

/// Fill subscriber lists from source lists
///
/// `order` must list every consumer before its producers, so that a
/// node's subscribers are complete when the node is reached.
fn link_subscribers<D: Payload>(nodes: &mut [GraphNode<D>], order: &[NodeId]) {
    for &id in order {
        let node = &mut nodes[id.index()];
        if node.subscribers.is_empty()
            && !node.train_only_subscribers.is_empty()
            && !node.sources.is_empty()
        {
            debug!(node = %id, "only train-only consumers; demoting inputs to train-only");
            let demoted = std::mem::take(&mut node.sources);
            node.train_only_sources.extend(demoted);
        }

        let regular = node.sources.clone();
        let train_only = node.train_only_sources.clone();
        for input in regular {
            nodes[input.source.index()].subscribers.push(Subscription {
                subscriber: id,
                sub_id: input.sub_id,
            });
        }
        for input in train_only {
            nodes[input.source.index()].train_only_subscribers.push(Subscription {
                subscriber: id,
                sub_id: input.sub_id,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{build_random_dag, dag_strategy, linear_graph, AddConstant, Concat};
    use proptest::prelude::*;

    fn has_subscriber(list: &[Subscription], subscriber: NodeId, sub_id: usize) -> bool {
        list.contains(&Subscription { subscriber, sub_id })
    }

    #[test]
    fn test_build_linear() {
        let (graph, ids) = linear_graph(&[11, 12, 88]);
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.source(), ids[0]);
        assert_eq!(graph.result(), ids[3]);

        for pair in ids.windows(2) {
            let producer = graph.node(pair[0]).unwrap();
            assert!(has_subscriber(producer.subscribers(), pair[1], 0));
            assert!(producer.train_only_subscribers().is_empty());
        }
        assert!(graph.result_node().subscribers().is_empty());
    }

    #[test]
    fn test_missing_source() {
        let mut builder = GraphBuilder::<i64>::new();
        builder.set_result(NodeId::from_index(0));
        assert!(matches!(builder.build(), Err(GraphError::MissingSource)));
    }

    #[test]
    fn test_missing_result() {
        let mut builder = GraphBuilder::<i64>::new();
        builder.data_set_source().unwrap();
        assert!(matches!(builder.build(), Err(GraphError::MissingResult)));
    }

    #[test]
    fn test_result_out_of_range() {
        let mut builder = GraphBuilder::<i64>::new();
        builder.data_set_source().unwrap();
        builder.set_result(NodeId::from_index(4));
        assert!(matches!(builder.build(), Err(GraphError::MissingNode { .. })));
    }

    #[test]
    fn test_source_already_set() {
        let mut builder = GraphBuilder::<i64>::new();
        let first = builder.data_set_source().unwrap();
        let second = builder.source(vec![ColumnId::of::<i64>("x")], Vec::new());
        assert!(
            matches!(second, Err(GraphError::SourceAlreadySet { existing }) if existing == first)
        );
    }

    #[test]
    fn test_source_duplicate_column() {
        let mut builder = GraphBuilder::<i64>::new();
        let result = builder.source(
            vec![ColumnId::of::<i64>("x")],
            vec![ColumnId::of::<bool>("x")],
        );
        assert!(matches!(result, Err(GraphError::DuplicateColumn { .. })));
    }

    #[test]
    fn test_dangling_source() {
        let mut builder = GraphBuilder::<i64>::new();
        builder.data_set_source().unwrap();
        let t = builder.add_transform(NodeId::from_index(9), Arc::new(AddConstant::new(1)));
        builder.set_result(t);
        assert!(matches!(builder.build(), Err(GraphError::MissingNode { id }) if id.index() == 9));
    }

    #[test]
    fn test_cycle_fails_build() {
        // a reads from b, which is added afterwards and reads from a
        let mut builder = GraphBuilder::<i64>::new();
        let source = builder.data_set_source().unwrap();
        let a = builder.add_transform(NodeId::from_index(2), Arc::new(AddConstant::new(1)));
        let b = builder.add_transform(a, Arc::new(AddConstant::new(2)));
        assert_eq!(b.index(), 2);
        let merged = builder
            .merge(&[source, b], Arc::new(Concat::default()))
            .unwrap();
        builder.set_result(merged);

        let err = builder.build().unwrap_err();
        assert!(matches!(err, GraphError::Cycle { .. }));
        assert!(err.is_construction_error());
    }

    #[test]
    fn test_empty_merge() {
        let mut builder = GraphBuilder::<i64>::new();
        builder.data_set_source().unwrap();
        let result = builder.merge(&[], Arc::new(Concat::default()));
        assert!(matches!(result, Err(GraphError::EmptyMerge)));
    }

    #[test]
    fn test_merge_sub_ids_follow_order() {
        let mut builder = GraphBuilder::<i64>::new();
        let source = builder.data_set_source().unwrap();
        let a = builder.add_transform(source, Arc::new(AddConstant::new(1)));
        let b = builder.add_transform(source, Arc::new(AddConstant::new(2)));
        let merged = builder.merge(&[b, a], Arc::new(Concat::default())).unwrap();
        builder.set_result(merged);
        let graph = builder.build().unwrap();

        let node = graph.node(merged).unwrap();
        let from = |source, sub_id| SubscribedTo { source, sub_id };
        assert_eq!(node.sources(), &[from(b, 0), from(a, 1)]);
        assert!(has_subscriber(graph.node(b).unwrap().subscribers(), merged, 0));
        assert!(has_subscriber(graph.node(a).unwrap().subscribers(), merged, 1));
    }

    #[test]
    fn test_labels() {
        let mut builder = GraphBuilder::<i64>::new();
        let source = builder.data_set_source().unwrap();
        let a = builder.add_transform(source, Arc::new(AddConstant::new(1)));
        builder.set_label(a, "first").unwrap();
        builder.set_label(a, "first").unwrap();

        let dup = builder.set_label(source, "first");
        assert!(matches!(dup, Err(GraphError::DuplicateLabel { existing, .. }) if existing == a));
        assert!(matches!(
            builder.set_label(NodeId::from_index(5), "x"),
            Err(GraphError::MissingNode { .. })
        ));

        builder.set_label(a, "renamed").unwrap();
        builder.set_result(a);
        let graph = builder.build().unwrap();

        assert_eq!(graph.node_by_label("renamed"), Some(a));
        assert_eq!(graph.node_by_label("first"), None);
        assert_eq!(graph.node(a).unwrap().label(), Some("renamed"));
        assert_eq!(graph.labels().count(), 1);
    }

    #[test]
    fn test_supervised_same_source() {
        let mut builder = GraphBuilder::<i64>::new();
        let source = builder.data_set_source().unwrap();
        let sup = builder.add_supervised(source, source, Arc::new(AddConstant::new(1)));
        builder.set_result(sup);
        let graph = builder.build().unwrap();

        let node = graph.node(sup).unwrap();
        assert!(node.train_only_sources().is_empty());
        assert!(matches!(
            node.kind(),
            NodeKind::Supervised {
                target: TargetSource::SameAsMain,
                ..
            }
        ));
        assert!(has_subscriber(graph.source_node().subscribers(), sup, MAIN_DS_ID));
    }

    #[test]
    fn test_supervised_separate_target_is_train_only() {
        let mut builder = GraphBuilder::<i64>::new();
        let source = builder.data_set_source().unwrap();
        let main = builder.add_transform(source, Arc::new(AddConstant::new(1)));
        let target = builder.add_transform(source, Arc::new(AddConstant::new(2)));
        let sup = builder.add_supervised(main, target, Arc::new(AddConstant::new(3)));
        builder.set_result(sup);
        let graph = builder.build().unwrap();

        let node = graph.node(sup).unwrap();
        let main_input = SubscribedTo {
            source: main,
            sub_id: MAIN_DS_ID,
        };
        assert_eq!(node.sources(), &[main_input]);
        assert_eq!(
            node.train_only_sources(),
            &[SubscribedTo {
                source: target,
                sub_id: TARGET_DS_ID
            }]
        );
        let target_subscribers = graph.node(target).unwrap().train_only_subscribers();
        assert!(has_subscriber(target_subscribers, sup, TARGET_DS_ID));

        // target only feeds training, so its own input becomes train-only
        let target_node = graph.node(target).unwrap();
        assert!(target_node.sources().is_empty());
        assert_eq!(target_node.train_only_sources().len(), 1);
        assert!(has_subscriber(graph.source_node().train_only_subscribers(), target, 0));
        assert!(!has_subscriber(graph.source_node().subscribers(), target, 0));
    }

    #[test]
    fn test_demotion_cascades() {
        // source -> t1 -> t2 -> (target of) sup; source -> sup (main)
        let mut builder = GraphBuilder::<i64>::new();
        let source = builder.data_set_source().unwrap();
        let t1 = builder.add_transform(source, Arc::new(AddConstant::new(1)));
        let t2 = builder.add_transform(t1, Arc::new(AddConstant::new(2)));
        let sup = builder.add_supervised(source, t2, Arc::new(AddConstant::new(3)));
        builder.set_result(sup);
        let graph = builder.build().unwrap();

        for id in [t1, t2] {
            let node = graph.node(id).unwrap();
            assert!(node.sources().is_empty(), "{} should only have train-only inputs", id);
            assert!(node.subscribers().is_empty());
        }
        assert!(has_subscriber(graph.node(t1).unwrap().train_only_subscribers(), t2, 0));
        assert_eq!(graph.source_node().subscribers().len(), 1);
        assert_eq!(graph.source_node().train_only_subscribers().len(), 1);
    }

    #[test]
    fn test_shared_node_is_not_demoted() {
        // t1 feeds both the result (regular) and the target of sup
        let mut builder = GraphBuilder::<i64>::new();
        let source = builder.data_set_source().unwrap();
        let t1 = builder.add_transform(source, Arc::new(AddConstant::new(1)));
        let sup = builder.add_supervised(source, t1, Arc::new(AddConstant::new(3)));
        let merged = builder
            .merge(&[sup, t1], Arc::new(Concat::default()))
            .unwrap();
        builder.set_result(merged);
        let graph = builder.build().unwrap();

        let node = graph.node(t1).unwrap();
        assert_eq!(node.sources().len(), 1);
        assert!(has_subscriber(node.subscribers(), merged, 1));
        assert!(has_subscriber(node.train_only_subscribers(), sup, TARGET_DS_ID));
    }

    #[test]
    fn test_unused_node_gets_no_links() {
        let mut builder = GraphBuilder::<i64>::new();
        let source = builder.data_set_source().unwrap();
        let used = builder.add_transform(source, Arc::new(AddConstant::new(1)));
        let unused = builder.add_transform(source, Arc::new(AddConstant::new(2)));
        builder.set_result(used);
        let graph = builder.build().unwrap();

        assert!(has_subscriber(graph.source_node().subscribers(), used, 0));
        assert!(!has_subscriber(graph.source_node().subscribers(), unused, 0));
        assert_eq!(graph.node(unused).unwrap().sources().len(), 1);
    }

    #[test]
    fn test_source_as_result() {
        let mut builder = GraphBuilder::<i64>::new();
        let source = builder.data_set_source().unwrap();
        builder.set_result(source);
        let graph = builder.build().unwrap();
        assert_eq!(graph.source(), graph.result());
        assert!(graph.source_node().subscribers().is_empty());
    }

    #[test]
    fn test_input_columns() {
        let mut builder = GraphBuilder::<i64>::new();
        let source = builder
            .source(
                vec![ColumnId::of::<String>("text")],
                vec![ColumnId::of::<bool>("label")],
            )
            .unwrap();
        builder.set_result(source);
        let graph = builder.build().unwrap();

        let inference: Vec<_> = graph
            .input_columns(ExecutionMode::Transform)
            .into_iter()
            .map(ColumnId::name)
            .collect();
        assert_eq!(inference, vec!["text"]);
        assert_eq!(graph.input_columns(ExecutionMode::TrainTransform).len(), 2);
        assert_eq!(graph.description().columns().len(), 2);
    }

    #[test]
    fn test_description_from_transform() {
        let (graph, _) = linear_graph(&[1]);
        assert!(graph.description().contains_column("value"));
    }

    proptest! {
        #[test]
        fn prop_subscribers_mirror_sources(inputs in dag_strategy()) {
            let (graph, _) = build_random_dag(&inputs);
            for node in graph.nodes() {
                for input in node.sources() {
                    let producer = graph.node(input.source).unwrap();
                    prop_assert!(has_subscriber(producer.subscribers(), node.id(), input.sub_id));
                }
                for sub in node.subscribers() {
                    let consumer = graph.node(sub.subscriber).unwrap();
                    let expected = SubscribedTo {
                        source: node.id(),
                        sub_id: sub.sub_id,
                    };
                    prop_assert!(consumer.sources().contains(&expected));
                }
            }
        }
    }
}
