//! Topological ordering of data graphs.
//!
//! All four sorts are the same depth-first search; they differ only in
//! which edges are followed and where the walk starts. Forward sorts start
//! at the source and follow subscribers, backward sorts start at the
//! result and follow sources. The `with_train` variants also follow
//! train-only edges.

use crate::graph::DataGraph;
use crate::node::GraphNode;
use crate::transform::Payload;
use featureflow_core::{ExecutionMode, GraphError, GraphResult, NodeId};

/// Depth-first sorter over an arbitrary neighbor relation
///
/// Every node is emitted before all nodes reachable from it. A node
/// reached again while it is still being visited closes a cycle.
pub struct TopoSorter<F> {
    neighbors: F,
    visiting: Vec<bool>,
    done: Vec<bool>,
    postorder: Vec<NodeId>,
}

impl<F, I> TopoSorter<F>
where
    F: FnMut(NodeId) -> I,
    I: IntoIterator<Item = NodeId>,
{
    /// Create a sorter for `node_count` nodes
    #[must_use]
    pub fn new(node_count: usize, neighbors: F) -> Self {
        Self {
            neighbors,
            visiting: vec![false; node_count],
            done: vec![false; node_count],
            postorder: Vec::with_capacity(node_count),
        }
    }

    /// Visit everything reachable from `start`
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Cycle`] if a cycle is reachable and
    /// [`GraphError::MissingNode`] for a neighbor outside the graph
    pub fn visit(&mut self, start: NodeId) -> GraphResult<()> {
        self.check_bounds(start)?;
        if self.done[start.index()] {
            return Ok(());
        }

        self.visiting[start.index()] = true;
        let mut stack = vec![(start, self.expand(start))];

        while let Some(top) = stack.last_mut() {
            let current = top.0;
            match top.1.next() {
                Some(next) => {
                    self.check_bounds(next)?;
                    if self.visiting[next.index()] {
                        return Err(GraphError::Cycle { node: next });
                    }
                    if !self.done[next.index()] {
                        self.visiting[next.index()] = true;
                        let pending = self.expand(next);
                        stack.push((next, pending));
                    }
                }
                None => {
                    stack.pop();
                    self.visiting[current.index()] = false;
                    self.done[current.index()] = true;
                    self.postorder.push(current);
                }
            }
        }

        Ok(())
    }

    /// Whether `node` has been emitted
    #[must_use]
    pub fn is_visited(&self, node: NodeId) -> bool {
        self.done.get(node.index()).copied().unwrap_or(false)
    }

    /// Finish, returning nodes in topological order
    #[must_use]
    pub fn into_order(self) -> Vec<NodeId> {
        let mut order = self.postorder;
        order.reverse();
        order
    }

    fn expand(&mut self, node: NodeId) -> std::vec::IntoIter<NodeId> {
        (self.neighbors)(node)
            .into_iter()
            .collect::<Vec<_>>()
            .into_iter()
    }

    fn check_bounds(&self, node: NodeId) -> GraphResult<()> {
        if node.index() >= self.done.len() {
            return Err(GraphError::MissingNode { id: node });
        }
        Ok(())
    }
}

fn sort_from<D, F, I>(graph: &DataGraph<D>, start: NodeId, neighbors: F) -> GraphResult<Vec<NodeId>>
where
    D: Payload,
    F: FnMut(&GraphNode<D>) -> I,
    I: IntoIterator<Item = NodeId>,
{
    let nodes = graph.nodes();
    let mut neighbors = neighbors;
    let mut sorter = TopoSorter::new(nodes.len(), |id: NodeId| neighbors(&nodes[id.index()]));
    sorter.visit(start)?;
    Ok(sorter.into_order())
}

/// Forward order over regular edges: source first
///
/// # Errors
///
/// Returns error if the graph has a cycle
pub fn sort<D: Payload>(graph: &DataGraph<D>) -> GraphResult<Vec<NodeId>> {
    sort_from(graph, graph.source(), |n| {
        n.subscribers()
            .iter()
            .map(|s| s.subscriber)
            .collect::<Vec<_>>()
    })
}

/// Forward order over regular and train-only edges: source first
///
/// # Errors
///
/// Returns error if the graph has a cycle
pub fn sort_with_train<D: Payload>(graph: &DataGraph<D>) -> GraphResult<Vec<NodeId>> {
    sort_from(graph, graph.source(), |n| {
        n.subscribers_for(ExecutionMode::TrainTransform)
            .map(|s| s.subscriber)
            .collect::<Vec<_>>()
    })
}

/// Backward order over regular edges: result first
///
/// # Errors
///
/// Returns error if the graph has a cycle
pub fn sort_backwards<D: Payload>(graph: &DataGraph<D>) -> GraphResult<Vec<NodeId>> {
    sort_from(graph, graph.result(), |n| {
        n.sources().iter().map(|s| s.source).collect::<Vec<_>>()
    })
}

/// Backward order over regular and train-only edges: result first
///
/// # Errors
///
/// Returns error if the graph has a cycle
pub fn sort_with_train_backwards<D: Payload>(graph: &DataGraph<D>) -> GraphResult<Vec<NodeId>> {
    sort_from(graph, graph.result(), |n| {
        n.sources_for(ExecutionMode::TrainTransform)
            .map(|s| s.source)
            .collect::<Vec<_>>()
    })
}

/// Forward order of the sub-graph active in `mode`
///
/// # Errors
///
/// Returns error if the graph has a cycle
pub fn sort_for_mode<D: Payload>(
    graph: &DataGraph<D>,
    mode: ExecutionMode,
) -> GraphResult<Vec<NodeId>> {
    match mode {
        ExecutionMode::Transform => sort(graph),
        ExecutionMode::TrainTransform => sort_with_train(graph),
    }
}

/// Forward iterator over regular edges
///
/// Keeps, per node, the number of regular sources not yet emitted, and
/// emits a node once that number reaches zero. Cheaper than [`sort`] but
/// only meaningful on an acyclic graph, which [`DataGraph`] guarantees.
pub struct TopologicalIterator<'a, D: Payload> {
    graph: &'a DataGraph<D>,
    missing_sources: Vec<usize>,
    ready: Vec<NodeId>,
}

impl<'a, D: Payload> TopologicalIterator<'a, D> {
    /// Start at the graph's source
    #[must_use]
    pub fn new(graph: &'a DataGraph<D>) -> Self {
        Self {
            graph,
            missing_sources: graph.nodes().iter().map(|n| n.sources().len()).collect(),
            ready: vec![graph.source()],
        }
    }
}

impl<'a, D: Payload> Iterator for TopologicalIterator<'a, D> {
    type Item = &'a GraphNode<D>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.ready.pop()?;
        let node = &self.graph.nodes()[id.index()];
        for sub in node.subscribers() {
            let missing = &mut self.missing_sources[sub.subscriber.index()];
            *missing = missing.saturating_sub(1);
            if *missing == 0 {
                self.ready.push(sub.subscriber);
            }
        }
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{build_random_dag, dag_strategy, linear_graph, AddConstant, Concat};
    use crate::GraphBuilder;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn position(order: &[NodeId], id: NodeId) -> usize {
        order.iter().position(|n| *n == id).unwrap()
    }

    #[test]
    fn test_sorter_simple_chain() {
        // 0 -> 1 -> 2
        let edges = [vec![1], vec![2], vec![]];
        let mut sorter = TopoSorter::new(3, |id: NodeId| {
            edges[id.index()]
                .iter()
                .map(|i| NodeId::from_index(*i))
                .collect::<Vec<_>>()
        });
        sorter.visit(NodeId::from_index(0)).unwrap();
        let order: Vec<_> = sorter.into_order().iter().map(NodeId::index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_sorter_detects_cycle() {
        // 0 -> 1 -> 2 -> 1
        let edges = [vec![1], vec![2], vec![1]];
        let mut sorter = TopoSorter::new(3, |id: NodeId| {
            edges[id.index()]
                .iter()
                .map(|i| NodeId::from_index(*i))
                .collect::<Vec<_>>()
        });
        let result = sorter.visit(NodeId::from_index(0));
        assert!(matches!(result, Err(GraphError::Cycle { node }) if node == NodeId::from_index(1)));
    }

    #[test]
    fn test_sorter_self_loop() {
        let mut sorter = TopoSorter::new(1, |id: NodeId| vec![id]);
        assert!(sorter.visit(NodeId::from_index(0)).is_err());
    }

    #[test]
    fn test_sorter_out_of_range() {
        let mut sorter = TopoSorter::new(1, |_id: NodeId| vec![NodeId::from_index(5)]);
        let result = sorter.visit(NodeId::from_index(0));
        assert!(matches!(result, Err(GraphError::MissingNode { .. })));
    }

    #[test]
    fn test_sorter_diamond_visits_once() {
        // 0 -> {1, 2} -> 3
        let edges = [vec![1, 2], vec![3], vec![3], vec![]];
        let mut sorter = TopoSorter::new(4, |id: NodeId| {
            edges[id.index()]
                .iter()
                .map(|i| NodeId::from_index(*i))
                .collect::<Vec<_>>()
        });
        sorter.visit(NodeId::from_index(0)).unwrap();
        assert!(sorter.is_visited(NodeId::from_index(3)));
        let order = sorter.into_order();
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], NodeId::from_index(0));
        assert_eq!(order[3], NodeId::from_index(3));
    }

    #[test]
    fn test_sort_linear() {
        let (graph, ids) = linear_graph(&[11, 12, 88]);
        let order = sort(&graph).unwrap();
        assert_eq!(order, ids);

        let backwards = sort_backwards(&graph).unwrap();
        let mut reversed = ids.clone();
        reversed.reverse();
        assert_eq!(backwards, reversed);
    }

    #[test]
    fn test_sort_with_train_includes_train_only_nodes() {
        // source -> a (result); source -> trained; trained -train-> supervised main=a
        let mut builder = GraphBuilder::<i64>::new();
        let source = builder.data_set_source().unwrap();
        let a = builder.add_transform(source, Arc::new(AddConstant::new(1)));
        let target = builder.add_transform(source, Arc::new(AddConstant::new(2)));
        let sup = builder.add_supervised(a, target, Arc::new(AddConstant::new(3)));
        builder.set_result(sup);
        let graph = builder.build().unwrap();

        let regular = sort(&graph).unwrap();
        assert!(!regular.contains(&target));
        assert_eq!(regular.len(), 3);

        let training = sort_with_train(&graph).unwrap();
        assert_eq!(training.len(), 4);
        assert!(position(&training, target) < position(&training, sup));

        assert_eq!(sort_for_mode(&graph, ExecutionMode::TrainTransform).unwrap(), training);
        assert_eq!(sort_with_train_backwards(&graph).unwrap()[0], sup);
    }

    #[test]
    fn test_iterator_merge() {
        let mut builder = GraphBuilder::<i64>::new();
        let source = builder.data_set_source().unwrap();
        let a = builder.add_transform(source, Arc::new(AddConstant::new(1)));
        let b = builder.add_transform(source, Arc::new(AddConstant::new(2)));
        let merged = builder.merge(&[a, b], Arc::new(Concat::default())).unwrap();
        builder.set_result(merged);
        let graph = builder.build().unwrap();

        let order: Vec<_> = TopologicalIterator::new(&graph)
            .map(GraphNode::id)
            .collect();
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], source);
        assert_eq!(order[3], merged);
    }

    proptest! {
        #[test]
        fn prop_sort_respects_sources(inputs in dag_strategy()) {
            let (graph, ids) = build_random_dag(&inputs);
            let order = sort(&graph).unwrap();

            prop_assert_eq!(order.len(), ids.len());
            prop_assert_eq!(order[0], graph.source());
            prop_assert_eq!(*order.last().unwrap(), graph.result());
            for node in graph.nodes() {
                for src in node.sources() {
                    prop_assert!(position(&order, src.source) < position(&order, node.id()));
                }
            }
        }

        #[test]
        fn prop_iterator_matches_sort_constraints(inputs in dag_strategy()) {
            let (graph, ids) = build_random_dag(&inputs);
            let order: Vec<_> = TopologicalIterator::new(&graph)
                .map(GraphNode::id)
                .collect();

            prop_assert_eq!(order.len(), ids.len());
            for node in graph.nodes() {
                for src in node.sources() {
                    prop_assert!(position(&order, src.source) < position(&order, node.id()));
                }
            }
        }

        #[test]
        fn prop_backwards_puts_consumers_first(inputs in dag_strategy()) {
            let (graph, _) = build_random_dag(&inputs);
            let order = sort_backwards(&graph).unwrap();

            prop_assert_eq!(order[0], graph.result());
            for node in graph.nodes() {
                for src in node.sources() {
                    prop_assert!(position(&order, node.id()) < position(&order, src.source));
                }
            }
        }
    }
}
