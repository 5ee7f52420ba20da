//! Small transforms and graph shapes shared by the unit tests.

use async_trait::async_trait;
use crate::graph::{DataGraph, GraphBuilder};
use crate::transform::{
    LearningTransform, MultiTransform, SingleTransform, SupervisedTransform, TransformResult,
};
use featureflow_core::{ColumnId, NodeId, TransformDescription};
use proptest::prelude::*;
use std::sync::Arc;

pub(crate) struct AddConstant {
    amount: i64,
    description: TransformDescription,
}

impl AddConstant {
    pub(crate) fn new(amount: i64) -> Self {
        Self {
            amount,
            description: TransformDescription::from_columns(vec![ColumnId::of::<i64>("value")])
                .unwrap(),
        }
    }
}

#[async_trait]
impl SingleTransform<i64> for AddConstant {
    fn description(&self) -> &TransformDescription {
        &self.description
    }

    async fn transform(&self, input: Arc<i64>) -> TransformResult<i64> {
        Ok(Arc::new(*input + self.amount))
    }
}

#[async_trait]
impl LearningTransform<i64> for AddConstant {
    async fn train_transform(&self, input: Arc<i64>) -> TransformResult<i64> {
        self.transform(input).await
    }
}

#[async_trait]
impl SupervisedTransform<i64> for AddConstant {
    async fn train_transform(&self, main: Arc<i64>, _target: Arc<i64>) -> TransformResult<i64> {
        self.transform(main).await
    }
}

#[derive(Default)]
pub(crate) struct Concat {
    description: TransformDescription,
}

#[async_trait]
impl MultiTransform<i64> for Concat {
    fn description(&self) -> &TransformDescription {
        &self.description
    }

    async fn transform(&self, inputs: Vec<Arc<i64>>) -> TransformResult<i64> {
        Ok(Arc::new(inputs.iter().map(|v| **v).sum()))
    }
}

/// Source followed by one `AddConstant` per amount; the last one is the result.
pub(crate) fn linear_graph(amounts: &[i64]) -> (DataGraph<i64>, Vec<NodeId>) {
    let mut builder = GraphBuilder::new();
    let mut ids = vec![builder.data_set_source().unwrap()];
    for amount in amounts {
        let prev = *ids.last().unwrap();
        ids.push(builder.add_transform(prev, Arc::new(AddConstant::new(*amount))));
    }
    builder.set_result(*ids.last().unwrap());
    (builder.build().unwrap(), ids)
}

/// Inputs of nodes 1..n; node i only reads from nodes with smaller ids.
pub(crate) fn dag_strategy() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (2usize..24).prop_flat_map(|n| {
        (1..n)
            .map(|i| proptest::collection::vec(0..i, 1..=3.min(i)))
            .collect::<Vec<_>>()
    })
}

/// Builds a graph from `dag_strategy` output. A final merge of every node is
/// the result, so nothing is pruned.
pub(crate) fn build_random_dag(inputs: &[Vec<usize>]) -> (DataGraph<i64>, Vec<NodeId>) {
    let mut builder = GraphBuilder::new();
    let mut ids = vec![builder.data_set_source().unwrap()];
    for sources in inputs {
        let sources: Vec<_> = sources.iter().map(|i| ids[*i]).collect();
        ids.push(builder.merge(&sources, Arc::new(Concat::default())).unwrap());
    }
    let result = builder.merge(&ids, Arc::new(Concat::default())).unwrap();
    builder.set_result(result);
    ids.push(result);
    (builder.build().unwrap(), ids)
}
