//! Transforms, interceptors and protocol doubles shared by the unit tests.

use async_trait::async_trait;
use crate::fan_in::lock;
use crate::interceptor::OutputInterceptor;
use crate::protocol::{ExecutionProtocol, NodeExecutionManager};
use featureflow_core::{ColumnId, ExecutionMode, NodeId, TransformDescription};
use featureflow_graph::{
    LearningTransform, MultiTransform, Payload, SingleTransform, SupervisedTransform,
    TransformResult,
};
use std::collections::{BTreeMap, HashSet};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;

/// Send engine logs to the test output; `RUST_LOG` overrides the filter.
pub(crate) fn init_tracing() {
    let filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "featureflow_runtime=debug".to_string());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

static VALUE: LazyLock<TransformDescription> = LazyLock::new(|| {
    TransformDescription::from_columns(vec![ColumnId::of::<i64>("value")])
        .unwrap()
});

/// Adds a constant and counts how often it ran, in either mode.
pub(crate) struct AddConstant {
    amount: i64,
    calls: AtomicUsize,
    train_calls: AtomicUsize,
}

impl AddConstant {
    pub(crate) fn new(amount: i64) -> Self {
        Self {
            amount,
            calls: AtomicUsize::new(0),
            train_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn train_calls(&self) -> usize {
        self.train_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SingleTransform<i64> for AddConstant {
    fn description(&self) -> &TransformDescription {
        &VALUE
    }

    async fn transform(&self, input: Arc<i64>) -> TransformResult<i64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(*input + self.amount))
    }
}

#[async_trait]
impl LearningTransform<i64> for AddConstant {
    async fn train_transform(&self, input: Arc<i64>) -> TransformResult<i64> {
        self.train_calls.fetch_add(1, Ordering::SeqCst);
        self.transform(input).await
    }
}

/// Always fails.
pub(crate) struct Failing;

#[async_trait]
impl SingleTransform<i64> for Failing {
    fn description(&self) -> &TransformDescription {
        &VALUE
    }

    async fn transform(&self, _input: Arc<i64>) -> TransformResult<i64> {
        Err("transform failed on purpose".into())
    }
}

/// Panics while computing.
pub(crate) struct Panicking;

#[async_trait]
impl SingleTransform<i64> for Panicking {
    fn description(&self) -> &TransformDescription {
        &VALUE
    }

    async fn transform(&self, _input: Arc<i64>) -> TransformResult<i64> {
        panic!("transform panicked on purpose")
    }
}

/// Adds a constant after sleeping.
pub(crate) struct Delayed {
    amount: i64,
    delay: Duration,
}

impl Delayed {
    pub(crate) fn new(amount: i64, millis: u64) -> Self {
        Self {
            amount,
            delay: Duration::from_millis(millis),
        }
    }
}

#[async_trait]
impl SingleTransform<i64> for Delayed {
    fn description(&self) -> &TransformDescription {
        &VALUE
    }

    async fn transform(&self, input: Arc<i64>) -> TransformResult<i64> {
        tokio::time::sleep(self.delay).await;
        Ok(Arc::new(*input + self.amount))
    }
}

/// Sums its inputs and remembers the order they came in.
pub(crate) struct SumAll {
    seen: Mutex<Vec<Vec<i64>>>,
}

impl SumAll {
    pub(crate) fn new() -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn seen(&self) -> Vec<Vec<i64>> {
        lock(&self.seen).clone()
    }
}

#[async_trait]
impl MultiTransform<i64> for SumAll {
    fn description(&self) -> &TransformDescription {
        &VALUE
    }

    async fn transform(&self, inputs: Vec<Arc<i64>>) -> TransformResult<i64> {
        let values: Vec<i64> = inputs.iter().map(|v| **v).collect();
        let sum = values.iter().sum();
        lock(&self.seen).push(values);
        Ok(Arc::new(sum))
    }
}

/// Outputs 1 for values it was trained on with a non-zero target, else 0.
pub(crate) struct TrueIfSeen {
    seen: Mutex<HashSet<i64>>,
    train_calls: AtomicUsize,
    last_target: Mutex<Option<i64>>,
}

impl TrueIfSeen {
    pub(crate) fn new() -> Self {
        Self {
            seen: Mutex::new(HashSet::new()),
            train_calls: AtomicUsize::new(0),
            last_target: Mutex::new(None),
        }
    }

    pub(crate) fn train_calls(&self) -> usize {
        self.train_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_target(&self) -> Option<i64> {
        *lock(&self.last_target)
    }
}

#[async_trait]
impl SingleTransform<i64> for TrueIfSeen {
    fn description(&self) -> &TransformDescription {
        &VALUE
    }

    async fn transform(&self, input: Arc<i64>) -> TransformResult<i64> {
        let seen = lock(&self.seen).contains(&*input);
        Ok(Arc::new(i64::from(seen)))
    }
}

#[async_trait]
impl SupervisedTransform<i64> for TrueIfSeen {
    async fn train_transform(&self, main: Arc<i64>, target: Arc<i64>) -> TransformResult<i64> {
        self.train_calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_target) = Some(*target);
        if *target != 0 {
            lock(&self.seen).insert(*main);
        }
        self.transform(main).await
    }
}

/// Parent that only records which nodes reported ready.
pub(crate) struct Recorder<D> {
    ready: Mutex<Vec<NodeId>>,
    _payload: PhantomData<fn() -> D>,
}

impl<D> Default for Recorder<D> {
    fn default() -> Self {
        Self {
            ready: Mutex::new(Vec::new()),
            _payload: PhantomData,
        }
    }
}

impl<D> Recorder<D> {
    pub(crate) fn ready(&self) -> Vec<NodeId> {
        lock(&self.ready).clone()
    }
}

impl<D: Payload> ExecutionProtocol<D> for Recorder<D> {
    fn on_ready_to_run(&self, manager: Arc<dyn NodeExecutionManager<D>>) {
        lock(&self.ready).push(manager.node_id());
    }
}

type RewriteFn = dyn Fn(&BTreeMap<usize, Arc<i64>>, i64) -> i64 + Send + Sync;

/// Interceptor computing the new output from the inputs and the old output.
pub(crate) struct Rewrite {
    rewrite: Box<RewriteFn>,
    calls: AtomicUsize,
    modes: Mutex<Vec<ExecutionMode>>,
}

impl Rewrite {
    pub(crate) fn new(
        rewrite: impl Fn(&BTreeMap<usize, Arc<i64>>, i64) -> i64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            rewrite: Box::new(rewrite),
            calls: AtomicUsize::new(0),
            modes: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn modes(&self) -> Vec<ExecutionMode> {
        lock(&self.modes).clone()
    }
}

#[async_trait]
impl OutputInterceptor<i64> for Rewrite {
    async fn intercept(
        &self,
        inputs: BTreeMap<usize, Arc<i64>>,
        mode: ExecutionMode,
        output: Arc<i64>,
    ) -> TransformResult<i64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.modes).push(mode);
        Ok(Arc::new((self.rewrite)(&inputs, *output)))
    }
}

/// Interceptor that rejects every output.
pub(crate) struct Reject;

#[async_trait]
impl OutputInterceptor<i64> for Reject {
    async fn intercept(
        &self,
        _inputs: BTreeMap<usize, Arc<i64>>,
        _mode: ExecutionMode,
        _output: Arc<i64>,
    ) -> TransformResult<i64> {
        Err("output rejected".into())
    }
}
