//! Output interception.
//!
//! An [`InterceptorManager`] sits between the execution and a node's own
//! manager. Inputs pass through unchanged, so the node's fan-in behaves
//! exactly as without the wrapper, and readiness is re-reported with the
//! wrapper in place of the wrapped manager. When the execution runs the
//! wrapper, the node's output is handed to the [`OutputInterceptor`] and
//! what it returns is what subscribers see.

use async_trait::async_trait;
use crate::fan_in::lock;
use crate::protocol::{ExecutionProtocol, NodeExecutionManager, NodeFuture, notify_ready};
use featureflow_core::{ExecutionMode, GraphError, GraphResult, NodeId};
use featureflow_graph::{Payload, TransformResult};
use futures::FutureExt;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, error};

/// Observes and may replace a node's output
#[async_trait]
pub trait OutputInterceptor<D: Payload>: Send + Sync {
    /// Called with the node's inputs by subscription id, and its output
    async fn intercept(
        &self,
        inputs: BTreeMap<usize, Arc<D>>,
        mode: ExecutionMode,
        output: Arc<D>,
    ) -> TransformResult<D>;
}

/// Manager decorator that routes a node's output through an interceptor
pub struct InterceptorManager<D: Payload> {
    node: NodeId,
    mode: ExecutionMode,
    inner: Arc<dyn NodeExecutionManager<D>>,
    interceptor: Arc<dyn OutputInterceptor<D>>,
    inputs: Mutex<BTreeMap<usize, Arc<D>>>,
    parent: Weak<dyn ExecutionProtocol<D>>,
    this: Weak<Self>,
}

impl<D: Payload> InterceptorManager<D> {
    /// Wrap the manager built by `inner`
    ///
    /// `inner` receives the wrapper as its parent.
    pub fn wrap<F>(
        node: NodeId,
        mode: ExecutionMode,
        interceptor: Arc<dyn OutputInterceptor<D>>,
        parent: Weak<dyn ExecutionProtocol<D>>,
        inner: F,
    ) -> Arc<Self>
    where
        F: FnOnce(Weak<dyn ExecutionProtocol<D>>) -> Arc<dyn NodeExecutionManager<D>>,
    {
        Arc::new_cyclic(|this: &Weak<Self>| {
            let as_parent: Weak<dyn ExecutionProtocol<D>> = this.clone();
            Self {
                node,
                mode,
                inner: inner(as_parent),
                interceptor,
                inputs: Mutex::new(BTreeMap::new()),
                parent,
                this: this.clone(),
            }
        })
    }
}

impl<D: Payload> ExecutionProtocol<D> for InterceptorManager<D> {
    fn on_ready_to_run(&self, _manager: Arc<dyn NodeExecutionManager<D>>) {
        if let Some(this) = self.this.upgrade() {
            notify_ready(&self.parent, this);
        }
    }
}

impl<D: Payload> NodeExecutionManager<D> for InterceptorManager<D> {
    fn node_id(&self) -> NodeId {
        self.node
    }

    fn on_data_available(self: Arc<Self>, sub_id: usize, data: Arc<D>) -> GraphResult<()> {
        // recorded first: the inner manager may report ready synchronously
        lock(&self.inputs)
            .entry(sub_id)
            .or_insert_with(|| Arc::clone(&data));
        Arc::clone(&self.inner).on_data_available(sub_id, data)
    }

    fn run(&self) -> NodeFuture<D> {
        let node = self.node;
        let mode = self.mode;
        let inner = self.inner.run();
        let interceptor = Arc::clone(&self.interceptor);
        let inputs = std::mem::take(&mut *lock(&self.inputs));
        async move {
            let output = inner.await?;
            debug!(node = %node, "intercepting output");
            interceptor.intercept(inputs, mode, output).await.map_err(|source| {
                error!(node = %node, error = %source, "interceptor failed");
                GraphError::Intercept { node, source }
            })
        }
        .boxed()
    }
}
