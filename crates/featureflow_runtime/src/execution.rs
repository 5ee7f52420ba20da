//! One invocation of a data graph on a shared worker pool.
//!
//! A [`GraphExecution`] owns a manager per node and acts as their parent.
//! The input is handed to the source's subscribers; every manager that
//! becomes ready is spawned on the pool; each computed output is handed to
//! the producing node's subscribers, until the result node reports. Nothing
//! here blocks: the only suspension points are the transforms' own futures.
//!
//! The caller gets an [`InvocationHandle`] immediately. It resolves exactly
//! once, with the result node's output or with the first failure. Once it
//! is resolved no further node is started, while work already on the pool
//! runs to completion and is discarded.

use crate::fan_in::lock;
use crate::interceptor::{InterceptorManager, OutputInterceptor};
use crate::managers::ManagerFactory;
use crate::protocol::{ExecutionProtocol, NodeExecutionManager, manager_for};
use featureflow_core::{ExecutionMode, GraphError, GraphResult, InvocationId, NodeId};
use featureflow_graph::{DataGraph, Payload};
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

type ResultSender<D> = oneshot::Sender<GraphResult<Arc<D>>>;
type ResultReceiver<D> = oneshot::Receiver<GraphResult<Arc<D>>>;

/// Future of an invocation's result
///
/// Dropping it does not stop nodes that are already running.
pub struct InvocationHandle<D> {
    invocation: InvocationId,
    receiver: ResultReceiver<D>,
}

impl<D> InvocationHandle<D> {
    /// Invocation this handle belongs to
    #[must_use]
    pub fn invocation(&self) -> InvocationId {
        self.invocation
    }
}

impl<D> Future for InvocationHandle<D> {
    type Output = GraphResult<Arc<D>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(GraphError::Abandoned)))
    }
}

/// State of one invocation
pub struct GraphExecution<D: Payload> {
    graph: Arc<DataGraph<D>>,
    mode: ExecutionMode,
    invocation: InvocationId,
    handle: Handle,
    managers: Vec<Arc<dyn NodeExecutionManager<D>>>,
    sender: Mutex<Option<ResultSender<D>>>,
    receiver: Mutex<Option<ResultReceiver<D>>>,
    started: AtomicBool,
    resolved: AtomicBool,
    // the seeding step counts as one
    pending: AtomicUsize,
    this: Weak<Self>,
    span: Span,
}

impl<D: Payload> GraphExecution<D> {
    /// Prepare an invocation of `graph` in `mode`, running nodes on `handle`
    #[must_use]
    pub fn new(graph: Arc<DataGraph<D>>, mode: ExecutionMode, handle: Handle) -> Arc<Self> {
        Self::assemble(graph, mode, handle, HashMap::new())
    }

    /// Like [`GraphExecution::new`], with interceptors bound by node label
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InterceptorOnSource`] if a label names the
    /// source, [`GraphError::DuplicateInterceptor`] if a label is given
    /// twice, or [`GraphError::UnknownInterceptor`] listing every label
    /// that names no node
    pub fn with_interceptors<I>(
        graph: Arc<DataGraph<D>>,
        mode: ExecutionMode,
        handle: Handle,
        interceptors: I,
    ) -> GraphResult<Arc<Self>>
    where
        I: IntoIterator<Item = (String, Arc<dyn OutputInterceptor<D>>)>,
    {
        let mut by_node = HashMap::new();
        let mut unknown = Vec::new();
        for (label, interceptor) in interceptors {
            match graph.node_by_label(&label) {
                Some(id) if id == graph.source() => {
                    return Err(GraphError::InterceptorOnSource { label });
                }
                Some(id) => {
                    if by_node.insert(id, interceptor).is_some() {
                        warn!(label = %label, node = %id, "interceptor label given twice");
                        return Err(GraphError::DuplicateInterceptor { label });
                    }
                    info!(label = %label, node = %id, "installing output interceptor");
                }
                None => unknown.push(label),
            }
        }
        if !unknown.is_empty() {
            unknown.sort();
            return Err(GraphError::UnknownInterceptor { labels: unknown });
        }
        Ok(Self::assemble(graph, mode, handle, by_node))
    }

    fn assemble(
        graph: Arc<DataGraph<D>>,
        mode: ExecutionMode,
        handle: Handle,
        mut interceptors: HashMap<NodeId, Arc<dyn OutputInterceptor<D>>>,
    ) -> Arc<Self> {
        let invocation = InvocationId::new();
        let span = info_span!("graph_execution", invocation = %invocation, mode = %mode);
        let (sender, receiver) = oneshot::channel();

        Arc::new_cyclic(|this: &Weak<Self>| {
            let parent: Weak<dyn ExecutionProtocol<D>> = this.clone();
            let managers = graph
                .nodes()
                .iter()
                .map(|node| match interceptors.remove(&node.id()) {
                    Some(interceptor) => {
                        let wrapper: Arc<dyn NodeExecutionManager<D>> = InterceptorManager::wrap(
                            node.id(),
                            mode,
                            interceptor,
                            parent.clone(),
                            |inner| node.execution_manager(inner, mode),
                        );
                        wrapper
                    }
                    None => node.execution_manager(parent.clone(), mode),
                })
                .collect();

            Self {
                graph,
                mode,
                invocation,
                handle,
                managers,
                sender: Mutex::new(Some(sender)),
                receiver: Mutex::new(Some(receiver)),
                started: AtomicBool::new(false),
                resolved: AtomicBool::new(false),
                pending: AtomicUsize::new(0),
                this: this.clone(),
                span,
            }
        })
    }

    /// Id of this invocation
    #[must_use]
    pub fn invocation(&self) -> InvocationId {
        self.invocation
    }

    /// Mode the graph runs in
    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// The graph being run
    #[must_use]
    pub fn graph(&self) -> &Arc<DataGraph<D>> {
        &self.graph
    }

    /// Whether the result has been decided
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }

    /// Start the invocation with `input` as the source's output
    ///
    /// Returns immediately. An execution runs once; the handle returned by
    /// any later call fails with [`GraphError::AlreadyStarted`].
    pub fn execute(&self, input: Arc<D>) -> InvocationHandle<D> {
        let receiver = if self.started.swap(true, Ordering::AcqRel) {
            None
        } else {
            lock(&self.receiver).take()
        };
        let Some(receiver) = receiver else {
            let (sender, receiver) = oneshot::channel();
            let _ = sender.send(Err(GraphError::AlreadyStarted {
                invocation: self.invocation.to_string(),
            }));
            return InvocationHandle {
                invocation: self.invocation,
                receiver,
            };
        };

        let _entered = self.span.enter();
        info!(nodes = self.graph.len(), "invocation started");

        if self.graph.result() == self.graph.source() {
            self.resolve(Ok(input));
        } else {
            self.pending.fetch_add(1, Ordering::AcqRel);
            if let Err(err) = self.deliver(self.graph.source(), input) {
                error!(error = %err, "failed to deliver input");
                self.resolve(Err(err));
            }
            self.finish_task();
        }

        InvocationHandle {
            invocation: self.invocation,
            receiver,
        }
    }

    /// `node` finished with `output`
    ///
    /// Resolves the invocation if `node` is the result, otherwise hands the
    /// output on to the node's subscribers.
    pub fn on_data_computed(&self, node: NodeId, output: Arc<D>) {
        debug!(node = %node, "node computed");
        if node == self.graph.result() {
            self.resolve(Ok(output));
        } else if let Err(err) = self.deliver(node, output) {
            error!(node = %node, error = %err, "delivery failed");
            self.resolve(Err(err));
        }
    }

    fn deliver(&self, from: NodeId, output: Arc<D>) -> GraphResult<()> {
        for subscription in self.graph.node(from)?.subscribers_for(self.mode) {
            let manager = manager_for(&self.managers, subscription.subscriber)?;
            manager.on_data_available(subscription.sub_id, Arc::clone(&output))?;
        }
        Ok(())
    }

    fn resolve(&self, result: GraphResult<Arc<D>>) {
        let Some(sender) = lock(&self.sender).take() else {
            debug!("invocation already resolved; dropping outcome");
            return;
        };
        self.resolved.store(true, Ordering::Release);
        match &result {
            Ok(_) => info!(parent: &self.span, "invocation finished"),
            Err(err) => error!(parent: &self.span, error = %err, "invocation failed"),
        }
        if sender.send(result).is_err() {
            debug!(parent: &self.span, "invocation handle dropped before the result arrived");
        }
    }

    fn finish_task(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 && !self.is_resolved() {
            self.resolve(Err(GraphError::Abandoned));
        }
    }
}

impl<D: Payload> ExecutionProtocol<D> for GraphExecution<D> {
    fn on_ready_to_run(&self, manager: Arc<dyn NodeExecutionManager<D>>) {
        let node = manager.node_id();
        if self.is_resolved() {
            debug!(node = %node, "invocation resolved; not starting node");
            return;
        }
        let Some(this) = self.this.upgrade() else {
            return;
        };

        debug!(node = %node, "ready to run");
        self.pending.fetch_add(1, Ordering::AcqRel);
        let task = async move {
            let outcome = AssertUnwindSafe(async move { manager.run().await })
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(output)) => this.on_data_computed(node, output),
                Ok(Err(err)) => {
                    error!(node = %node, error = %err, "node failed");
                    this.resolve(Err(err));
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(node = %node, message = %message, "node panicked");
                    this.resolve(Err(GraphError::Panicked { node, message }));
                }
            }
            this.finish_task();
        };
        drop(self.handle.spawn(task.instrument(self.span.clone())));
    }
}

impl<D: Payload> std::fmt::Debug for GraphExecution<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphExecution")
            .field("invocation", &self.invocation)
            .field("mode", &self.mode)
            .field("started", &self.started)
            .field("resolved", &self.resolved)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
