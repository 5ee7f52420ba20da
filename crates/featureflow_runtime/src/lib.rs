//! FEATUREFLOW Runtime
//!
//! Executes a [`DataGraph`](featureflow_graph::DataGraph) on a shared tokio
//! pool. Each invocation gets a fresh set of node managers; the graph itself
//! is never mutated, so any number of invocations can run at once.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod execution;
pub mod ext;
pub mod fan_in;
pub mod interceptor;
pub mod managers;
pub mod nested;
pub mod protocol;
pub mod sequential;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::PoolConfig;
pub use execution::{GraphExecution, InvocationHandle};
pub use ext::DataGraphExt;
pub use fan_in::FanIn;
pub use interceptor::{InterceptorManager, OutputInterceptor};
pub use managers::{
    ManagerFactory, MergeManager, SingleInputManager, SingleOp, SourceManager, TrainingManager,
};
pub use nested::GraphTransform;
pub use protocol::{ExecutionProtocol, NodeExecutionManager, NodeFuture};
pub use sequential::SequentialExecution;
