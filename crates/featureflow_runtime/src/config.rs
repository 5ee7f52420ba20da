//! Worker pool configuration.
//!
//! Executions never create a pool themselves; they run on whatever
//! [`Handle`](tokio::runtime::Handle) the caller passes. [`PoolConfig`] is
//! for callers that want a dedicated pool for graph work.

use featureflow_core::{GraphError, GraphResult};
use serde::{Deserialize, Serialize};
use tokio::runtime::{Builder, Runtime};
use tracing::info;

/// Settings of a dedicated multi-thread pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of workers; `None` lets tokio pick one per core
    pub worker_threads: Option<usize>,
    /// Prefix of worker thread names
    pub thread_name: String,
    /// Stack size of each worker in bytes
    pub thread_stack_size: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            thread_name: "featureflow-worker".to_string(),
            thread_stack_size: None,
        }
    }
}

impl PoolConfig {
    /// Use exactly `threads` workers
    #[must_use]
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    /// Name workers `name`
    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Give each worker `bytes` of stack
    #[must_use]
    pub fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = Some(bytes);
        self
    }

    /// Parse a configuration; missing fields take their defaults
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Config`] if the JSON is malformed or a value
    /// is out of range
    pub fn from_json(json: &str) -> GraphResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every value
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Config`] naming the first bad field
    pub fn validate(&self) -> GraphResult<()> {
        if self.worker_threads == Some(0) {
            return Err(invalid("worker_threads", "must be at least 1"));
        }
        if self.thread_name.trim().is_empty() {
            return Err(invalid("thread_name", "must not be empty"));
        }
        if self.thread_stack_size == Some(0) {
            return Err(invalid("thread_stack_size", "must be at least 1 byte"));
        }
        Ok(())
    }

    /// Build the pool
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Config`] for invalid values and
    /// [`GraphError::Runtime`] if tokio cannot start the workers
    pub fn build_runtime(&self) -> GraphResult<Runtime> {
        self.validate()?;
        let mut builder = Builder::new_multi_thread();
        builder.enable_all().thread_name(self.thread_name.clone());
        if let Some(threads) = self.worker_threads {
            builder.worker_threads(threads);
        }
        if let Some(bytes) = self.thread_stack_size {
            builder.thread_stack_size(bytes);
        }
        let runtime = builder.build().map_err(|err| GraphError::Runtime {
            message: err.to_string(),
        })?;
        info!(
            workers = ?self.worker_threads,
            name = %self.thread_name,
            "worker pool started"
        );
        Ok(runtime)
    }
}

fn invalid(field: &str, reason: &str) -> GraphError {
    GraphError::Config {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
