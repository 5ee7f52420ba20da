//! Execution modes.

use serde::{Deserialize, Serialize};

/// Which sub-graph an invocation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Inference: only regular edges are followed
    Transform,
    /// Training: regular and train-only edges are followed
    TrainTransform,
}

impl ExecutionMode {
    /// Whether train-only edges are active in this mode
    #[must_use]
    pub const fn follows_train_only(self) -> bool {
        matches!(self, Self::TrainTransform)
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transform => write!(f, "transform"),
            Self::TrainTransform => write!(f, "train_transform"),
        }
    }
}
