//! FEATUREFLOW Core Types
//!
//! Pure types shared by the graph model and the runtime: node and
//! invocation identifiers, execution modes, the description of what a
//! node produces, and the common error type. Nothing here does I/O.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod description;
pub mod error;
pub mod id;
pub mod mode;
pub mod token;

// Re-exports
pub use description::{
    ColumnId, ColumnIdGroup, GROUP_SEPARATOR, TransformDescription, Typed, ValueType,
};
pub use error::{BoxError, GraphError, GraphResult};
pub use id::{InvocationId, NodeId};
pub use mode::ExecutionMode;
pub use token::{AggregateTokenGroup, ListTokenGroup, TokenGroup, TokenSetter};
