//! Core error types for FEATUREFLOW.

use crate::description::ValueType;
use crate::id::NodeId;

/// Boxed error produced by user transforms and interceptors
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Core result type
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors raised while building or executing a data graph.
///
/// Construction errors are reported by the builder before any invocation
/// runs. Protocol and execution errors fail the invocation that hit them.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The graph contains a cycle through this node
    #[error("Graph contains a cycle through {node}")]
    Cycle {
        /// A node on the cycle
        node: NodeId,
    },

    /// Two columns with the same name in one description
    #[error("Column {name} is declared more than once")]
    DuplicateColumn {
        /// Column name
        name: String,
    },

    /// Two column groups with the same prefix in one description
    #[error("Column group {prefix} is declared more than once")]
    DuplicateGroup {
        /// Group prefix
        prefix: String,
    },

    /// A column name clashes with a group prefix
    #[error("Column {name} collides with column group {prefix}")]
    GroupCollision {
        /// Group prefix
        prefix: String,
        /// Column name
        name: String,
    },

    /// A group prefix that is empty or contains the separator
    #[error("Invalid column group prefix {prefix:?}")]
    InvalidGroupPrefix {
        /// The rejected prefix
        prefix: String,
    },

    /// A node id that does not exist in the graph
    #[error("Node {id} does not exist")]
    MissingNode {
        /// The missing id
        id: NodeId,
    },

    /// The builder was finished without a source
    #[error("Graph has no source node")]
    MissingSource,

    /// The builder was finished without a result
    #[error("Graph has no result node")]
    MissingResult,

    /// A second source was declared
    #[error("Graph source is already set to {existing}")]
    SourceAlreadySet {
        /// The source declared first
        existing: NodeId,
    },

    /// A merge node without inputs
    #[error("Merge node needs at least one source")]
    EmptyMerge,

    /// Two nodes with the same label
    #[error("Label {label} is already used by {existing}")]
    DuplicateLabel {
        /// The label
        label: String,
        /// Node that already carries it
        existing: NodeId,
    },

    /// Lookup of an undeclared column
    #[error("Column {name} not found")]
    ColumnNotFound {
        /// Column name
        name: String,
    },

    /// Lookup of an undeclared column group
    #[error("Column group {prefix} not found")]
    GroupNotFound {
        /// Group prefix
        prefix: String,
    },

    /// A column or group exists with another type
    #[error("{name} has type {actual}, expected {expected}")]
    TypeMismatch {
        /// Column name or group prefix
        name: String,
        /// Requested type
        expected: ValueType,
        /// Declared type
        actual: ValueType,
    },

    /// Token group read before its producer was trained
    #[error("Tokens of group {prefix} are not known until training completes")]
    TokensNotReady {
        /// Group prefix
        prefix: String,
    },

    /// Token group resolved twice
    #[error("Tokens of group {prefix} were already set")]
    TokensAlreadySet {
        /// Group prefix
        prefix: String,
    },

    /// A resolved token that does not belong to its group
    #[error("Token {name} does not belong to group {prefix}")]
    ForeignToken {
        /// Group prefix
        prefix: String,
        /// Token name
        name: String,
    },

    /// A subscription slot received data twice
    #[error("Node {node} already received data for subscription {sub_id}")]
    DuplicateDelivery {
        /// Receiving node
        node: NodeId,
        /// Subscription id
        sub_id: usize,
    },

    /// A delivery for a subscription the node never declared
    #[error("Node {node} has no subscription {sub_id} (expected fewer than {expected})")]
    SubIdOutOfRange {
        /// Receiving node
        node: NodeId,
        /// Subscription id
        sub_id: usize,
        /// Number of declared subscriptions
        expected: usize,
    },

    /// A node was run while one of its inputs was absent
    #[error("Node {node} ran without data for subscription {sub_id}")]
    MissingDelivery {
        /// Node that ran
        node: NodeId,
        /// Empty subscription
        sub_id: usize,
    },

    /// The source node was asked to take part in the execution protocol
    #[error("Source node {node} does not take part in the execution protocol")]
    SourceExecuted {
        /// The source node
        node: NodeId,
    },

    /// A node was visited before all of its inputs arrived
    #[error("Node {node} is not ready to run")]
    NotReady {
        /// The node
        node: NodeId,
    },

    /// An execution was started twice
    #[error("Graph execution {invocation} was already started")]
    AlreadyStarted {
        /// Invocation id
        invocation: String,
    },

    /// Data addressed to a node the invocation holds no manager for
    #[error("Node {node} has no execution manager in this invocation")]
    UnknownSubscriber {
        /// The addressed node
        node: NodeId,
    },

    /// An interceptor label that matches no node
    #[error("Interceptor labels match no node: {labels:?}")]
    UnknownInterceptor {
        /// Unmatched labels
        labels: Vec<String>,
    },

    /// An interceptor bound to the graph source
    #[error("Interceptors are not supported on the graph source ({label})")]
    InterceptorOnSource {
        /// The source label
        label: String,
    },

    /// Two interceptors bound to the same label
    #[error("Label {label} is given more than one interceptor")]
    DuplicateInterceptor {
        /// The repeated label
        label: String,
    },

    /// A transform failed
    #[error("Transform of node {node} failed: {source}")]
    Transform {
        /// Failing node
        node: NodeId,
        /// Error returned by the transform
        #[source]
        source: BoxError,
    },

    /// An output interceptor failed
    #[error("Interceptor of node {node} failed: {source}")]
    Intercept {
        /// Intercepted node
        node: NodeId,
        /// Error returned by the interceptor
        #[source]
        source: BoxError,
    },

    /// A transform panicked
    #[error("Transform of node {node} panicked: {message}")]
    Panicked {
        /// Failing node
        node: NodeId,
        /// Panic payload, when it was a string
        message: String,
    },

    /// Every task finished without producing the result
    #[error("Execution ended before the result node produced data")]
    Abandoned,

    /// Invalid configuration value
    #[error("Invalid configuration for {field}: {reason}")]
    Config {
        /// Offending field
        field: String,
        /// Why it was rejected
        reason: String,
    },

    /// The worker pool could not be created
    #[error("Runtime error: {message}")]
    Runtime {
        /// Error message
        message: String,
    },
}

impl GraphError {
    /// Whether this error was raised while building the graph
    #[must_use]
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            Self::Cycle { .. }
                | Self::DuplicateColumn { .. }
                | Self::DuplicateGroup { .. }
                | Self::GroupCollision { .. }
                | Self::InvalidGroupPrefix { .. }
                | Self::MissingNode { .. }
                | Self::MissingSource
                | Self::MissingResult
                | Self::SourceAlreadySet { .. }
                | Self::EmptyMerge
                | Self::DuplicateLabel { .. }
        )
    }

    /// Whether this error means the fan-in contract was broken
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::DuplicateDelivery { .. }
                | Self::SubIdOutOfRange { .. }
                | Self::MissingDelivery { .. }
                | Self::SourceExecuted { .. }
                | Self::NotReady { .. }
                | Self::AlreadyStarted { .. }
                | Self::UnknownSubscriber { .. }
        )
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config {
            field: "json".to_string(),
            reason: err.to_string(),
        }
    }
}
