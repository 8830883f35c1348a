//! Error types for the dataflow engine
//!
//! Errors are split by the layer that raises them:
//!
//! - [`GraphError`]: structural edits rejected by the graph model
//! - [`ValidationError`]: problems that block a run before it starts
//! - [`WidgetError`]: a single widget operation failing during a run
//! - [`ConsistencyError`]: internal contract violations between components
//!
//! [`FlowError`] wraps all of them for APIs that cross layers.

use thiserror::Error;

use crate::types::{ConnectionId, NodeId};

/// Result type alias using FlowError
pub type Result<T> = std::result::Result<T, FlowError>;

/// Structural errors raised synchronously by graph mutations.
///
/// A mutation that returns one of these leaves the graph untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The widget kind is not present in the registry
    #[error("Unknown widget kind: {0}")]
    UnknownWidgetKind(String),

    /// No node with this id exists in the graph
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// The port is not declared by the node's widget
    #[error("Widget '{widget_kind}' on node '{node_id}' has no {direction} port '{port}'")]
    UnknownPort {
        node_id: NodeId,
        widget_kind: String,
        port: String,
        direction: PortDirection,
    },

    /// The target input already has an incoming connection
    #[error("Input '{port}' on node '{node_id}' is already bound by connection '{existing}'")]
    InputAlreadyBound {
        node_id: NodeId,
        port: String,
        existing: ConnectionId,
    },

    /// Source and target of a connection are the same node
    #[error("Cannot connect node '{0}' to itself")]
    DuplicateNode(NodeId),

    /// A node with this id already exists
    #[error("Node id already in use: {0}")]
    DuplicateNodeId(NodeId),

    /// No connection with this id exists in the graph
    #[error("Connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    /// A connection with this id already exists
    #[error("Connection id already in use: {0}")]
    DuplicateConnectionId(ConnectionId),

    /// The graph is being executed and cannot be changed
    #[error("Graph '{0}' is locked for execution")]
    GraphLockedForExecution(String),
}

/// Direction of a port, used in error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

impl std::fmt::Display for PortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// Validation error with location context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A directed cycle exists; node ids are listed in path order
    CycleDetected(Vec<NodeId>),
    /// A required input port has no connection, default, or parameter value
    MissingRequiredInput { node_id: NodeId, port: String },
    /// A connection references a node that is not in the graph
    DanglingConnection {
        connection_id: ConnectionId,
        node_id: NodeId,
    },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CycleDetected(nodes) => {
                write!(f, "Cycle detected through nodes [{}]", nodes.join(", "))
            }
            Self::MissingRequiredInput { node_id, port } => {
                write!(
                    f,
                    "Required input '{}' on node '{}' is not connected",
                    port, node_id
                )
            }
            Self::DanglingConnection {
                connection_id,
                node_id,
            } => {
                write!(
                    f,
                    "Connection '{}' references unknown node '{}'",
                    connection_id, node_id
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Error returned by a widget operation.
///
/// Recorded against the failing node only; never aborts the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WidgetError {
    /// A required input value was not provided
    #[error("Missing required input: {0}")]
    MissingInput(String),

    /// An input value has the wrong shape
    #[error("Invalid input for '{port}': expected {expected}")]
    InvalidInput { port: String, expected: String },

    /// The operation itself failed
    #[error("{0}")]
    Failed(String),

    /// The operation observed run cancellation
    #[error("Cancelled")]
    Cancelled,

    /// The operation exceeded the configured node timeout
    #[error("Timed out after {0} ms")]
    Timeout(u64),
}

impl WidgetError {
    /// Create a failure with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// Create an invalid-input error
    pub fn invalid(port: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::InvalidInput {
            port: port.into(),
            expected: expected.into(),
        }
    }
}

/// Internal contract violations between validator and scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyError {
    /// Kahn's algorithm could not schedule every node
    #[error("Scheduler left {unscheduled} of {total} nodes unscheduled: [{}]", nodes.join(", "))]
    IncompletePlan {
        unscheduled: usize,
        total: usize,
        nodes: Vec<NodeId>,
    },
}

/// Errors that can occur anywhere in the engine
#[derive(Debug, Error)]
pub enum FlowError {
    /// Structural graph error
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The graph failed validation; nothing was executed
    #[error("Validation failed: {}", format_validation(.0))]
    Validation(Vec<ValidationError>),

    /// Internal consistency violation
    #[error(transparent)]
    Consistency(#[from] ConsistencyError),

    /// The plan was computed for a different revision of the graph
    #[error("Execution plan is stale: planned revision {planned}, graph revision {current}")]
    StalePlan { planned: u64, current: u64 },

    /// No stored workflow has this id
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV encoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<Vec<ValidationError>> for FlowError {
    fn from(errors: Vec<ValidationError>) -> Self {
        Self::Validation(errors)
    }
}

fn format_validation(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
