//! Core types for workflow graphs
//!
//! These types describe widgets (the catalog entries), nodes (widget
//! instances placed in a graph), and the connections between them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Unique identifier for a node within a graph
pub type NodeId = String;

/// Unique identifier for a connection within a graph
pub type ConnectionId = String;

/// Name of a port, unique per direction within a widget
pub type PortName = String;

/// Identifier assigned by the workflow store
pub type WorkflowId = String;

/// Port values keyed by port name
pub type PortValues = BTreeMap<PortName, serde_json::Value>;

/// Category of a widget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetCategory {
    /// Loads data into the workflow
    DataSource,
    /// Cleans or reshapes tables
    Preprocessing,
    /// Computes statistics or models
    Analysis,
    /// Produces chart specifications
    Visualization,
    /// Writes results out of the workflow
    Export,
}

impl WidgetCategory {
    /// All categories in palette order
    pub const ALL: [WidgetCategory; 5] = [
        WidgetCategory::DataSource,
        WidgetCategory::Preprocessing,
        WidgetCategory::Analysis,
        WidgetCategory::Visualization,
        WidgetCategory::Export,
    ];
}

/// Definition of a port (input or output)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortDefinition {
    /// Port name, used as the key in input and output maps
    pub name: PortName,
    /// Human-readable label
    pub label: String,
    /// Whether this port must be bound before execution (inputs only)
    #[serde(default)]
    pub required: bool,
    /// Value used when an input port is left unbound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
}

impl PortDefinition {
    /// Create a required port
    pub fn required(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            required: true,
            default_value: None,
        }
    }

    /// Create an optional port
    pub fn optional(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            required: false,
            default_value: None,
        }
    }

    /// Set a default value for this port
    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default_value = Some(value);
        self
    }
}

/// Catalog entry describing a widget kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetDefinition {
    /// Unique kind identifier (e.g., "descriptive_stats")
    pub kind: String,
    /// Human-readable label
    pub label: String,
    /// Description of what the widget does
    #[serde(default)]
    pub description: String,
    /// Category for palette grouping
    pub category: WidgetCategory,
    /// Input ports in declaration order
    #[serde(default)]
    pub inputs: Vec<PortDefinition>,
    /// Output ports in declaration order
    #[serde(default)]
    pub outputs: Vec<PortDefinition>,
}

impl WidgetDefinition {
    /// Find an input port by name
    pub fn input(&self, name: &str) -> Option<&PortDefinition> {
        self.inputs.iter().find(|p| p.name == name)
    }

    /// Find an output port by name
    pub fn output(&self, name: &str) -> Option<&PortDefinition> {
        self.outputs.iter().find(|p| p.name == name)
    }

    /// Iterate over the required input ports
    pub fn required_inputs(&self) -> impl Iterator<Item = &PortDefinition> {
        self.inputs.iter().filter(|p| p.required)
    }
}

/// Execution status of a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Not yet run in the current execution
    #[default]
    Idle,
    /// Widget operation in flight
    Running,
    /// Finished successfully; outputs are available
    Completed,
    /// Widget operation failed
    Error,
    /// Skipped because an upstream node did not complete
    Blocked,
}

impl NodeStatus {
    /// Whether no further transition can happen in this run
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Blocked)
    }

    /// Whether downstream nodes must be blocked
    pub fn blocks_downstream(self) -> bool {
        matches!(self, Self::Error | Self::Blocked)
    }
}

/// A widget instance placed in a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier within the graph
    pub id: NodeId,
    /// Widget kind (references a WidgetDefinition)
    pub widget_kind: String,
    /// Per-node configuration (column names, dataset ids, ...)
    pub params: serde_json::Value,
    /// Status from the most recent execution
    pub status: NodeStatus,
    /// Inputs resolved in the most recent execution
    pub inputs: PortValues,
    /// Outputs produced in the most recent execution
    pub outputs: PortValues,
    /// Error message from the most recent execution
    pub error: Option<String>,
}

impl Node {
    /// Create an idle node with empty params
    pub fn new(id: impl Into<String>, widget_kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            widget_kind: widget_kind.into(),
            params: serde_json::Value::Object(serde_json::Map::new()),
            status: NodeStatus::Idle,
            inputs: PortValues::new(),
            outputs: PortValues::new(),
            error: None,
        }
    }

    /// Look up a parameter by key
    pub fn param(&self, key: &str) -> Option<&serde_json::Value> {
        self.params.get(key).filter(|v| !v.is_null())
    }

    /// Clear all execution state back to Idle
    pub fn reset(&mut self) {
        self.status = NodeStatus::Idle;
        self.inputs.clear();
        self.outputs.clear();
        self.error = None;
    }
}

/// A directed connection from an output port to an input port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// Unique identifier for this connection
    pub id: ConnectionId,
    /// Source node ID
    pub from_node: NodeId,
    /// Source output port
    pub from_output: PortName,
    /// Target node ID
    pub to_node: NodeId,
    /// Target input port
    pub to_input: PortName,
}

impl Connection {
    /// Whether either endpoint is the given node
    pub fn touches(&self, node_id: &str) -> bool {
        self.from_node == node_id || self.to_node == node_id
    }
}
