//! Fluent builder for workflow definitions
//!
//! Provides a compact API for constructing workflows programmatically, in
//! tests and in embedding code.

use std::sync::Arc;

use crate::definition::{NodeDefinition, WorkflowDefinition, WorkflowMetadata};
use crate::error::GraphError;
use crate::graph::WorkflowGraph;
use crate::registry::WidgetRegistry;
use crate::types::Connection;

/// Fluent builder for workflow definitions
///
/// # Example
///
/// ```ignore
/// let graph = WorkflowBuilder::new("Sales overview")
///     .add_node("load", "dataset")
///     .with_params(serde_json::json!({"dataSetId": "sales"}))
///     .add_node("stats", "descriptive_stats")
///     .connect("load", "data", "stats", "data")
///     .build_graph(registry)?;
/// ```
pub struct WorkflowBuilder {
    name: String,
    nodes: Vec<NodeDefinition>,
    connections: Vec<Connection>,
    connection_counter: usize,
}

impl WorkflowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            connections: Vec::new(),
            connection_counter: 0,
        }
    }

    /// Add a node
    pub fn add_node(mut self, id: impl Into<String>, widget_kind: impl Into<String>) -> Self {
        self.nodes.push(NodeDefinition {
            id: id.into(),
            widget_kind: widget_kind.into(),
            params: None,
        });
        self
    }

    /// Set params on the most recently added node
    ///
    /// Must be called immediately after `add_node`.
    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.params = Some(params);
        }
        self
    }

    /// Connect an output port to an input port (auto-generates the connection ID)
    pub fn connect(
        mut self,
        from_node: impl Into<String>,
        from_output: impl Into<String>,
        to_node: impl Into<String>,
        to_input: impl Into<String>,
    ) -> Self {
        self.connection_counter += 1;
        self.connections.push(Connection {
            id: format!("conn-{}", self.connection_counter),
            from_node: from_node.into(),
            from_output: from_output.into(),
            to_node: to_node.into(),
            to_input: to_input.into(),
        });
        self
    }

    /// Build the definition without any checks
    pub fn build(self) -> WorkflowDefinition {
        WorkflowDefinition {
            id: None,
            name: self.name,
            nodes: self.nodes,
            connections: self.connections,
            metadata: WorkflowMetadata::now(),
        }
    }

    /// Build a graph, applying the structural checks of the graph model
    pub fn build_graph(self, registry: Arc<WidgetRegistry>) -> Result<WorkflowGraph, GraphError> {
        WorkflowGraph::from_definition(&self.build(), registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::test_registry;
    use serde_json::json;

    #[test]
    fn test_build_definition() {
        let def = WorkflowBuilder::new("wf")
            .add_node("a", "source")
            .with_params(json!({"dataSetId": "iris"}))
            .add_node("b", "transform")
            .add_node("c", "sink")
            .connect("a", "out", "b", "in")
            .connect("b", "out", "c", "in")
            .build();

        assert_eq!(def.name, "wf");
        assert_eq!(def.nodes.len(), 3);
        assert_eq!(def.nodes[0].params, Some(json!({"dataSetId": "iris"})));
        assert!(def.nodes[1].params.is_none());
        assert_eq!(def.connections[1].id, "conn-2");
        assert_eq!(def.connections[1].to_node, "c");
    }

    #[test]
    fn test_build_graph_checks_structure() {
        let graph = WorkflowBuilder::new("ok")
            .add_node("a", "source")
            .add_node("b", "sink")
            .connect("a", "out", "b", "in")
            .build_graph(test_registry())
            .unwrap();
        assert_eq!(graph.connections().len(), 1);

        let err = WorkflowBuilder::new("bad")
            .add_node("a", "source")
            .add_node("b", "sink")
            .connect("a", "missing", "b", "in")
            .build_graph(test_registry())
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownPort { .. }));

        let err = WorkflowBuilder::new("unknown")
            .add_node("x", "no_such_widget")
            .build_graph(test_registry())
            .unwrap_err();
        assert_eq!(err, GraphError::UnknownWidgetKind("no_such_widget".into()));
    }
}
