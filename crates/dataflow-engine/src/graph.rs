//! In-memory workflow graph
//!
//! The graph owns its nodes (in insertion order) and connections and enforces
//! the structural invariants on every edit:
//!
//! - every connection endpoint exists and names a declared port
//! - an input port has at most one incoming connection
//! - a node never connects to itself
//!
//! Failed edits leave the graph unchanged. Cycles are permitted here and
//! reported by [`validate`](crate::validation::validate).
//!
//! While an [`ExecutionLease`] is held every edit fails with
//! [`GraphError::GraphLockedForExecution`].

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::definition::{NodeDefinition, WorkflowDefinition, WorkflowMetadata};
use crate::error::{GraphError, PortDirection};
use crate::registry::WidgetRegistry;
use crate::report::ExecutionReport;
use crate::types::{Connection, ConnectionId, Node, NodeId, WidgetDefinition, WorkflowId};

type GraphResult<T> = std::result::Result<T, GraphError>;

/// Guard proving exclusive execution rights over a graph
///
/// Dropping the lease unlocks the graph.
#[derive(Debug)]
pub struct ExecutionLease {
    flag: Arc<AtomicBool>,
}

impl Drop for ExecutionLease {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Lookup tables over the node and connection vectors
///
/// Positions index into `WorkflowGraph::nodes` and `WorkflowGraph::connections`.
/// Appends extend the tables in place; removals rebuild them.
#[derive(Debug, Clone, Default)]
struct GraphIndex {
    nodes: HashMap<NodeId, usize>,
    connections: HashMap<ConnectionId, usize>,
    incoming: HashMap<NodeId, Vec<usize>>,
    outgoing: HashMap<NodeId, Vec<usize>>,
}

impl GraphIndex {
    fn build(nodes: &[Node], connections: &[Connection]) -> Self {
        let mut index = Self::default();
        for (pos, node) in nodes.iter().enumerate() {
            index.nodes.insert(node.id.clone(), pos);
        }
        for (pos, conn) in connections.iter().enumerate() {
            index.add_connection(conn, pos);
        }
        index
    }

    fn add_connection(&mut self, conn: &Connection, pos: usize) {
        self.connections.insert(conn.id.clone(), pos);
        self.outgoing
            .entry(conn.from_node.clone())
            .or_default()
            .push(pos);
        self.incoming.entry(conn.to_node.clone()).or_default().push(pos);
    }
}

/// A workflow graph bound to a widget registry
#[derive(Debug)]
pub struct WorkflowGraph {
    name: String,
    registry: Arc<WidgetRegistry>,
    nodes: Vec<Node>,
    connections: Vec<Connection>,
    index: GraphIndex,
    metadata: WorkflowMetadata,
    workflow_id: Option<WorkflowId>,
    revision: u64,
    next_node_seq: u64,
    next_connection_seq: u64,
    execution_lock: Arc<AtomicBool>,
}

impl WorkflowGraph {
    /// Create a new empty graph
    pub fn new(name: impl Into<String>, registry: Arc<WidgetRegistry>) -> Self {
        Self {
            name: name.into(),
            registry,
            nodes: Vec::new(),
            connections: Vec::new(),
            index: GraphIndex::default(),
            metadata: WorkflowMetadata::now(),
            workflow_id: None,
            revision: 0,
            next_node_seq: 1,
            next_connection_seq: 1,
            execution_lock: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Rebuild a graph from a definition, with every node Idle
    ///
    /// Goes through the same checks as interactive edits, so a corrupt
    /// definition is rejected with the first structural error found.
    pub fn from_definition(
        definition: &WorkflowDefinition,
        registry: Arc<WidgetRegistry>,
    ) -> GraphResult<Self> {
        let mut graph = Self::new(definition.name.clone(), registry);
        for node in &definition.nodes {
            graph.add_node_with_id(node.id.clone(), &node.widget_kind)?;
            if let Some(params) = &node.params {
                graph.set_node_params(&node.id, params.clone())?;
            }
        }
        for conn in &definition.connections {
            graph.connect_with_id(
                conn.id.clone(),
                &conn.from_node,
                &conn.from_output,
                &conn.to_node,
                &conn.to_input,
            )?;
        }
        graph.metadata = definition.metadata;
        graph.workflow_id = definition.id.clone();
        Ok(graph)
    }

    /// Serialize the structure and configuration of this graph
    pub fn to_definition(&self) -> WorkflowDefinition {
        WorkflowDefinition {
            id: self.workflow_id.clone(),
            name: self.name.clone(),
            nodes: self
                .nodes
                .iter()
                .map(|n| NodeDefinition {
                    id: n.id.clone(),
                    widget_kind: n.widget_kind.clone(),
                    params: match &n.params {
                        serde_json::Value::Object(map) if map.is_empty() => None,
                        serde_json::Value::Null => None,
                        other => Some(other.clone()),
                    },
                })
                .collect(),
            connections: self.connections.clone(),
            metadata: self.metadata,
        }
    }

    /// Create a copy for execution that shares this graph's execution lock
    ///
    /// A lease taken on the snapshot locks the original as well, so the
    /// original cannot be edited while the snapshot runs.
    pub fn snapshot(&self) -> Self {
        Self {
            name: self.name.clone(),
            registry: self.registry.clone(),
            nodes: self.nodes.clone(),
            connections: self.connections.clone(),
            index: self.index.clone(),
            metadata: self.metadata,
            workflow_id: self.workflow_id.clone(),
            revision: self.revision,
            next_node_seq: self.next_node_seq,
            next_connection_seq: self.next_connection_seq,
            execution_lock: self.execution_lock.clone(),
        }
    }

    // --- accessors ---

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &Arc<WidgetRegistry> {
        &self.registry
    }

    pub fn metadata(&self) -> &WorkflowMetadata {
        &self.metadata
    }

    /// Id assigned by the workflow store, if this graph was saved or loaded
    pub fn workflow_id(&self) -> Option<&str> {
        self.workflow_id.as_deref()
    }

    pub(crate) fn set_workflow_id(&mut self, id: WorkflowId) {
        self.workflow_id = Some(id);
    }

    /// Counter bumped on every edit
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether an execution lease is currently held
    pub fn is_locked(&self) -> bool {
        self.execution_lock.load(Ordering::Acquire)
    }

    /// Acquire the execution lease
    pub fn begin_execution(&self) -> GraphResult<ExecutionLease> {
        self.execution_lock
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| GraphError::GraphLockedForExecution(self.name.clone()))?;
        Ok(ExecutionLease {
            flag: self.execution_lock.clone(),
        })
    }

    // --- edits ---

    /// Rename the workflow
    pub fn set_name(&mut self, name: impl Into<String>) -> GraphResult<()> {
        self.ensure_unlocked()?;
        self.name = name.into();
        self.mark_modified();
        Ok(())
    }

    /// Add an Idle node of the given widget kind with a generated id
    pub fn add_node(&mut self, widget_kind: &str) -> GraphResult<NodeId> {
        self.ensure_unlocked()?;
        self.widget(widget_kind)?;
        let id = self.next_free_node_id();
        self.push_node(id.clone(), widget_kind);
        Ok(id)
    }

    /// Add an Idle node with an explicit id
    pub fn add_node_with_id(&mut self, id: impl Into<String>, widget_kind: &str) -> GraphResult<()> {
        self.ensure_unlocked()?;
        let id = id.into();
        self.widget(widget_kind)?;
        if self.node(&id).is_some() {
            return Err(GraphError::DuplicateNodeId(id));
        }
        self.push_node(id, widget_kind);
        Ok(())
    }

    /// Replace a node's configuration
    pub fn set_node_params(&mut self, id: &str, params: serde_json::Value) -> GraphResult<()> {
        self.ensure_unlocked()?;
        let node = self
            .index
            .nodes
            .get(id)
            .copied()
            .and_then(|pos| self.nodes.get_mut(pos))
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;
        node.params = params;
        self.mark_modified();
        Ok(())
    }

    /// Remove a node and every connection that references it
    pub fn remove_node(&mut self, id: &str) -> GraphResult<Node> {
        self.ensure_unlocked()?;
        let pos = self
            .index
            .nodes
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;
        let node = self.nodes.remove(pos);
        let before = self.connections.len();
        self.connections.retain(|c| !c.touches(id));
        self.reindex();
        log::debug!(
            "Removed node '{}' and {} connection(s)",
            id,
            before - self.connections.len()
        );
        self.mark_modified();
        Ok(node)
    }

    /// Connect an output port to an input port
    pub fn connect(
        &mut self,
        from_node: &str,
        from_output: &str,
        to_node: &str,
        to_input: &str,
    ) -> GraphResult<Connection> {
        self.ensure_unlocked()?;
        let id = self.next_free_connection_id();
        self.insert_connection(id, from_node, from_output, to_node, to_input)
    }

    /// Connect with an explicit connection id
    pub fn connect_with_id(
        &mut self,
        id: impl Into<String>,
        from_node: &str,
        from_output: &str,
        to_node: &str,
        to_input: &str,
    ) -> GraphResult<Connection> {
        self.ensure_unlocked()?;
        let id = id.into();
        if self.connection(&id).is_some() {
            return Err(GraphError::DuplicateConnectionId(id));
        }
        self.insert_connection(id, from_node, from_output, to_node, to_input)
    }

    /// Remove a connection
    pub fn disconnect(&mut self, connection_id: &str) -> GraphResult<Connection> {
        self.ensure_unlocked()?;
        let pos = self
            .index
            .connections
            .get(connection_id)
            .copied()
            .ok_or_else(|| GraphError::ConnectionNotFound(connection_id.to_string()))?;
        let conn = self.connections.remove(pos);
        self.reindex();
        self.mark_modified();
        Ok(conn)
    }

    /// Copy the outcome of a run onto the nodes
    ///
    /// Nodes absent from the report are reset to Idle.
    pub fn apply_report(&mut self, report: &ExecutionReport) -> GraphResult<()> {
        self.ensure_unlocked()?;
        for node in &mut self.nodes {
            node.reset();
            if let Some(result) = report.results.get(&node.id) {
                node.status = result.status;
                node.inputs = result.inputs.clone();
                node.outputs = result.outputs.clone().unwrap_or_default();
                node.error = result.error.clone();
            }
        }
        Ok(())
    }

    /// Reset every node to Idle with no inputs, outputs, or error
    pub fn reset_execution_state(&mut self) -> GraphResult<()> {
        self.ensure_unlocked()?;
        self.nodes.iter_mut().for_each(Node::reset);
        Ok(())
    }

    // --- queries ---

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.nodes.get(id).and_then(|pos| self.nodes.get(*pos))
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn connection(&self, id: &str) -> Option<&Connection> {
        self.index
            .connections
            .get(id)
            .and_then(|pos| self.connections.get(*pos))
    }

    /// Widget definition for a node
    pub fn widget_of(&self, node_id: &str) -> Option<&WidgetDefinition> {
        self.node(node_id)
            .and_then(|n| self.registry.definition(&n.widget_kind))
    }

    /// Connections coming into a node, in connection order
    pub fn incoming<'a>(&'a self, node_id: &str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections_at(self.index.incoming.get(node_id))
    }

    /// Connections going out of a node, in connection order
    pub fn outgoing<'a>(&'a self, node_id: &str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections_at(self.index.outgoing.get(node_id))
    }

    /// Position of a node in insertion order
    pub fn position(&self, node_id: &str) -> Option<usize> {
        self.index.nodes.get(node_id).copied()
    }

    /// Distinct direct predecessors, in connection order
    pub fn upstream_nodes(&self, node_id: &str) -> Vec<NodeId> {
        dedup(self.incoming(node_id).map(|c| c.from_node.clone()))
    }

    /// Distinct direct successors, in connection order
    pub fn downstream_nodes(&self, node_id: &str) -> Vec<NodeId> {
        dedup(self.outgoing(node_id).map(|c| c.to_node.clone()))
    }

    /// Every node reachable from `node_id`, excluding itself, in insertion order
    pub fn downstream_closure(&self, node_id: &str) -> Vec<NodeId> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([node_id]);
        while let Some(current) = queue.pop_front() {
            for conn in self.outgoing(current) {
                if seen.insert(conn.to_node.as_str()) {
                    queue.push_back(conn.to_node.as_str());
                }
            }
        }
        seen.remove(node_id);
        self.nodes
            .iter()
            .filter(|n| seen.contains(n.id.as_str()))
            .map(|n| n.id.clone())
            .collect()
    }

    // --- internals ---

    fn connections_at<'a>(
        &'a self,
        positions: Option<&'a Vec<usize>>,
    ) -> impl Iterator<Item = &'a Connection> + 'a {
        positions
            .into_iter()
            .flatten()
            .filter_map(|pos| self.connections.get(*pos))
    }

    fn reindex(&mut self) {
        self.index = GraphIndex::build(&self.nodes, &self.connections);
    }

    fn ensure_unlocked(&self) -> GraphResult<()> {
        if self.is_locked() {
            return Err(GraphError::GraphLockedForExecution(self.name.clone()));
        }
        Ok(())
    }

    fn mark_modified(&mut self) {
        self.revision += 1;
        self.metadata.touch();
    }

    fn widget(&self, kind: &str) -> GraphResult<&WidgetDefinition> {
        self.registry
            .definition(kind)
            .ok_or_else(|| GraphError::UnknownWidgetKind(kind.to_string()))
    }

    fn push_node(&mut self, id: NodeId, widget_kind: &str) {
        log::trace!("Adding node '{}' ({})", id, widget_kind);
        self.index.nodes.insert(id.clone(), self.nodes.len());
        self.nodes.push(Node::new(id, widget_kind));
        self.mark_modified();
    }

    fn next_free_node_id(&mut self) -> NodeId {
        loop {
            let id = format!("node-{}", self.next_node_seq);
            self.next_node_seq += 1;
            if self.node(&id).is_none() {
                return id;
            }
        }
    }

    fn next_free_connection_id(&mut self) -> ConnectionId {
        loop {
            let id = format!("conn-{}", self.next_connection_seq);
            self.next_connection_seq += 1;
            if self.connection(&id).is_none() {
                return id;
            }
        }
    }

    fn insert_connection(
        &mut self,
        id: ConnectionId,
        from_node: &str,
        from_output: &str,
        to_node: &str,
        to_input: &str,
    ) -> GraphResult<Connection> {
        let from = self
            .node(from_node)
            .ok_or_else(|| GraphError::NodeNotFound(from_node.to_string()))?;
        let to = self
            .node(to_node)
            .ok_or_else(|| GraphError::NodeNotFound(to_node.to_string()))?;

        if from.id == to.id {
            return Err(GraphError::DuplicateNode(from.id.clone()));
        }

        let from_widget = self.widget(&from.widget_kind)?;
        if from_widget.output(from_output).is_none() {
            return Err(GraphError::UnknownPort {
                node_id: from.id.clone(),
                widget_kind: from.widget_kind.clone(),
                port: from_output.to_string(),
                direction: PortDirection::Output,
            });
        }

        let to_widget = self.widget(&to.widget_kind)?;
        if to_widget.input(to_input).is_none() {
            return Err(GraphError::UnknownPort {
                node_id: to.id.clone(),
                widget_kind: to.widget_kind.clone(),
                port: to_input.to_string(),
                direction: PortDirection::Input,
            });
        }

        if let Some(existing) = self.incoming(to_node).find(|c| c.to_input == to_input) {
            return Err(GraphError::InputAlreadyBound {
                node_id: to_node.to_string(),
                port: to_input.to_string(),
                existing: existing.id.clone(),
            });
        }

        let conn = Connection {
            id,
            from_node: from_node.to_string(),
            from_output: from_output.to_string(),
            to_node: to_node.to_string(),
            to_input: to_input.to_string(),
        };
        self.index.add_connection(&conn, self.connections.len());
        self.connections.push(conn.clone());
        self.mark_modified();
        Ok(conn)
    }
}

fn dedup(ids: impl Iterator<Item = NodeId>) -> Vec<NodeId> {
    let mut seen = BTreeSet::new();
    ids.filter(|id| seen.insert(id.clone())).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{NodeStatus, PortDefinition, WidgetCategory};
    use serde_json::json;

    /// Registry with `source` (out), `transform` (in -> out), `sink` (required in)
    /// and `pair` (required left/right -> out)
    pub(crate) fn test_registry() -> Arc<WidgetRegistry> {
        let mut registry = WidgetRegistry::new();
        registry.register_definition(WidgetDefinition {
            kind: "source".to_string(),
            label: "Source".to_string(),
            description: String::new(),
            category: WidgetCategory::DataSource,
            inputs: vec![],
            outputs: vec![PortDefinition::optional("out", "Out")],
        });
        registry.register_definition(WidgetDefinition {
            kind: "transform".to_string(),
            label: "Transform".to_string(),
            description: String::new(),
            category: WidgetCategory::Preprocessing,
            inputs: vec![PortDefinition::required("in", "In")],
            outputs: vec![PortDefinition::optional("out", "Out")],
        });
        registry.register_definition(WidgetDefinition {
            kind: "sink".to_string(),
            label: "Sink".to_string(),
            description: String::new(),
            category: WidgetCategory::Export,
            inputs: vec![PortDefinition::required("in", "In")],
            outputs: vec![],
        });
        registry.register_definition(WidgetDefinition {
            kind: "pair".to_string(),
            label: "Pair".to_string(),
            description: String::new(),
            category: WidgetCategory::Analysis,
            inputs: vec![
                PortDefinition::required("left", "Left"),
                PortDefinition::required("right", "Right"),
            ],
            outputs: vec![PortDefinition::optional("out", "Out")],
        });
        Arc::new(registry)
    }

    fn chain() -> WorkflowGraph {
        let mut graph = WorkflowGraph::new("chain", test_registry());
        graph.add_node_with_id("a", "source").unwrap();
        graph.add_node_with_id("b", "transform").unwrap();
        graph.add_node_with_id("c", "sink").unwrap();
        graph.connect("a", "out", "b", "in").unwrap();
        graph.connect("b", "out", "c", "in").unwrap();
        graph
    }

    #[test]
    fn test_add_node_generates_unique_ids() {
        let mut graph = WorkflowGraph::new("g", test_registry());
        graph.add_node_with_id("node-1", "source").unwrap();
        let id = graph.add_node("source").unwrap();
        assert_eq!(id, "node-2");
        assert_eq!(graph.node(&id).unwrap().status, NodeStatus::Idle);
    }

    #[test]
    fn test_add_node_unknown_kind() {
        let mut graph = WorkflowGraph::new("g", test_registry());
        let err = graph.add_node("nope").unwrap_err();
        assert_eq!(err, GraphError::UnknownWidgetKind("nope".to_string()));
        assert!(graph.nodes().is_empty());
    }

    #[test]
    fn test_add_node_duplicate_id() {
        let mut graph = WorkflowGraph::new("g", test_registry());
        graph.add_node_with_id("a", "source").unwrap();
        let err = graph.add_node_with_id("a", "sink").unwrap_err();
        assert_eq!(err, GraphError::DuplicateNodeId("a".to_string()));
        assert_eq!(graph.nodes().len(), 1);
    }

    #[test]
    fn test_connect_rejects_unknown_port() {
        let mut graph = chain();
        let err = graph.connect("a", "missing", "c", "in").unwrap_err();
        assert!(matches!(
            err,
            GraphError::UnknownPort { direction: PortDirection::Output, .. }
        ));

        graph.add_node_with_id("d", "sink").unwrap();
        let err = graph.connect("a", "out", "d", "nope").unwrap_err();
        assert!(matches!(
            err,
            GraphError::UnknownPort { direction: PortDirection::Input, .. }
        ));
    }

    #[test]
    fn test_connect_rejects_missing_node_and_self_loop() {
        let mut graph = chain();
        assert_eq!(
            graph.connect("ghost", "out", "b", "in").unwrap_err(),
            GraphError::NodeNotFound("ghost".to_string())
        );
        assert_eq!(
            graph.connect("b", "out", "b", "in").unwrap_err(),
            GraphError::DuplicateNode("b".to_string())
        );
    }

    #[test]
    fn test_single_writer_per_input() {
        let mut graph = chain();
        graph.add_node_with_id("a2", "source").unwrap();
        let before = graph.connections().to_vec();

        let err = graph.connect("a2", "out", "b", "in").unwrap_err();
        match err {
            GraphError::InputAlreadyBound { existing, .. } => assert_eq!(existing, before[0].id),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(graph.connections(), before.as_slice());
    }

    #[test]
    fn test_remove_node_cascades() {
        let mut graph = chain();
        graph.remove_node("b").unwrap();

        assert!(graph.node("b").is_none());
        assert!(graph.connections().is_empty());
        assert!(graph.connections().iter().all(|c| !c.touches("b")));
        assert_eq!(
            graph.remove_node("b").unwrap_err(),
            GraphError::NodeNotFound("b".to_string())
        );
    }

    #[test]
    fn test_lookups_follow_removals() {
        let mut graph = chain();
        graph.add_node_with_id("d", "sink").unwrap();
        graph.connect("b", "out", "d", "in").unwrap();
        graph.remove_node("a").unwrap();

        assert_eq!(graph.position("b"), Some(0));
        assert_eq!(graph.position("d"), Some(2));
        assert_eq!(graph.node("d").unwrap().widget_kind, "sink");
        assert!(graph.incoming("b").next().is_none());
        let targets: Vec<&str> = graph.outgoing("b").map(|c| c.to_node.as_str()).collect();
        assert_eq!(targets, ["c", "d"]);

        let id = graph.connections()[0].id.clone();
        graph.disconnect(&id).unwrap();
        let remaining = graph.connections()[0].id.clone();
        assert_eq!(graph.connection(&remaining).unwrap().to_node, "d");
        assert!(graph.connection(&id).is_none());

        // the freed input can be bound again
        graph.add_node_with_id("a", "source").unwrap();
        graph.connect("a", "out", "c", "in").unwrap();
        assert_eq!(graph.upstream_nodes("c"), vec!["a"]);
    }

    #[test]
    fn test_disconnect() {
        let mut graph = chain();
        let id = graph.connections()[0].id.clone();
        graph.disconnect(&id).unwrap();
        assert_eq!(graph.connections().len(), 1);
        assert_eq!(
            graph.disconnect(&id).unwrap_err(),
            GraphError::ConnectionNotFound(id)
        );
    }

    #[test]
    fn test_neighbourhood_queries() {
        let mut graph = chain();
        graph.add_node_with_id("d", "sink").unwrap();
        graph.connect("a", "out", "d", "in").unwrap();

        assert_eq!(graph.upstream_nodes("b"), vec!["a"]);
        assert_eq!(graph.downstream_nodes("a"), vec!["b", "d"]);
        assert_eq!(graph.downstream_closure("a"), vec!["b", "c", "d"]);
        assert_eq!(graph.downstream_closure("b"), vec!["c"]);
        assert!(graph.downstream_closure("c").is_empty());
    }

    #[test]
    fn test_revision_bumps_on_edit() {
        let mut graph = WorkflowGraph::new("g", test_registry());
        let r0 = graph.revision();
        graph.add_node_with_id("a", "source").unwrap();
        assert!(graph.revision() > r0);

        let r1 = graph.revision();
        let _ = graph.add_node("nope");
        assert_eq!(graph.revision(), r1);
    }

    #[test]
    fn test_lease_blocks_edits() {
        let mut graph = chain();
        let lease = graph.begin_execution().unwrap();

        assert!(graph.is_locked());
        assert!(matches!(
            graph.add_node("source"),
            Err(GraphError::GraphLockedForExecution(_))
        ));
        assert!(matches!(
            graph.remove_node("a"),
            Err(GraphError::GraphLockedForExecution(_))
        ));
        assert!(matches!(
            graph.begin_execution(),
            Err(GraphError::GraphLockedForExecution(_))
        ));

        drop(lease);
        assert!(!graph.is_locked());
        graph.add_node("source").unwrap();
    }

    #[test]
    fn test_snapshot_shares_lock() {
        let mut graph = chain();
        let snapshot = graph.snapshot();
        let lease = snapshot.begin_execution().unwrap();
        assert!(graph.set_node_params("a", json!({})).is_err());
        drop(lease);
        graph.set_node_params("a", json!({"x": 1})).unwrap();
        assert_eq!(snapshot.node("a").unwrap().params, json!({}));
    }

    #[test]
    fn test_definition_round_trip_resets_state() {
        let mut graph = chain();
        graph.set_node_params("a", json!({"dataSetId": "sales"})).unwrap();
        graph.nodes[0].status = NodeStatus::Completed;
        graph.nodes[0].outputs.insert("out".to_string(), json!([1]));

        let def = graph.to_definition();
        assert_eq!(def.nodes[0].params, Some(json!({"dataSetId": "sales"})));
        assert_eq!(def.nodes[1].params, None);

        let loaded = WorkflowGraph::from_definition(&def, test_registry()).unwrap();
        assert_eq!(loaded.nodes().len(), 3);
        assert_eq!(loaded.connections(), graph.connections());
        assert!(loaded
            .nodes()
            .iter()
            .all(|n| n.status == NodeStatus::Idle && n.outputs.is_empty()));
        assert_eq!(loaded.metadata(), graph.metadata());
    }

    #[test]
    fn test_from_definition_rejects_corrupt_connection() {
        let mut def = chain().to_definition();
        def.connections[0].from_node = "ghost".to_string();
        let err = WorkflowGraph::from_definition(&def, test_registry()).unwrap_err();
        assert_eq!(err, GraphError::NodeNotFound("ghost".to_string()));
    }
}
