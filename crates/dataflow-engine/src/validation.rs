//! Graph validation
//!
//! Checks, in order, that connection endpoints exist, that the graph is
//! acyclic, and that required inputs are covered. All errors are collected
//! (not just the first). A graph that passes is handed to the scheduler and
//! comes back as an [`ExecutionPlan`].

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::graph::WorkflowGraph;
use crate::scheduler::{self, ExecutionPlan};
use crate::types::NodeId;

/// Switches for optional validation checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationOptions {
    /// Report required inputs with no connection, default, or parameter value
    pub require_inputs: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            require_inputs: true,
        }
    }
}

/// Validate a graph with default options
pub fn validate(graph: &WorkflowGraph) -> Result<ExecutionPlan, Vec<ValidationError>> {
    validate_with(graph, &ValidationOptions::default())
}

/// Validate a graph and compute its execution plan
///
/// # Panics
///
/// If the scheduler cannot order a graph that passed validation. That means
/// the cycle check and the scheduler disagree, which is a bug in this crate.
pub fn validate_with(
    graph: &WorkflowGraph,
    options: &ValidationOptions,
) -> Result<ExecutionPlan, Vec<ValidationError>> {
    let errors = collect_errors(graph, options);
    if !errors.is_empty() {
        log::info!(
            "Workflow '{}' failed validation with {} error(s)",
            graph.name(),
            errors.len()
        );
        return Err(errors);
    }

    match scheduler::plan(graph) {
        Ok(plan) => Ok(plan),
        Err(err) => {
            log::error!("Validated graph '{}' could not be scheduled: {}", graph.name(), err);
            panic!(
                "scheduler rejected a graph that passed validation ('{}'): {}",
                graph.name(),
                err
            );
        }
    }
}

/// Run every check and return all errors found
pub fn collect_errors(graph: &WorkflowGraph, options: &ValidationOptions) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    validate_connection_endpoints(graph, &mut errors);
    detect_cycles(graph, &mut errors);
    if options.require_inputs {
        validate_required_inputs(graph, &mut errors);
    }

    errors
}

/// Check that all connection endpoints exist
///
/// The graph model maintains this on every edit; a hit here means that
/// invariant was broken.
fn validate_connection_endpoints(graph: &WorkflowGraph, errors: &mut Vec<ValidationError>) {
    for conn in graph.connections() {
        for endpoint in [&conn.from_node, &conn.to_node] {
            if graph.node(endpoint).is_none() {
                log::error!(
                    "Connection '{}' in '{}' references missing node '{}'",
                    conn.id,
                    graph.name(),
                    endpoint
                );
                errors.push(ValidationError::DanglingConnection {
                    connection_id: conn.id.clone(),
                    node_id: endpoint.clone(),
                });
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

struct CycleSearch<'a> {
    successors: HashMap<&'a str, Vec<&'a str>>,
    marks: HashMap<&'a str, Mark>,
    path: Vec<&'a str>,
    seen: HashSet<Vec<&'a str>>,
    cycles: Vec<Vec<NodeId>>,
}

impl<'a> CycleSearch<'a> {
    fn new(graph: &'a WorkflowGraph) -> Self {
        let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
        for conn in graph.connections() {
            successors
                .entry(conn.from_node.as_str())
                .or_default()
                .push(conn.to_node.as_str());
        }
        Self {
            successors,
            marks: graph
                .nodes()
                .iter()
                .map(|n| (n.id.as_str(), Mark::Unvisited))
                .collect(),
            path: Vec::new(),
            seen: HashSet::new(),
            cycles: Vec::new(),
        }
    }

    /// Depth-first walk from `root` with an explicit stack
    ///
    /// Each frame holds a node and the index of its next successor to follow,
    /// so the walk order matches connection order.
    fn visit(&mut self, root: &'a str) {
        let mut stack: Vec<(&'a str, usize)> = vec![(root, 0)];
        self.enter(root);

        while let Some(frame) = stack.last_mut() {
            let (node_id, next) = *frame;
            let successor = self
                .successors
                .get(node_id)
                .and_then(|targets| targets.get(next))
                .copied();

            match successor {
                Some(target) => {
                    frame.1 += 1;
                    match self.marks.get(target).copied() {
                        Some(Mark::Unvisited) => {
                            self.enter(target);
                            stack.push((target, 0));
                        }
                        Some(Mark::OnStack) => self.record_cycle(target),
                        Some(Mark::Done) | None => {}
                    }
                }
                None => {
                    stack.pop();
                    self.path.pop();
                    self.marks.insert(node_id, Mark::Done);
                }
            }
        }
    }

    fn enter(&mut self, node_id: &'a str) {
        self.marks.insert(node_id, Mark::OnStack);
        self.path.push(node_id);
    }

    fn record_cycle(&mut self, entry: &'a str) {
        let Some(start) = self.path.iter().position(|id| *id == entry) else {
            return;
        };
        let cycle: Vec<&'a str> = self.path[start..].to_vec();

        // rotations of one cycle share a key
        let min = cycle
            .iter()
            .enumerate()
            .min_by_key(|(_, id)| **id)
            .map(|(i, _)| i)
            .unwrap_or(0);
        let mut key = cycle.clone();
        key.rotate_left(min);

        if self.seen.insert(key) {
            self.cycles
                .push(cycle.into_iter().map(str::to_string).collect());
        }
    }
}

/// Detect cycles with a depth-first search
///
/// Each back edge names one cycle; its participants are reported in path
/// order starting from the node the back edge returns to.
fn detect_cycles(graph: &WorkflowGraph, errors: &mut Vec<ValidationError>) {
    let mut search = CycleSearch::new(graph);

    for node in graph.nodes() {
        if search.marks.get(node.id.as_str()) == Some(&Mark::Unvisited) {
            search.visit(&node.id);
        }
    }

    for cycle in search.cycles {
        log::debug!("Cycle detected: {}", cycle.join(" -> "));
        errors.push(ValidationError::CycleDetected(cycle));
    }
}

/// Check that required inputs are connected, defaulted, or configured
fn validate_required_inputs(graph: &WorkflowGraph, errors: &mut Vec<ValidationError>) {
    let connected_inputs: HashSet<(&str, &str)> = graph
        .connections()
        .iter()
        .map(|c| (c.to_node.as_str(), c.to_input.as_str()))
        .collect();

    for node in graph.nodes() {
        let Some(widget) = graph.registry().definition(&node.widget_kind) else {
            continue;
        };
        for port in widget.required_inputs() {
            let covered = connected_inputs.contains(&(node.id.as_str(), port.name.as_str()))
                || port.default_value.is_some()
                || node.param(&port.name).is_some();
            if !covered {
                errors.push(ValidationError::MissingRequiredInput {
                    node_id: node.id.clone(),
                    port: port.name.clone(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::test_registry;
    use crate::types::NodeStatus;
    use serde_json::json;

    fn cyclic() -> WorkflowGraph {
        // s -> b.left, b -> a, a -> b.right
        let mut graph = WorkflowGraph::new("cyclic", test_registry());
        graph.add_node_with_id("s", "source").unwrap();
        graph.add_node_with_id("a", "transform").unwrap();
        graph.add_node_with_id("b", "pair").unwrap();
        graph.connect("s", "out", "b", "left").unwrap();
        graph.connect("b", "out", "a", "in").unwrap();
        graph.connect("a", "out", "b", "right").unwrap();
        graph
    }

    #[test]
    fn test_valid_chain_produces_plan() {
        let mut graph = WorkflowGraph::new("ok", test_registry());
        graph.add_node_with_id("a", "source").unwrap();
        graph.add_node_with_id("b", "sink").unwrap();
        graph.connect("a", "out", "b", "in").unwrap();

        let plan = validate(&graph).unwrap();
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_cycle_detected_in_path_order() {
        let graph = cyclic();
        let errors = validate(&graph).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::CycleDetected(vec!["b".to_string(), "a".to_string()])]
        );
        assert!(graph.nodes().iter().all(|n| n.status == NodeStatus::Idle));
    }

    #[test]
    fn test_cycle_reported_once_for_parallel_back_edges() {
        // both back edges close the same p -> a -> p cycle
        let mut graph = WorkflowGraph::new("twice", test_registry());
        graph.add_node_with_id("p", "pair").unwrap();
        graph.add_node_with_id("a", "transform").unwrap();
        graph.connect("p", "out", "a", "in").unwrap();
        graph.connect("a", "out", "p", "left").unwrap();
        graph.connect("a", "out", "p", "right").unwrap();

        let errors = validate(&graph).unwrap_err();
        let cycles: Vec<_> = errors
            .iter()
            .filter(|e| matches!(e, ValidationError::CycleDetected(_)))
            .collect();
        assert_eq!(cycles.len(), 1);
    }

    #[test]
    fn test_two_disjoint_cycles_reported() {
        let mut graph = cyclic();
        graph.add_node_with_id("x", "transform").unwrap();
        graph.add_node_with_id("y", "transform").unwrap();
        graph.connect("x", "out", "y", "in").unwrap();
        graph.connect("y", "out", "x", "in").unwrap();

        let errors = validate(&graph).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::CycleDetected(vec!["b".to_string(), "a".to_string()]),
                ValidationError::CycleDetected(vec!["x".to_string(), "y".to_string()]),
            ]
        );
    }

    #[test]
    fn test_missing_required_input() {
        let mut graph = WorkflowGraph::new("missing", test_registry());
        graph.add_node_with_id("a", "source").unwrap();
        graph.add_node_with_id("p", "pair").unwrap();
        graph.connect("a", "out", "p", "left").unwrap();

        let errors = validate(&graph).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::MissingRequiredInput {
                node_id: "p".to_string(),
                port: "right".to_string(),
            }]
        );
    }

    #[test]
    fn test_param_value_satisfies_required_input() {
        let mut graph = WorkflowGraph::new("param", test_registry());
        graph.add_node_with_id("t", "transform").unwrap();
        graph.set_node_params("t", json!({"in": [1, 2, 3]})).unwrap();
        assert!(validate(&graph).is_ok());
    }

    #[test]
    fn test_require_inputs_can_be_disabled() {
        let mut graph = WorkflowGraph::new("lenient", test_registry());
        graph.add_node_with_id("sink", "sink").unwrap();

        assert!(validate(&graph).is_err());
        let options = ValidationOptions {
            require_inputs: false,
        };
        assert!(validate_with(&graph, &options).is_ok());
    }

    fn long_chain(len: usize) -> WorkflowGraph {
        let mut graph = WorkflowGraph::new("long", test_registry());
        graph.add_node_with_id("n0", "source").unwrap();
        for i in 1..len {
            let id = format!("n{i}");
            graph.add_node_with_id(id.clone(), "transform").unwrap();
            graph.connect(&format!("n{}", i - 1), "out", &id, "in").unwrap();
        }
        graph
    }

    #[test]
    fn test_long_chain_validates_without_deep_recursion() {
        let graph = long_chain(20_000);
        let plan = validate(&graph).unwrap();
        assert_eq!(plan.len(), 20_000);
        assert_eq!(plan.batch_index("n19999"), Some(19_999));
    }

    #[test]
    fn test_cycle_at_the_end_of_a_long_chain() {
        let mut graph = long_chain(20_000);
        graph.add_node_with_id("loop", "pair").unwrap();
        graph.connect("n19999", "out", "loop", "left").unwrap();
        graph.add_node_with_id("head", "transform").unwrap();
        graph.connect("loop", "out", "head", "in").unwrap();
        graph.connect("head", "out", "loop", "right").unwrap();

        let errors = validate(&graph).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::CycleDetected(vec![
                "loop".to_string(),
                "head".to_string()
            ])]
        );
    }

    #[test]
    fn test_all_errors_collected() {
        let mut graph = cyclic();
        graph.add_node_with_id("lonely", "sink").unwrap();

        let errors = validate(&graph).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], ValidationError::CycleDetected(_)));
        assert!(matches!(errors[1], ValidationError::MissingRequiredInput { .. }));
    }
}
