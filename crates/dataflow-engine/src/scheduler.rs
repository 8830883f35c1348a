//! Batch scheduling with Kahn's algorithm
//!
//! Each round takes every unscheduled node whose in-degree has reached zero
//! and emits them as one batch, ordered by node insertion order. Nodes in the
//! same batch have no dependency on each other and may run concurrently.

use std::collections::HashMap;

use crate::error::ConsistencyError;
use crate::graph::WorkflowGraph;
use crate::types::NodeId;

/// Ordered batches of node ids for one graph revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    revision: u64,
    batches: Vec<Vec<NodeId>>,
    positions: HashMap<NodeId, usize>,
}

impl ExecutionPlan {
    /// Batches in execution order
    pub fn batches(&self) -> &[Vec<NodeId>] {
        &self.batches
    }

    /// Index of the batch containing `node_id`
    pub fn batch_index(&self, node_id: &str) -> Option<usize> {
        self.positions.get(node_id).copied()
    }

    /// Number of batches
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Number of scheduled nodes
    pub fn node_count(&self) -> usize {
        self.positions.len()
    }

    /// Graph revision this plan was computed from
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Node ids flattened in execution order
    pub fn execution_order(&self) -> impl Iterator<Item = &NodeId> {
        self.batches.iter().flatten()
    }

    pub(crate) fn into_batches(self) -> Vec<Vec<NodeId>> {
        self.batches
    }
}

/// Compute execution batches for a graph
///
/// Fails with [`ConsistencyError::IncompletePlan`] rather than returning a
/// truncated plan when some nodes can never reach in-degree zero.
pub fn plan(graph: &WorkflowGraph) -> Result<ExecutionPlan, ConsistencyError> {
    let nodes = graph.nodes();
    let mut in_degree: Vec<usize> = vec![0; nodes.len()];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for conn in graph.connections() {
        if let (Some(from), Some(to)) = (graph.position(&conn.from_node), graph.position(&conn.to_node)) {
            in_degree[to] += 1;
            successors[from].push(to);
        }
    }

    let mut batches: Vec<Vec<NodeId>> = Vec::new();
    let mut positions: HashMap<NodeId, usize> = HashMap::with_capacity(nodes.len());

    // node positions double as the insertion order tie-break
    let mut ready: Vec<usize> = (0..nodes.len()).filter(|i| in_degree[*i] == 0).collect();
    while !ready.is_empty() {
        let index = batches.len();
        let mut next: Vec<usize> = Vec::new();
        for &node in &ready {
            positions.insert(nodes[node].id.clone(), index);
            for &target in &successors[node] {
                in_degree[target] -= 1;
                if in_degree[target] == 0 {
                    next.push(target);
                }
            }
        }
        next.sort_unstable();
        batches.push(ready.iter().map(|i| nodes[*i].id.clone()).collect());
        ready = next;
    }

    if positions.len() < nodes.len() {
        let unscheduled: Vec<NodeId> = nodes
            .iter()
            .filter(|n| !positions.contains_key(&n.id))
            .map(|n| n.id.clone())
            .collect();
        return Err(ConsistencyError::IncompletePlan {
            unscheduled: unscheduled.len(),
            total: nodes.len(),
            nodes: unscheduled,
        });
    }

    log::debug!(
        "Planned {} node(s) in {} batch(es) for '{}'",
        positions.len(),
        batches.len(),
        graph.name()
    );

    Ok(ExecutionPlan {
        revision: graph.revision(),
        batches,
        positions,
    })
}
