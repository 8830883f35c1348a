//! Per-run execution report

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{NodeId, NodeStatus, PortValues};

/// Why a node did not run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum BlockedReason {
    /// An upstream node failed; `root` is the node whose failure caused the block
    #[serde(rename_all = "camelCase")]
    UpstreamFailed { root: NodeId },
    /// The run was cancelled before or while this node ran
    Cancelled,
}

/// Outcome of one node in a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeResult {
    pub widget_kind: String,
    pub success: bool,
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "PortValues::is_empty")]
    pub inputs: PortValues,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<PortValues>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<BlockedReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl NodeResult {
    pub(crate) fn completed(
        widget_kind: String,
        inputs: PortValues,
        outputs: PortValues,
        duration_ms: u64,
    ) -> Self {
        Self {
            widget_kind,
            success: true,
            status: NodeStatus::Completed,
            inputs,
            outputs: Some(outputs),
            error: None,
            blocked_reason: None,
            duration_ms: Some(duration_ms),
        }
    }

    pub(crate) fn failed(
        widget_kind: String,
        inputs: PortValues,
        error: String,
        duration_ms: Option<u64>,
    ) -> Self {
        Self {
            widget_kind,
            success: false,
            status: NodeStatus::Error,
            inputs,
            outputs: None,
            error: Some(error),
            blocked_reason: None,
            duration_ms,
        }
    }

    pub(crate) fn blocked(widget_kind: String, reason: BlockedReason) -> Self {
        let error = match &reason {
            BlockedReason::UpstreamFailed { root } => format!("Blocked by failed upstream node '{}'", root),
            BlockedReason::Cancelled => "Cancelled".to_string(),
        };
        Self {
            widget_kind,
            success: false,
            status: NodeStatus::Blocked,
            inputs: PortValues::new(),
            outputs: None,
            error: Some(error),
            blocked_reason: Some(reason),
            duration_ms: None,
        }
    }
}

/// Result of executing a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub execution_id: String,
    pub workflow_name: String,
    /// Batches in the order they were planned
    pub batches: Vec<Vec<NodeId>>,
    pub results: BTreeMap<NodeId, NodeResult>,
    /// Whether the run was cancelled before finishing
    pub cancelled: bool,
}

impl ExecutionReport {
    /// Node ids in execution order
    pub fn execution_order(&self) -> Vec<NodeId> {
        self.batches.iter().flatten().cloned().collect()
    }

    pub fn result(&self, node_id: &str) -> Option<&NodeResult> {
        self.results.get(node_id)
    }

    pub fn status(&self, node_id: &str) -> Option<NodeStatus> {
        self.results.get(node_id).map(|r| r.status)
    }

    /// Whether every node completed
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.results.values().all(|r| r.success)
    }

    /// Nodes that failed on their own
    pub fn failed_nodes(&self) -> Vec<&str> {
        self.nodes_where(|r| r.status == NodeStatus::Error)
    }

    /// Nodes skipped because an upstream node failed
    pub fn blocked_nodes(&self) -> Vec<&str> {
        self.nodes_where(|r| {
            matches!(r.blocked_reason, Some(BlockedReason::UpstreamFailed { .. }))
        })
    }

    /// Nodes that did not finish because the run was cancelled
    pub fn cancelled_nodes(&self) -> Vec<&str> {
        self.nodes_where(|r| matches!(r.blocked_reason, Some(BlockedReason::Cancelled)))
    }

    fn nodes_where(&self, pred: impl Fn(&NodeResult) -> bool) -> Vec<&str> {
        self.execution_order_refs()
            .filter(|id| self.results.get(*id).is_some_and(&pred))
            .collect()
    }

    fn execution_order_refs(&self) -> impl Iterator<Item = &str> {
        self.batches.iter().flatten().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> ExecutionReport {
        let mut results = BTreeMap::new();
        let mut outputs = PortValues::new();
        outputs.insert("data".to_string(), json!([1, 2]));
        results.insert(
            "a".to_string(),
            NodeResult::completed("dataset".into(), PortValues::new(), outputs, 3),
        );
        results.insert(
            "b".to_string(),
            NodeResult::failed("handle_missing".into(), PortValues::new(), "bad column".into(), Some(1)),
        );
        results.insert(
            "c".to_string(),
            NodeResult::blocked(
                "histogram".into(),
                BlockedReason::UpstreamFailed { root: "b".into() },
            ),
        );
        ExecutionReport {
            execution_id: "exec-1".to_string(),
            workflow_name: "wf".to_string(),
            batches: vec![vec!["a".into()], vec!["b".into()], vec!["c".into()]],
            results,
            cancelled: false,
        }
    }

    #[test]
    fn test_report_partitions() {
        let report = sample();
        assert!(!report.is_success());
        assert_eq!(report.failed_nodes(), vec!["b"]);
        assert_eq!(report.blocked_nodes(), vec!["c"]);
        assert!(report.cancelled_nodes().is_empty());
        assert_eq!(report.execution_order(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_report_serialization() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["executionId"], "exec-1");
        assert_eq!(value["results"]["a"]["success"], true);
        assert_eq!(value["results"]["b"]["error"], "bad column");
        assert_eq!(
            value["results"]["c"]["blockedReason"],
            json!({"reason": "upstreamFailed", "root": "b"})
        );
        assert!(value["results"]["a"].get("error").is_none());
    }
}
