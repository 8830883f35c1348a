//! Request/response facade over the engine
//!
//! Accepts a self-contained execute request (graph plus dataset context),
//! runs it, and answers with a compact per-node result map. This is the
//! surface a frontend or an HTTP adapter talks to.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::context::DatasetContext;
use crate::definition::{NodeDefinition, WorkflowDefinition, WorkflowMetadata};
use crate::error::Result;
use crate::events::EventSink;
use crate::executor::WorkflowExecutor;
use crate::graph::WorkflowGraph;
use crate::registry::WidgetRegistry;
use crate::report::ExecutionReport;
use crate::scheduler::ExecutionPlan;
use crate::types::{Connection, NodeId, PortValues, WidgetDefinition};
use crate::validation::{validate_with, ValidationOptions};

const UNNAMED_WORKFLOW: &str = "untitled";

/// A workflow to run, with the data it runs against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub dataset_context: DatasetContext,
}

impl ExecuteRequest {
    /// Wrap a stored definition in a request
    pub fn from_definition(definition: WorkflowDefinition, dataset_context: DatasetContext) -> Self {
        Self {
            name: Some(definition.name),
            nodes: definition.nodes,
            connections: definition.connections,
            dataset_context,
        }
    }

    fn definition(&self) -> WorkflowDefinition {
        WorkflowDefinition {
            id: None,
            name: self
                .name
                .clone()
                .unwrap_or_else(|| UNNAMED_WORKFLOW.to_string()),
            nodes: self.nodes.clone(),
            connections: self.connections.clone(),
            metadata: WorkflowMetadata::now(),
        }
    }
}

/// Result of one node, as returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<PortValues>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Answer to an [`ExecuteRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub execution_id: String,
    pub results: BTreeMap<NodeId, NodeOutcome>,
    pub execution_order: Vec<NodeId>,
}

impl From<&ExecutionReport> for ExecuteResponse {
    fn from(report: &ExecutionReport) -> Self {
        Self {
            execution_id: report.execution_id.clone(),
            results: report
                .results
                .iter()
                .map(|(id, result)| {
                    (
                        id.clone(),
                        NodeOutcome {
                            success: result.success,
                            outputs: result.outputs.clone(),
                            error: result.error.clone(),
                        },
                    )
                })
                .collect(),
            execution_order: report.execution_order(),
        }
    }
}

/// Runs execute requests against a fixed registry
pub struct WorkflowService {
    registry: Arc<WidgetRegistry>,
    executor: WorkflowExecutor,
    validation: ValidationOptions,
}

impl WorkflowService {
    pub fn new(registry: Arc<WidgetRegistry>, config: &EngineConfig) -> Self {
        Self {
            registry,
            executor: WorkflowExecutor::new(config.executor.clone()),
            validation: config.validation.clone(),
        }
    }

    /// Send run progress to `sink`
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.executor = self.executor.with_event_sink(sink);
        self
    }

    pub fn registry(&self) -> &Arc<WidgetRegistry> {
        &self.registry
    }

    /// Widget catalog, ordered by category then kind
    pub fn list_widgets(&self) -> Vec<WidgetDefinition> {
        self.registry.list_widgets().into_iter().cloned().collect()
    }

    /// Build and validate the request's graph without running it
    ///
    /// Structural problems come back as `FlowError::Graph`, validation
    /// problems as `FlowError::Validation` listing every error found.
    pub fn plan(&self, request: &ExecuteRequest) -> Result<(WorkflowGraph, ExecutionPlan)> {
        let graph = WorkflowGraph::from_definition(&request.definition(), self.registry.clone())?;
        let plan = validate_with(&graph, &self.validation)?;
        Ok((graph, plan))
    }

    /// Run a request and return the full report
    pub async fn execute_report(
        &self,
        request: ExecuteRequest,
        cancel: CancellationToken,
    ) -> Result<ExecutionReport> {
        let (graph, plan) = self.plan(&request)?;
        log::debug!(
            "Request '{}' planned into {} batch(es)",
            graph.name(),
            plan.len()
        );
        let dataset = Arc::new(request.dataset_context);
        self.executor.execute(&plan, &graph, dataset, cancel).await
    }

    /// Run a request and return the compact response
    pub async fn execute(
        &self,
        request: ExecuteRequest,
        cancel: CancellationToken,
    ) -> Result<ExecuteResponse> {
        let report = self.execute_report(request, cancel).await?;
        Ok(ExecuteResponse::from(&report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FlowError, ValidationError, WidgetError};
    use crate::events::VecEventSink;
    use crate::types::{PortDefinition, WidgetCategory};
    use serde_json::json;

    fn registry() -> Arc<WidgetRegistry> {
        let mut registry = WidgetRegistry::new();
        registry.register_fn(
            WidgetDefinition {
                kind: "load".into(),
                label: "Load".into(),
                description: String::new(),
                category: WidgetCategory::DataSource,
                inputs: vec![],
                outputs: vec![PortDefinition::optional("data", "Data")],
            },
            |inv| {
                let id = inv.param("dataSetId").and_then(|v| v.as_str());
                let data = inv
                    .dataset
                    .dataset_or_default(id)
                    .cloned()
                    .ok_or_else(|| WidgetError::failed("dataset not found"))?;
                Ok(PortValues::from([("data".to_string(), data)]))
            },
        );
        registry.register_fn(
            WidgetDefinition {
                kind: "count".into(),
                label: "Count".into(),
                description: String::new(),
                category: WidgetCategory::Analysis,
                inputs: vec![PortDefinition::required("data", "Data")],
                outputs: vec![PortDefinition::optional("count", "Count")],
            },
            |inv| {
                let rows = inv
                    .input("data")?
                    .as_array()
                    .ok_or_else(|| WidgetError::invalid("data", "array"))?;
                Ok(PortValues::from([("count".to_string(), json!(rows.len()))]))
            },
        );
        Arc::new(registry)
    }

    fn request(body: serde_json::Value) -> ExecuteRequest {
        serde_json::from_value(body).unwrap()
    }

    #[tokio::test]
    async fn test_execute_request() {
        let sink = Arc::new(VecEventSink::new());
        let service =
            WorkflowService::new(registry(), &EngineConfig::default()).with_event_sink(sink.clone());
        let response = service
            .execute(
                request(json!({
                    "name": "counting",
                    "nodes": [
                        {"id": "n1", "widgetKind": "load", "params": {"dataSetId": "iris"}},
                        {"id": "n2", "widgetKind": "count"}
                    ],
                    "connections": [
                        {"id": "c1", "fromNode": "n1", "fromOutput": "data", "toNode": "n2", "toInput": "data"}
                    ],
                    "datasetContext": {"datasets": {"iris": [{"a": 1}, {"a": 2}, {"a": 3}]}}
                })),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(response.execution_order, vec!["n1", "n2"]);
        assert!(response.results["n1"].success);
        assert_eq!(
            response.results["n2"].outputs.as_ref().unwrap()["count"],
            json!(3)
        );
        assert!(!sink.events().is_empty());

        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("executionId").is_some());
        assert!(value["results"]["n2"].get("error").is_none());
    }

    #[tokio::test]
    async fn test_validation_failure_runs_nothing() {
        let sink = Arc::new(VecEventSink::new());
        let service =
            WorkflowService::new(registry(), &EngineConfig::default()).with_event_sink(sink.clone());
        let err = service
            .execute(
                request(json!({"nodes": [{"id": "n2", "widgetKind": "count"}]})),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        match err {
            FlowError::Validation(errors) => assert_eq!(
                errors,
                vec![ValidationError::MissingRequiredInput {
                    node_id: "n2".into(),
                    port: "data".into()
                }]
            ),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_structural_error_in_request() {
        let service = WorkflowService::new(registry(), &EngineConfig::default());
        let err = service
            .execute(
                request(json!({"nodes": [{"id": "n1", "widgetKind": "mystery"}]})),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Graph(_)));
    }

    #[tokio::test]
    async fn test_failed_node_reported_in_response() {
        let service = WorkflowService::new(registry(), &EngineConfig::default());
        let response = service
            .execute(
                request(json!({
                    "nodes": [
                        {"id": "n1", "widgetKind": "load", "params": {"dataSetId": "absent"}},
                        {"id": "n2", "widgetKind": "count"}
                    ],
                    "connections": [
                        {"id": "c1", "fromNode": "n1", "fromOutput": "data", "toNode": "n2", "toInput": "data"}
                    ]
                })),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(!response.results["n1"].success);
        assert_eq!(response.results["n1"].error.as_deref(), Some("dataset not found"));
        assert!(!response.results["n2"].success);
        assert!(response.results["n2"].outputs.is_none());
    }

    #[test]
    fn test_list_widgets() {
        let service = WorkflowService::new(registry(), &EngineConfig::default());
        let kinds: Vec<String> = service.list_widgets().into_iter().map(|w| w.kind).collect();
        assert_eq!(kinds, vec!["load", "count"]);
    }
}
