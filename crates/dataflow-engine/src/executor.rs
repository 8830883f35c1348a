//! Batch executor
//!
//! Runs an [`ExecutionPlan`] batch by batch. Nodes within a batch run as
//! independent tokio tasks, bounded by a semaphore of `max_concurrency`
//! permits; a batch starts only after every node of the previous batch has
//! reached a terminal state.
//!
//! Per node: `Idle -> Running -> Completed | Error`, or `Idle -> Blocked`
//! when an upstream node did not complete or the run was cancelled. A failing
//! node blocks its whole forward closure and nothing else.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::context::DatasetContext;
use crate::error::{FlowError, Result, WidgetError};
use crate::events::{EventSink, NullEventSink, WorkflowEvent};
use crate::graph::WorkflowGraph;
use crate::registry::{WidgetExecutor, WidgetInvocation};
use crate::report::{BlockedReason, ExecutionReport, NodeResult};
use crate::scheduler::ExecutionPlan;
use crate::types::{Node, NodeId, NodeStatus, PortValues};
use crate::validation::{validate_with, ValidationOptions};

/// Executor tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutorConfig {
    /// Maximum number of widget operations running at once
    pub max_concurrency: usize,
    /// Per-node time limit; `None` means unlimited
    pub node_timeout_ms: Option<u64>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            node_timeout_ms: None,
        }
    }
}

/// How a single node task ended
enum Outcome {
    Completed { outputs: PortValues, duration_ms: u64 },
    Failed { error: String, duration_ms: Option<u64> },
    Cancelled,
}

/// Executes validated plans against a graph
pub struct WorkflowExecutor {
    config: ExecutorConfig,
    events: Arc<dyn EventSink>,
}

impl WorkflowExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            events: Arc::new(NullEventSink),
        }
    }

    /// Send progress events to `sink`
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Validate `graph` and execute it
    ///
    /// Returns `FlowError::Validation` without running anything if the graph
    /// is invalid.
    pub async fn validate_and_execute(
        &self,
        graph: &WorkflowGraph,
        options: &ValidationOptions,
        dataset: Arc<DatasetContext>,
        cancel: CancellationToken,
    ) -> Result<ExecutionReport> {
        let plan = validate_with(graph, options)?;
        self.execute(&plan, graph, dataset, cancel).await
    }

    /// Execute a plan
    ///
    /// Fails only when the run cannot start: the graph is already being
    /// executed, or `plan` was computed for a different revision of `graph`.
    /// Widget failures are recorded in the report.
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        graph: &WorkflowGraph,
        dataset: Arc<DatasetContext>,
        cancel: CancellationToken,
    ) -> Result<ExecutionReport> {
        let _lease = graph.begin_execution()?;
        check_plan(plan, graph)?;

        let execution_id = uuid::Uuid::new_v4().to_string();
        log::info!(
            "Executing '{}' ({}): {} node(s) in {} batch(es)",
            graph.name(),
            execution_id,
            plan.node_count(),
            plan.len()
        );
        self.emit(WorkflowEvent::RunStarted {
            workflow_name: graph.name().to_string(),
            execution_id: execution_id.clone(),
            batches: plan.len(),
        });

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut results: BTreeMap<NodeId, NodeResult> = BTreeMap::new();

        for (index, batch) in plan.batches().iter().enumerate() {
            if cancel.is_cancelled() {
                log::info!("Run {} cancelled before batch {}", execution_id, index);
                break;
            }

            let runnable: Vec<&Node> = batch
                .iter()
                .filter(|id| !results.contains_key(*id))
                .filter_map(|id| graph.node(id))
                .collect();
            if runnable.is_empty() {
                continue;
            }
            self.emit(WorkflowEvent::BatchStarted {
                execution_id: execution_id.clone(),
                index,
                nodes: runnable.iter().map(|n| n.id.clone()).collect(),
            });

            let mut inputs_by_node: HashMap<NodeId, PortValues> = HashMap::new();
            let mut outcomes: HashMap<NodeId, Outcome> = HashMap::new();
            let mut tasks: JoinSet<(NodeId, Outcome)> = JoinSet::new();

            for node in runnable {
                let inputs = resolve_inputs(graph, node, &results);
                inputs_by_node.insert(node.id.clone(), inputs.clone());

                let Some(executor) = graph.registry().executor(&node.widget_kind) else {
                    outcomes.insert(
                        node.id.clone(),
                        Outcome::Failed {
                            error: format!(
                                "No executor registered for widget kind '{}'",
                                node.widget_kind
                            ),
                            duration_ms: None,
                        },
                    );
                    continue;
                };

                let invocation = WidgetInvocation {
                    node_id: node.id.clone(),
                    widget_kind: node.widget_kind.clone(),
                    inputs,
                    params: node.params.clone(),
                    dataset: dataset.clone(),
                    cancel: cancel.clone(),
                };
                let node_id = node.id.clone();
                let semaphore = semaphore.clone();
                let events = self.events.clone();
                let execution_id = execution_id.clone();
                let timeout_ms = self.config.node_timeout_ms;

                tasks.spawn(async move {
                    let outcome = run_node(
                        invocation,
                        executor,
                        semaphore,
                        events,
                        execution_id,
                        timeout_ms,
                    )
                    .await;
                    (node_id, outcome)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((node_id, outcome)) => {
                        outcomes.insert(node_id, outcome);
                    }
                    Err(err) => log::error!("Node task in batch {} aborted: {}", index, err),
                }
            }

            // settle in batch order so results and events are deterministic
            for node_id in batch {
                if results.contains_key(node_id) {
                    continue;
                }
                let Some(node) = graph.node(node_id) else {
                    continue;
                };
                let inputs = inputs_by_node.remove(node_id).unwrap_or_default();
                let outcome = outcomes.remove(node_id).unwrap_or(Outcome::Failed {
                    error: "Node task ended without a result".to_string(),
                    duration_ms: None,
                });
                self.settle(graph, node, inputs, outcome, &execution_id, &mut results);
            }
        }

        // anything left over never ran because of cancellation
        let mut cancelled = false;
        for node_id in plan.execution_order() {
            if results.contains_key(node_id) {
                continue;
            }
            cancelled = true;
            let kind = graph
                .node(node_id)
                .map(|n| n.widget_kind.clone())
                .unwrap_or_default();
            self.block(node_id, kind, BlockedReason::Cancelled, &execution_id, &mut results);
        }
        cancelled |= results
            .values()
            .any(|r| matches!(r.blocked_reason, Some(BlockedReason::Cancelled)));

        let report = ExecutionReport {
            execution_id: execution_id.clone(),
            workflow_name: graph.name().to_string(),
            batches: plan.batches().to_vec(),
            results,
            cancelled,
        };

        if cancelled {
            log::info!("Run {} cancelled", execution_id);
            self.emit(WorkflowEvent::RunCancelled { execution_id });
        } else {
            let count = |status: NodeStatus| report.results.values().filter(|r| r.status == status).count();
            let (completed, failed, blocked) = (
                count(NodeStatus::Completed),
                count(NodeStatus::Error),
                count(NodeStatus::Blocked),
            );
            log::info!(
                "Run {} finished: {} completed, {} failed, {} blocked",
                execution_id,
                completed,
                failed,
                blocked
            );
            self.emit(WorkflowEvent::RunCompleted {
                execution_id,
                completed,
                failed,
                blocked,
            });
        }

        Ok(report)
    }

    fn settle(
        &self,
        graph: &WorkflowGraph,
        node: &Node,
        inputs: PortValues,
        outcome: Outcome,
        execution_id: &str,
        results: &mut BTreeMap<NodeId, NodeResult>,
    ) {
        match outcome {
            Outcome::Completed {
                outputs,
                duration_ms,
            } => {
                log::debug!("Node '{}' completed in {} ms", node.id, duration_ms);
                self.emit(WorkflowEvent::NodeCompleted {
                    execution_id: execution_id.to_string(),
                    node_id: node.id.clone(),
                    duration_ms,
                });
                results.insert(
                    node.id.clone(),
                    NodeResult::completed(node.widget_kind.clone(), inputs, outputs, duration_ms),
                );
            }
            Outcome::Failed { error, duration_ms } => {
                log::warn!("Node '{}' ({}) failed: {}", node.id, node.widget_kind, error);
                self.emit(WorkflowEvent::NodeFailed {
                    execution_id: execution_id.to_string(),
                    node_id: node.id.clone(),
                    error: error.clone(),
                });
                results.insert(
                    node.id.clone(),
                    NodeResult::failed(node.widget_kind.clone(), inputs, error, duration_ms),
                );
                for downstream in graph.downstream_closure(&node.id) {
                    if results.contains_key(&downstream) {
                        continue;
                    }
                    let kind = graph
                        .node(&downstream)
                        .map(|n| n.widget_kind.clone())
                        .unwrap_or_default();
                    self.block(
                        &downstream,
                        kind,
                        BlockedReason::UpstreamFailed {
                            root: node.id.clone(),
                        },
                        execution_id,
                        results,
                    );
                }
            }
            Outcome::Cancelled => {
                log::debug!("Node '{}' interrupted by cancellation", node.id);
                self.block(
                    &node.id,
                    node.widget_kind.clone(),
                    BlockedReason::Cancelled,
                    execution_id,
                    results,
                );
            }
        }
    }

    fn block(
        &self,
        node_id: &str,
        widget_kind: String,
        reason: BlockedReason,
        execution_id: &str,
        results: &mut BTreeMap<NodeId, NodeResult>,
    ) {
        self.emit(WorkflowEvent::NodeBlocked {
            execution_id: execution_id.to_string(),
            node_id: node_id.to_string(),
            reason: reason.clone(),
        });
        results.insert(node_id.to_string(), NodeResult::blocked(widget_kind, reason));
    }

    fn emit(&self, event: WorkflowEvent) {
        emit(self.events.as_ref(), event);
    }
}

impl Default for WorkflowExecutor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

fn emit(events: &dyn EventSink, event: WorkflowEvent) {
    if let Err(err) = events.send(event) {
        log::warn!("Dropped workflow event: {}", err);
    }
}

fn check_plan(plan: &ExecutionPlan, graph: &WorkflowGraph) -> Result<()> {
    let same_nodes = plan.node_count() == graph.nodes().len()
        && graph.nodes().iter().all(|n| plan.batch_index(&n.id).is_some());
    if plan.revision() != graph.revision() || !same_nodes {
        return Err(FlowError::StalePlan {
            planned: plan.revision(),
            current: graph.revision(),
        });
    }
    Ok(())
}

/// Gather input values for a node
///
/// Bound ports take the upstream output; unbound ports fall back to a node
/// parameter of the same name, then to the port's default value.
fn resolve_inputs(
    graph: &WorkflowGraph,
    node: &Node,
    results: &BTreeMap<NodeId, NodeResult>,
) -> PortValues {
    let mut inputs = PortValues::new();
    for conn in graph.incoming(&node.id) {
        let value = results
            .get(&conn.from_node)
            .and_then(|r| r.outputs.as_ref())
            .and_then(|outputs| outputs.get(&conn.from_output));
        match value {
            Some(value) => {
                inputs.insert(conn.to_input.clone(), value.clone());
            }
            None => log::warn!(
                "Node '{}' produced no '{}' output for input '{}' of '{}'",
                conn.from_node,
                conn.from_output,
                conn.to_input,
                node.id
            ),
        }
    }

    let bound: Vec<&str> = graph.incoming(&node.id).map(|c| c.to_input.as_str()).collect();
    if let Some(widget) = graph.registry().definition(&node.widget_kind) {
        for port in &widget.inputs {
            if bound.contains(&port.name.as_str()) {
                continue;
            }
            if let Some(value) = node.param(&port.name).or(port.default_value.as_ref()) {
                inputs.insert(port.name.clone(), value.clone());
            }
        }
    }
    inputs
}

async fn run_node(
    invocation: WidgetInvocation,
    executor: Arc<dyn WidgetExecutor>,
    semaphore: Arc<Semaphore>,
    events: Arc<dyn EventSink>,
    execution_id: String,
    timeout_ms: Option<u64>,
) -> Outcome {
    let cancel = invocation.cancel.clone();

    let _permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Outcome::Cancelled,
        permit = semaphore.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => {
                return Outcome::Failed {
                    error: "Worker pool closed".to_string(),
                    duration_ms: None,
                }
            }
        },
    };

    let node_id = invocation.node_id.clone();
    emit(
        events.as_ref(),
        WorkflowEvent::NodeStarted {
            execution_id,
            node_id: node_id.clone(),
        },
    );
    let started = Instant::now();

    // own task so a panicking widget only takes down itself
    let handle = tokio::spawn(async move { executor.execute(invocation).await });
    let abort = handle.abort_handle();
    let waited = async move {
        match timeout_ms {
            Some(ms) => tokio::time::timeout(Duration::from_millis(ms), handle).await.ok(),
            None => Some(handle.await),
        }
    };

    let joined = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            abort.abort();
            return Outcome::Cancelled;
        }
        joined = waited => joined,
    };
    let duration_ms = started.elapsed().as_millis() as u64;

    match joined {
        Some(Ok(Ok(outputs))) => Outcome::Completed {
            outputs,
            duration_ms,
        },
        Some(Ok(Err(WidgetError::Cancelled))) if cancel.is_cancelled() => Outcome::Cancelled,
        Some(Ok(Err(err))) => Outcome::Failed {
            error: err.to_string(),
            duration_ms: Some(duration_ms),
        },
        Some(Err(err)) if err.is_panic() => {
            let payload = err.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!("Widget for node '{}' panicked: {}", node_id, message);
            Outcome::Failed {
                error: format!("Widget panicked: {}", message),
                duration_ms: Some(duration_ms),
            }
        }
        Some(Err(err)) => Outcome::Failed {
            error: err.to_string(),
            duration_ms: Some(duration_ms),
        },
        None => {
            abort.abort();
            let ms = timeout_ms.unwrap_or_default();
            Outcome::Failed {
                error: WidgetError::Timeout(ms).to_string(),
                duration_ms: Some(duration_ms),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;
    use crate::events::VecEventSink;
    use crate::registry::WidgetRegistry;
    use crate::scheduler;
    use crate::types::{PortDefinition, WidgetCategory, WidgetDefinition};
    use crate::validation::validate;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn def(kind: &str, inputs: &[(&str, bool)], outputs: &[&str]) -> WidgetDefinition {
        WidgetDefinition {
            kind: kind.to_string(),
            label: kind.to_string(),
            description: String::new(),
            category: WidgetCategory::Analysis,
            inputs: inputs
                .iter()
                .map(|(name, required)| {
                    if *required {
                        PortDefinition::required(*name, *name)
                    } else {
                        PortDefinition::optional(*name, *name)
                    }
                })
                .collect(),
            outputs: outputs.iter().map(|o| PortDefinition::optional(*o, *o)).collect(),
        }
    }

    fn single(port: &str, value: serde_json::Value) -> PortValues {
        let mut values = PortValues::new();
        values.insert(port.to_string(), value);
        values
    }

    fn number(inv: &WidgetInvocation, port: &str) -> std::result::Result<i64, WidgetError> {
        inv.input(port)?
            .as_i64()
            .ok_or_else(|| WidgetError::invalid(port, "integer"))
    }

    /// Widgets used across executor tests
    fn registry() -> WidgetRegistry {
        let mut registry = WidgetRegistry::new();
        registry.register_fn(def("const", &[], &["out"]), |inv| {
            Ok(single("out", inv.param("value").cloned().unwrap_or(json!(0))))
        });
        registry.register_fn(def("add_one", &[("in", true)], &["out"]), |inv| {
            Ok(single("out", json!(number(inv, "in")? + 1)))
        });
        registry.register_fn(def("sum", &[("left", true), ("right", true)], &["out"]), |inv| {
            Ok(single("out", json!(number(inv, "left")? + number(inv, "right")?)))
        });
        registry.register_fn(def("fail", &[("in", false)], &["out"]), |_| {
            Err(WidgetError::failed("boom"))
        });
        registry.register_fn(def("explode", &[("in", false)], &["out"]), |_| {
            panic!("widget exploded")
        });
        registry.register_callback(def("sleep", &[("in", false)], &["out"]), |inv| async move {
            let ms = inv.param("ms").and_then(|v| v.as_u64()).unwrap_or(100);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(single("out", json!(inv.node_id)))
        });
        registry.register_definition(def("no_exec", &[("in", false)], &["out"]));
        let mut scaled = def("scaled", &[("in", true), ("factor", false)], &["out"]);
        scaled.inputs[1].default_value = Some(json!(2));
        registry.register_fn(scaled, |inv| {
            Ok(single("out", json!(number(inv, "in")? * number(inv, "factor")?)))
        });
        registry
    }

    fn graph_with(registry: WidgetRegistry) -> WorkflowGraph {
        WorkflowGraph::new("test", Arc::new(registry))
    }

    fn position_of(events: &[WorkflowEvent], pred: impl Fn(&WorkflowEvent) -> bool) -> usize {
        events
            .iter()
            .position(pred)
            .expect("event should have been emitted")
    }

    async fn run(graph: &WorkflowGraph) -> ExecutionReport {
        let plan = validate(graph).unwrap();
        WorkflowExecutor::default()
            .execute(&plan, graph, Arc::new(DatasetContext::new()), CancellationToken::new())
            .await
            .unwrap()
    }

    fn output(report: &ExecutionReport, node: &str) -> serde_json::Value {
        report.result(node).unwrap().outputs.as_ref().unwrap()["out"].clone()
    }

    #[tokio::test]
    async fn test_values_flow_along_connections() {
        let mut graph = graph_with(registry());
        graph.add_node_with_id("a", "const").unwrap();
        graph.set_node_params("a", json!({"value": 1})).unwrap();
        graph.add_node_with_id("b", "add_one").unwrap();
        graph.add_node_with_id("c", "add_one").unwrap();
        graph.connect("a", "out", "b", "in").unwrap();
        graph.connect("b", "out", "c", "in").unwrap();

        let report = run(&graph).await;
        assert!(report.is_success());
        assert_eq!(output(&report, "c"), json!(3));
        assert_eq!(report.result("c").unwrap().inputs["in"], json!(2));
        assert_eq!(report.execution_order(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failure_isolation() {
        // a -> b(fail) -> c, d independent
        let mut graph = graph_with(registry());
        graph.add_node_with_id("a", "const").unwrap();
        graph.add_node_with_id("b", "fail").unwrap();
        graph.add_node_with_id("c", "add_one").unwrap();
        graph.add_node_with_id("d", "const").unwrap();
        graph.connect("a", "out", "b", "in").unwrap();
        graph.connect("b", "out", "c", "in").unwrap();

        let report = run(&graph).await;
        assert_eq!(report.status("a"), Some(NodeStatus::Completed));
        assert_eq!(report.status("b"), Some(NodeStatus::Error));
        assert_eq!(report.result("b").unwrap().error.as_deref(), Some("boom"));
        assert_eq!(report.status("c"), Some(NodeStatus::Blocked));
        assert_eq!(
            report.result("c").unwrap().blocked_reason,
            Some(BlockedReason::UpstreamFailed {
                root: "b".to_string()
            })
        );
        assert_eq!(report.status("d"), Some(NodeStatus::Completed));
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn test_blocked_despite_successful_other_upstream() {
        let mut graph = graph_with(registry());
        graph.add_node_with_id("ok", "const").unwrap();
        graph.add_node_with_id("bad", "fail").unwrap();
        graph.add_node_with_id("s", "sum").unwrap();
        graph.add_node_with_id("after", "add_one").unwrap();
        graph.connect("ok", "out", "s", "left").unwrap();
        graph.connect("bad", "out", "s", "right").unwrap();
        graph.connect("s", "out", "after", "in").unwrap();

        let report = run(&graph).await;
        assert_eq!(report.blocked_nodes(), vec!["s", "after"]);
        assert_eq!(report.failed_nodes(), vec!["bad"]);
        assert!(report.result("s").unwrap().outputs.is_none());
    }

    #[tokio::test]
    async fn test_missing_executor_and_panic_fail_only_their_node() {
        let mut graph = graph_with(registry());
        graph.add_node_with_id("meta", "no_exec").unwrap();
        graph.add_node_with_id("boom", "explode").unwrap();
        graph.add_node_with_id("fine", "const").unwrap();

        let report = run(&graph).await;
        let meta = report.result("meta").unwrap();
        assert_eq!(meta.status, NodeStatus::Error);
        assert!(meta.error.as_ref().unwrap().contains("No executor"));
        let boom = report.result("boom").unwrap();
        assert_eq!(boom.status, NodeStatus::Error);
        assert!(boom.error.as_ref().unwrap().contains("widget exploded"));
        assert_eq!(report.status("fine"), Some(NodeStatus::Completed));
    }

    #[tokio::test]
    async fn test_node_timeout() {
        let mut graph = graph_with(registry());
        graph.add_node_with_id("slow", "sleep").unwrap();
        graph.set_node_params("slow", json!({"ms": 5_000})).unwrap();
        graph.add_node_with_id("next", "add_one").unwrap();
        graph.connect("slow", "out", "next", "in").unwrap();

        let config = ExecutorConfig {
            max_concurrency: 2,
            node_timeout_ms: Some(50),
        };
        let plan = validate(&graph).unwrap();
        let report = WorkflowExecutor::new(config)
            .execute(&plan, &graph, Arc::new(DatasetContext::new()), CancellationToken::new())
            .await
            .unwrap();

        let slow = report.result("slow").unwrap();
        assert_eq!(slow.status, NodeStatus::Error);
        assert_eq!(slow.error.as_deref(), Some("Timed out after 50 ms"));
        assert_eq!(report.status("next"), Some(NodeStatus::Blocked));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_batch_runs_in_parallel() {
        let mut graph = graph_with(registry());
        for id in ["p1", "p2", "p3", "p4"] {
            graph.add_node_with_id(id, "sleep").unwrap();
        }

        let config = ExecutorConfig {
            max_concurrency: 4,
            node_timeout_ms: None,
        };
        let plan = validate(&graph).unwrap();
        let started = Instant::now();
        let report = WorkflowExecutor::new(config)
            .execute(&plan, &graph, Arc::new(DatasetContext::new()), CancellationToken::new())
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert!(report.is_success());
        assert!(elapsed < Duration::from_millis(300), "took {:?}", elapsed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_disjoint_chains_overlap() {
        // a -> b and c -> d; each node sleeps 150 ms
        let mut graph = graph_with(registry());
        for id in ["a", "b", "c", "d"] {
            graph.add_node_with_id(id, "sleep").unwrap();
            graph.set_node_params(id, json!({"ms": 150})).unwrap();
        }
        graph.connect("a", "out", "b", "in").unwrap();
        graph.connect("c", "out", "d", "in").unwrap();

        let plan = validate(&graph).unwrap();
        assert_eq!(plan.batches(), &[vec!["a", "c"], vec!["b", "d"]]);

        let config = ExecutorConfig {
            max_concurrency: 2,
            node_timeout_ms: None,
        };
        let started = Instant::now();
        let report = WorkflowExecutor::new(config)
            .execute(&plan, &graph, Arc::new(DatasetContext::new()), CancellationToken::new())
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert!(report.is_success());
        assert_eq!(report.result("b").unwrap().inputs["in"], json!("a"));
        assert_eq!(report.result("d").unwrap().inputs["in"], json!("c"));
        // one chain's length, not the sum of all four sleeps
        assert!(elapsed >= Duration::from_millis(300), "took {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(500), "took {:?}", elapsed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_max_concurrency_is_respected() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut registry = WidgetRegistry::new();
        {
            let running = running.clone();
            let peak = peak.clone();
            registry.register_callback(def("tracked", &[], &["out"]), move |_| {
                let running = running.clone();
                let peak = peak.clone();
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(PortValues::new())
                }
            });
        }
        let mut graph = graph_with(registry);
        for i in 0..6 {
            graph.add_node_with_id(format!("t{}", i), "tracked").unwrap();
        }

        let config = ExecutorConfig {
            max_concurrency: 2,
            node_timeout_ms: None,
        };
        let plan = validate(&graph).unwrap();
        let report = WorkflowExecutor::new(config)
            .execute(&plan, &graph, Arc::new(DatasetContext::new()), CancellationToken::new())
            .await
            .unwrap();

        assert!(report.is_success());
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_cancellation_blocks_remaining_nodes() {
        let mut graph = graph_with(registry());
        graph.add_node_with_id("long", "sleep").unwrap();
        graph.set_node_params("long", json!({"ms": 10_000})).unwrap();
        graph.add_node_with_id("after", "add_one").unwrap();
        graph.connect("long", "out", "after", "in").unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let plan = validate(&graph).unwrap();
        let started = Instant::now();
        let report = WorkflowExecutor::default()
            .execute(&plan, &graph, Arc::new(DatasetContext::new()), cancel)
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(report.cancelled);
        assert_eq!(report.cancelled_nodes(), vec!["long", "after"]);
        assert!(report.failed_nodes().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let mut graph = graph_with(registry());
        graph.add_node_with_id("a", "const").unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let plan = validate(&graph).unwrap();
        let report = WorkflowExecutor::default()
            .execute(&plan, &graph, Arc::new(DatasetContext::new()), cancel)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.status("a"), Some(NodeStatus::Blocked));
    }

    #[tokio::test]
    async fn test_locked_graph_refuses_second_run() {
        let mut graph = graph_with(registry());
        graph.add_node_with_id("a", "const").unwrap();
        let plan = validate(&graph).unwrap();

        let _lease = graph.begin_execution().unwrap();
        let err = WorkflowExecutor::default()
            .execute(&plan, &graph, Arc::new(DatasetContext::new()), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FlowError::Graph(GraphError::GraphLockedForExecution(_))
        ));
    }

    #[tokio::test]
    async fn test_edits_rejected_while_snapshot_runs() {
        let mut graph = graph_with(registry());
        graph.add_node_with_id("long", "sleep").unwrap();
        graph.set_node_params("long", json!({"ms": 200})).unwrap();

        let snapshot = graph.snapshot();
        let plan = validate(&snapshot).unwrap();
        let run = tokio::spawn(async move {
            WorkflowExecutor::default()
                .execute(&plan, &snapshot, Arc::new(DatasetContext::new()), CancellationToken::new())
                .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(
            graph.add_node("const"),
            Err(GraphError::GraphLockedForExecution(_))
        ));

        let report = run.await.unwrap().unwrap();
        graph.apply_report(&report).unwrap();
        assert_eq!(graph.node("long").unwrap().status, NodeStatus::Completed);
        graph.add_node("const").unwrap();
    }

    #[tokio::test]
    async fn test_stale_plan_rejected() {
        let mut graph = graph_with(registry());
        graph.add_node_with_id("a", "const").unwrap();
        let plan = scheduler::plan(&graph).unwrap();
        graph.add_node_with_id("b", "const").unwrap();

        let err = WorkflowExecutor::default()
            .execute(&plan, &graph, Arc::new(DatasetContext::new()), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::StalePlan { .. }));
        assert!(!graph.is_locked());
    }

    #[tokio::test]
    async fn test_repeated_runs_are_identical() {
        let mut graph = graph_with(registry());
        graph.add_node_with_id("a", "const").unwrap();
        graph.set_node_params("a", json!({"value": 4})).unwrap();
        graph.add_node_with_id("b", "scaled").unwrap();
        graph.add_node_with_id("c", "fail").unwrap();
        graph.connect("a", "out", "b", "in").unwrap();
        graph.connect("b", "out", "c", "in").unwrap();

        let first = run(&graph).await;
        let second = run(&graph).await;
        let summary = |r: &ExecutionReport| {
            r.results
                .iter()
                .map(|(id, res)| (id.clone(), res.status, res.outputs.clone(), res.error.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(summary(&first), summary(&second));
        assert_ne!(first.execution_id, second.execution_id);
    }

    #[tokio::test]
    async fn test_defaults_and_params_fill_unbound_inputs() {
        let mut graph = graph_with(registry());
        graph.add_node_with_id("a", "const").unwrap();
        graph.set_node_params("a", json!({"value": 5})).unwrap();
        graph.add_node_with_id("dflt", "scaled").unwrap();
        graph.add_node_with_id("param", "scaled").unwrap();
        graph.set_node_params("param", json!({"factor": 3})).unwrap();
        graph.connect("a", "out", "dflt", "in").unwrap();
        graph.connect("a", "out", "param", "in").unwrap();

        let report = run(&graph).await;
        assert_eq!(output(&report, "dflt"), json!(10));
        assert_eq!(output(&report, "param"), json!(15));
    }

    #[tokio::test]
    async fn test_events_follow_node_lifecycle() {
        let mut graph = graph_with(registry());
        graph.add_node_with_id("a", "const").unwrap();
        graph.add_node_with_id("b", "fail").unwrap();
        graph.add_node_with_id("c", "add_one").unwrap();
        graph.connect("a", "out", "b", "in").unwrap();
        graph.connect("b", "out", "c", "in").unwrap();

        let sink = Arc::new(VecEventSink::new());
        let plan = validate(&graph).unwrap();
        WorkflowExecutor::default()
            .with_event_sink(sink.clone())
            .execute(&plan, &graph, Arc::new(DatasetContext::new()), CancellationToken::new())
            .await
            .unwrap();

        let events = sink.events();
        assert!(matches!(events.first(), Some(WorkflowEvent::RunStarted { .. })));
        assert!(matches!(
            events.last(),
            Some(WorkflowEvent::RunCompleted {
                completed: 1,
                failed: 1,
                blocked: 1,
                ..
            })
        ));
        let a_started = position_of(&events, |e| {
            matches!(e, WorkflowEvent::NodeStarted { node_id, .. } if node_id == "a")
        });
        let a_done = position_of(&events, |e| {
            matches!(e, WorkflowEvent::NodeCompleted { node_id, .. } if node_id == "a")
        });
        let c_blocked = position_of(&events, |e| {
            matches!(e, WorkflowEvent::NodeBlocked { node_id, .. } if node_id == "c")
        });
        assert!(a_started < a_done);
        assert!(a_done < c_blocked);
        assert!(!events
            .iter()
            .any(|e| matches!(e, WorkflowEvent::NodeStarted { node_id, .. } if node_id == "c")));
    }

    #[tokio::test]
    async fn test_validate_and_execute_rejects_invalid_graph() {
        let mut graph = graph_with(registry());
        graph.add_node_with_id("lonely", "add_one").unwrap();

        let err = WorkflowExecutor::default()
            .validate_and_execute(
                &graph,
                &ValidationOptions::default(),
                Arc::new(DatasetContext::new()),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Validation(ref errors) if errors.len() == 1));
        assert_eq!(graph.node("lonely").unwrap().status, NodeStatus::Idle);
    }
}
