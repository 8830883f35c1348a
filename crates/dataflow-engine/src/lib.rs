//! Dataflow Engine - validated, batch-scheduled workflow execution
//!
//! This crate runs the analysis graphs of a statistics workbench: data
//! sources, preprocessing steps, analyses, visualizations and exporters wired
//! together by directed connections. It provides:
//!
//! - A widget registry describing each widget kind's ports
//! - A graph model that rejects structurally invalid edits
//! - Validation with cycle and required-input checks
//! - Kahn batch scheduling with parallel execution inside each batch
//! - Failure isolation: a failing node blocks only its downstream closure
//! - Cancellation, per-node timeouts and progress events
//! - Workflow storage, compressed undo/redo and report export
//!
//! # Architecture
//!
//! - `WidgetRegistry`: immutable catalog shared by every graph
//! - `WorkflowGraph`: nodes and connections, locked while a run is active
//! - `validate` / `plan`: produce an `ExecutionPlan` or the list of errors
//! - `WorkflowExecutor`: runs a plan against a `DatasetContext`
//! - `WorkflowService`: request/response facade for frontends
//!
//! # Example
//!
//! ```ignore
//! use dataflow_engine::{validate, DatasetContext, ExecutorConfig, WorkflowExecutor};
//!
//! let plan = validate(&graph).map_err(FlowError::from)?;
//! let report = WorkflowExecutor::new(ExecutorConfig::default())
//!     .execute(&plan, &graph, Arc::new(DatasetContext::new()), CancellationToken::new())
//!     .await?;
//! graph.apply_report(&report)?;
//! ```

pub mod builder;
pub mod config;
pub mod context;
pub mod definition;
pub mod descriptor;
pub mod error;
pub mod events;
pub mod executor;
pub mod export;
pub mod graph;
pub mod registry;
pub mod report;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod types;
pub mod undo;
pub mod validation;

// Re-export key types
pub use builder::WorkflowBuilder;
pub use config::EngineConfig;
pub use context::{DatasetContext, DEFAULT_DATASET};
pub use definition::{NodeDefinition, WorkflowDefinition, WorkflowMetadata};
pub use descriptor::{DescriptorFn, ExecutorFn, WidgetDescriptor};
pub use error::{
    ConsistencyError, FlowError, GraphError, PortDirection, Result, ValidationError, WidgetError,
};
pub use events::{ChannelEventSink, EventSink, NullEventSink, VecEventSink, WorkflowEvent};
pub use executor::{ExecutorConfig, WorkflowExecutor};
pub use export::{export_report, ReportFormat};
pub use graph::{ExecutionLease, WorkflowGraph};
pub use registry::{WidgetExecutor, WidgetInvocation, WidgetRegistry};
pub use report::{BlockedReason, ExecutionReport, NodeResult};
pub use scheduler::{plan, ExecutionPlan};
pub use service::{ExecuteRequest, ExecuteResponse, NodeOutcome, WorkflowService};
pub use store::{WorkflowStore, WorkflowSummary};
pub use types::{
    Connection, ConnectionId, Node, NodeId, NodeStatus, PortDefinition, PortName, PortValues,
    WidgetCategory, WidgetDefinition, WorkflowId,
};
pub use undo::UndoStack;
pub use validation::{validate, validate_with, ValidationOptions};

// Run cancellation handle used throughout the executor API
pub use tokio_util::sync::CancellationToken;
