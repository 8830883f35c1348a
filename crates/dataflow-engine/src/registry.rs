//! Widget registry for dynamic widget resolution
//!
//! The registry maps widget kind strings to their catalog definition and,
//! optionally, to the operation that executes them. It is built once at
//! startup and shared read-only (`Arc<WidgetRegistry>`) by every graph.
//!
//! # Usage
//!
//! ```ignore
//! use dataflow_engine::{WidgetRegistry, WidgetDescriptor};
//!
//! let mut registry = WidgetRegistry::with_builtins();
//! registry.register(MyWidget::descriptor(), Arc::new(MyWidget));
//! let registry = Arc::new(registry);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::context::DatasetContext;
use crate::descriptor;
use crate::error::{FlowError, Result, WidgetError};
use crate::types::{NodeId, PortValues, WidgetCategory, WidgetDefinition};

/// Everything a widget operation receives for one node
#[derive(Debug, Clone)]
pub struct WidgetInvocation {
    /// Node being executed
    pub node_id: NodeId,
    /// Kind of the node's widget
    pub widget_kind: String,
    /// Values for each bound input port
    pub inputs: PortValues,
    /// Node configuration
    pub params: serde_json::Value,
    /// Shared run-level datasets
    pub dataset: Arc<DatasetContext>,
    /// Run-level cancellation; long operations should poll it
    pub cancel: CancellationToken,
}

impl WidgetInvocation {
    /// Get a required input, or fail with `MissingInput`
    pub fn input(&self, port: &str) -> std::result::Result<&serde_json::Value, WidgetError> {
        self.inputs
            .get(port)
            .ok_or_else(|| WidgetError::MissingInput(port.to_string()))
    }

    /// Get an optional input
    pub fn optional_input(&self, port: &str) -> Option<&serde_json::Value> {
        self.inputs.get(port).filter(|v| !v.is_null())
    }

    /// Get a parameter from the node configuration
    pub fn param(&self, key: &str) -> Option<&serde_json::Value> {
        self.params.get(key).filter(|v| !v.is_null())
    }

    /// Input value, falling back to a parameter of the same name
    pub fn input_or_param(&self, port: &str) -> Option<&serde_json::Value> {
        self.optional_input(port).or_else(|| self.param(port))
    }

    /// Fail with `Cancelled` if the run has been cancelled
    pub fn check_cancelled(&self) -> std::result::Result<(), WidgetError> {
        if self.cancel.is_cancelled() {
            Err(WidgetError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Per-widget-kind operation
///
/// The core treats widget operations as opaque: it only routes inputs in and
/// outputs out. A returned error is recorded against the node and never
/// aborts the run.
#[async_trait]
pub trait WidgetExecutor: Send + Sync {
    /// Execute the widget for one node
    async fn execute(
        &self,
        invocation: WidgetInvocation,
    ) -> std::result::Result<PortValues, WidgetError>;
}

type BoxedWidgetFuture =
    Pin<Box<dyn std::future::Future<Output = std::result::Result<PortValues, WidgetError>> + Send>>;

/// Async callback-based WidgetExecutor
pub struct CallbackWidgetExecutor {
    callback: Box<dyn Fn(WidgetInvocation) -> BoxedWidgetFuture + Send + Sync>,
}

#[async_trait]
impl WidgetExecutor for CallbackWidgetExecutor {
    async fn execute(
        &self,
        invocation: WidgetInvocation,
    ) -> std::result::Result<PortValues, WidgetError> {
        (self.callback)(invocation).await
    }
}

/// Synchronous callback-based WidgetExecutor
///
/// Wraps a plain closure for widgets that do quick in-memory work.
pub struct SyncCallbackWidgetExecutor {
    callback: Box<
        dyn Fn(&WidgetInvocation) -> std::result::Result<PortValues, WidgetError> + Send + Sync,
    >,
}

impl SyncCallbackWidgetExecutor {
    pub fn new(
        callback: impl Fn(&WidgetInvocation) -> std::result::Result<PortValues, WidgetError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }
}

#[async_trait]
impl WidgetExecutor for SyncCallbackWidgetExecutor {
    async fn execute(
        &self,
        invocation: WidgetInvocation,
    ) -> std::result::Result<PortValues, WidgetError> {
        (self.callback)(&invocation)
    }
}

/// A registration entry combining a definition with an optional executor
struct RegistryEntry {
    definition: WidgetDefinition,
    executor: Option<Arc<dyn WidgetExecutor>>,
}

/// Registry of widget kinds with their definitions and executors
///
/// Registries can be composed by merging:
/// ```ignore
/// let mut registry = WidgetRegistry::with_builtins();
/// registry.merge(plugin_registry);
/// ```
pub struct WidgetRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl WidgetRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Create a registry from every widget submitted via `inventory`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for definition in descriptor::builtin_definitions() {
            registry.register_definition(definition);
        }
        for (kind, executor) in descriptor::builtin_executors() {
            match registry.entries.get_mut(kind) {
                Some(entry) => entry.executor = Some(executor),
                None => log::warn!("Executor submitted for undeclared widget kind '{}'", kind),
            }
        }
        log::debug!("Loaded {} built-in widgets", registry.entries.len());
        registry
    }

    /// Create a metadata-only registry from a JSON array of widget definitions
    pub fn from_catalog_json(json: &str) -> Result<Self> {
        let definitions: Vec<WidgetDefinition> = serde_json::from_str(json)?;
        let mut registry = Self::new();
        for definition in definitions {
            if registry.has_widget(&definition.kind) {
                return Err(FlowError::Config(format!(
                    "Widget kind '{}' declared twice in catalog",
                    definition.kind
                )));
            }
            registry.register_definition(definition);
        }
        Ok(registry)
    }

    /// Register a widget kind with its executor
    pub fn register(&mut self, definition: WidgetDefinition, executor: Arc<dyn WidgetExecutor>) {
        self.entries.insert(
            definition.kind.clone(),
            RegistryEntry {
                definition,
                executor: Some(executor),
            },
        );
    }

    /// Register a widget kind backed by an async closure
    pub fn register_callback<F, Fut>(&mut self, definition: WidgetDefinition, callback: F)
    where
        F: Fn(WidgetInvocation) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = std::result::Result<PortValues, WidgetError>>
            + Send
            + 'static,
    {
        let executor = Arc::new(CallbackWidgetExecutor {
            callback: Box::new(move |invocation| Box::pin(callback(invocation))),
        });
        self.register(definition, executor);
    }

    /// Register a widget kind backed by a synchronous closure
    pub fn register_fn(
        &mut self,
        definition: WidgetDefinition,
        callback: impl Fn(&WidgetInvocation) -> std::result::Result<PortValues, WidgetError>
            + Send
            + Sync
            + 'static,
    ) {
        self.register(definition, Arc::new(SyncCallbackWidgetExecutor::new(callback)));
    }

    /// Register a widget kind with its definition only (no executor)
    ///
    /// Nodes of such a kind can be placed and validated, but fail when run.
    pub fn register_definition(&mut self, definition: WidgetDefinition) {
        self.entries.insert(
            definition.kind.clone(),
            RegistryEntry {
                definition,
                executor: None,
            },
        );
    }

    /// Get the definition for a widget kind
    pub fn definition(&self, kind: &str) -> Option<&WidgetDefinition> {
        self.entries.get(kind).map(|e| &e.definition)
    }

    /// All definitions, ordered by category then kind
    pub fn list_widgets(&self) -> Vec<&WidgetDefinition> {
        let mut all: Vec<&WidgetDefinition> = self.entries.values().map(|e| &e.definition).collect();
        all.sort_by(|a, b| a.category.cmp(&b.category).then_with(|| a.kind.cmp(&b.kind)));
        all
    }

    /// Definitions grouped by category
    pub fn definitions_by_category(&self) -> BTreeMap<WidgetCategory, Vec<&WidgetDefinition>> {
        let mut grouped: BTreeMap<WidgetCategory, Vec<&WidgetDefinition>> = BTreeMap::new();
        for definition in self.list_widgets() {
            grouped.entry(definition.category).or_default().push(definition);
        }
        grouped
    }

    /// Get the executor for a widget kind
    pub fn executor(&self, kind: &str) -> Option<Arc<dyn WidgetExecutor>> {
        self.entries.get(kind).and_then(|e| e.executor.clone())
    }

    /// Check if a widget kind is registered
    pub fn has_widget(&self, kind: &str) -> bool {
        self.entries.contains_key(kind)
    }

    /// Number of registered widget kinds
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge another registry into this one
    ///
    /// Entries from `other` override entries in `self` with the same kind.
    pub fn merge(&mut self, other: WidgetRegistry) {
        self.entries.extend(other.entries);
    }
}

impl Default for WidgetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WidgetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.entries.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("WidgetRegistry").field("kinds", &kinds).finish()
    }
}
