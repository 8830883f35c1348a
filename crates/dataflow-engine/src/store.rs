//! Workflow storage with file persistence.
//!
//! The store keeps workflow definitions in memory for fast access, with
//! optional JSON file persistence (`<id>.json` per workflow) for durability
//! across restarts. Only structure and node configuration are stored; a
//! loaded graph always starts with every node Idle.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::definition::WorkflowDefinition;
use crate::error::{FlowError, Result};
use crate::graph::WorkflowGraph;
use crate::registry::WidgetRegistry;
use crate::types::WorkflowId;

/// Summary of a stored workflow (for listing).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub id: WorkflowId,
    pub name: String,
    pub node_count: usize,
    pub connection_count: usize,
    pub updated_at: DateTime<Utc>,
}

/// In-memory workflow store with optional file persistence.
///
/// # Example
///
/// ```ignore
/// let mut store = WorkflowStore::with_persistence(".statflow/workflows");
/// store.load_from_disk()?;
///
/// let id = store.save("Sales overview", &graph)?;
/// let graph = store.load(&id, registry.clone())?;
/// ```
#[derive(Debug, Default)]
pub struct WorkflowStore {
    /// Stored definitions, keyed by ID.
    workflows: HashMap<WorkflowId, WorkflowDefinition>,
    /// Optional path for file persistence.
    persist_path: Option<PathBuf>,
}

impl WorkflowStore {
    /// Create a new in-memory store without persistence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that persists to the given directory.
    ///
    /// The directory is created on first save.
    pub fn with_persistence(path: impl AsRef<Path>) -> Self {
        Self {
            workflows: HashMap::new(),
            persist_path: Some(path.as_ref().to_path_buf()),
        }
    }

    /// Load all workflows from the persistence directory.
    ///
    /// Files that fail to parse are skipped with a warning. Returns the
    /// number of workflows loaded.
    pub fn load_from_disk(&mut self) -> Result<usize> {
        let Some(ref path) = self.persist_path else {
            return Ok(0);
        };

        if !path.exists() {
            return Ok(0);
        }

        let mut count = 0;
        for entry in std::fs::read_dir(path)? {
            let file_path = entry?.path();
            if file_path.extension().map_or(true, |e| e != "json") {
                continue;
            }

            let content = std::fs::read_to_string(&file_path)?;
            match serde_json::from_str::<WorkflowDefinition>(&content) {
                Ok(definition) => {
                    let Some(id) = definition.id.clone() else {
                        log::warn!("Skipping workflow without id in {:?}", file_path);
                        continue;
                    };
                    log::info!("Loaded workflow '{}' from {:?}", id, file_path);
                    self.workflows.insert(id, definition);
                    count += 1;
                }
                Err(e) => {
                    log::warn!("Failed to parse workflow from {:?}: {}", file_path, e);
                }
            }
        }
        Ok(count)
    }

    fn save_to_disk(&self, definition: &WorkflowDefinition, id: &str) -> Result<()> {
        let Some(ref path) = self.persist_path else {
            return Ok(());
        };

        std::fs::create_dir_all(path)?;
        let file_path = path.join(format!("{}.json", id));
        std::fs::write(&file_path, definition.to_json()?)?;
        log::debug!("Saved workflow '{}' to {:?}", id, file_path);
        Ok(())
    }

    fn delete_from_disk(&self, id: &str) -> Result<()> {
        let Some(ref path) = self.persist_path else {
            return Ok(());
        };

        let file_path = path.join(format!("{}.json", id));
        if file_path.exists() {
            std::fs::remove_file(&file_path)?;
            log::debug!("Deleted workflow '{}' from {:?}", id, file_path);
        }
        Ok(())
    }

    /// Save a graph under `name`.
    ///
    /// A graph that was loaded from (or bound to) this store keeps its id and
    /// creation time; anything else gets a fresh id.
    pub fn save(&mut self, name: &str, graph: &WorkflowGraph) -> Result<WorkflowId> {
        let mut definition = graph.to_definition();
        let id = match graph.workflow_id() {
            Some(id) => id.to_string(),
            None => uuid::Uuid::new_v4().to_string(),
        };

        if let Some(existing) = self.workflows.get(&id) {
            definition.metadata.created_at = existing.metadata.created_at;
        }
        definition.metadata.touch();
        definition.id = Some(id.clone());
        definition.name = name.to_string();

        self.save_to_disk(&definition, &id)?;
        self.workflows.insert(id.clone(), definition);
        log::info!("Saved workflow '{}' as {}", name, id);
        Ok(id)
    }

    /// Save a graph and bind it to the assigned id, so later saves update it.
    pub fn save_and_bind(&mut self, name: &str, graph: &mut WorkflowGraph) -> Result<WorkflowId> {
        let id = self.save(name, graph)?;
        graph.set_workflow_id(id.clone());
        Ok(id)
    }

    /// Rebuild a stored workflow as a fresh graph with every node Idle.
    pub fn load(&self, id: &str, registry: Arc<WidgetRegistry>) -> Result<WorkflowGraph> {
        let definition = self
            .workflows
            .get(id)
            .ok_or_else(|| FlowError::WorkflowNotFound(id.to_string()))?;
        let mut graph = WorkflowGraph::from_definition(definition, registry)?;
        graph.set_workflow_id(id.to_string());
        Ok(graph)
    }

    /// Get a stored definition by ID.
    pub fn definition(&self, id: &str) -> Option<&WorkflowDefinition> {
        self.workflows.get(id)
    }

    /// Remove a workflow by ID.
    ///
    /// Returns the removed definition if it existed.
    pub fn delete(&mut self, id: &str) -> Result<Option<WorkflowDefinition>> {
        self.delete_from_disk(id)?;
        Ok(self.workflows.remove(id))
    }

    /// List stored workflows, most recently updated first.
    pub fn list(&self) -> Vec<WorkflowSummary> {
        let mut summaries: Vec<WorkflowSummary> = self
            .workflows
            .iter()
            .map(|(id, def)| WorkflowSummary {
                id: id.clone(),
                name: def.name.clone(),
                node_count: def.nodes.len(),
                connection_count: def.connections.len(),
                updated_at: def.metadata.updated_at,
            })
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        summaries
    }

    /// Check if a workflow exists.
    pub fn contains(&self, id: &str) -> bool {
        self.workflows.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}
