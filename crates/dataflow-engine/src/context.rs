//! Read-only dataset context shared by every node of a run

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Dataset id used when a data-source node names none
pub const DEFAULT_DATASET: &str = "default";

/// Datasets and run-level parameters available to widget operations.
///
/// Built up front with the consuming `with_*` methods, then wrapped in an
/// `Arc` and handed to the executor. There is no way to mutate it once a
/// run has started.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetContext {
    #[serde(default, alias = "dataSets")]
    datasets: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    parameters: serde_json::Map<String, serde_json::Value>,
}

impl DatasetContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dataset under an id
    pub fn with_dataset(mut self, id: impl Into<String>, data: serde_json::Value) -> Self {
        self.datasets.insert(id.into(), data);
        self
    }

    /// Add a run-level parameter
    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Look up a dataset by id
    pub fn dataset(&self, id: &str) -> Option<&serde_json::Value> {
        self.datasets.get(id)
    }

    /// Look up a dataset, falling back to [`DEFAULT_DATASET`] when `id` is `None`
    pub fn dataset_or_default(&self, id: Option<&str>) -> Option<&serde_json::Value> {
        self.dataset(id.unwrap_or(DEFAULT_DATASET))
    }

    /// Ids of all datasets
    pub fn dataset_ids(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(|k| k.as_str())
    }

    /// Look up a run-level parameter
    pub fn parameter(&self, key: &str) -> Option<&serde_json::Value> {
        self.parameters.get(key)
    }

    /// Whether no datasets are present
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}
