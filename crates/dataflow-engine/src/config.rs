//! Engine configuration
//!
//! Loaded from a JSON file; every field is optional and falls back to its
//! default, so an empty object is a valid configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{FlowError, Result};
use crate::executor::ExecutorConfig;
use crate::undo::DEFAULT_HISTORY_LIMIT;
use crate::validation::ValidationOptions;

/// Full engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Worker pool and timeout settings
    #[serde(default)]
    pub executor: ExecutorConfig,
    /// Optional validation checks
    #[serde(default)]
    pub validation: ValidationOptions,
    /// Number of edit-history snapshots kept per workflow
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            executor: ExecutorConfig::default(),
            validation: ValidationOptions::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file
    ///
    /// A missing file yields the default configuration.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("No configuration at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| FlowError::Config(format!("Failed to parse {:?}: {}", path, e)))?;
        config.check()?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to a JSON file, creating parent directories
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?).await?;
        log::info!("Configuration saved to {:?}", path);
        Ok(())
    }

    fn check(&self) -> Result<()> {
        if self.executor.max_concurrency == 0 {
            return Err(FlowError::Config(
                "executor.maxConcurrency must be at least 1".to_string(),
            ));
        }
        if self.executor.node_timeout_ms == Some(0) {
            return Err(FlowError::Config(
                "executor.nodeTimeoutMs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
