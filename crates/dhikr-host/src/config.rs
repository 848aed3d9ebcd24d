//! Host configuration

use std::path::{Path, PathBuf};

use dhikr_common::{DhikrError, Result};
use dhikr_sw::WorkerConfig;
use serde::{Deserialize, Serialize};

/// Host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Address the proxy listens on
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Directory holding cache namespaces
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Worker settings, read once at startup
    pub worker: WorkerConfig,
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dhikr-counter")
}

impl HostConfig {
    /// Parse a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DhikrError::config_with_source("invalid host config", e))?;
        config
            .worker
            .validate()
            .map_err(|e| DhikrError::config_with_source("invalid worker section", e))?;
        Ok(config)
    }

    /// Load from a file.
    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            DhikrError::config_with_source(format!("cannot read {}", path.display()), e)
        })?;
        Self::from_json(&json)
    }
}
