//! Loader Configuration

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Budget for a single image load (fetch plus decode).
pub const DEFAULT_LOAD_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoaderConfig {
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,
    /// Permit `file://` URLs and bare filesystem paths.
    #[serde(default = "default_true")]
    pub allow_local_files: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_load_timeout_ms() -> u64 { DEFAULT_LOAD_TIMEOUT_MS }
fn default_true() -> bool { true }
fn default_user_agent() -> String {
    format!("shotcheck/{}", crate::ENGINE_VERSION)
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            load_timeout_ms: default_load_timeout_ms(),
            allow_local_files: true,
            user_agent: default_user_agent(),
        }
    }
}

impl LoaderConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn with_load_timeout_ms(mut self, ms: u64) -> Self {
        self.load_timeout_ms = ms;
        self
    }
}
