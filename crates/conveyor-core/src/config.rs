//! Conveyor configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConveyorConfig {
    /// Active profile id — selects the graph/schema/instance files.
    #[serde(default = "default_profile")]
    pub active_profile: String,
    /// Active project id — selects the event file together with the profile.
    #[serde(default = "default_project")]
    pub active_project: String,
    /// Override for the data directory (empty = `~/.conveyor`).
    #[serde(default)]
    pub data_dir: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

fn default_profile() -> String {
    "default".into()
}
fn default_project() -> String {
    "default".into()
}

impl Default for ConveyorConfig {
    fn default() -> Self {
        Self {
            active_profile: default_profile(),
            active_project: default_project(),
            data_dir: String::new(),
            api: ApiConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl ConveyorConfig {
    /// Load config from the default path (~/.conveyor/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::ConveyorError::Config(format!("Failed to read config: {e}"))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            crate::error::ConveyorError::Config(format!("Failed to parse config: {e}"))
        })?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<Self> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| {
            crate::error::ConveyorError::Config(format!("Failed to serialize config: {e}"))
        })?;
        std::fs::write(&path, content)?;
        Ok(self.clone())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Conveyor home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".conveyor")
    }

    /// Resolve the data directory: the configured override, or the home dir.
    pub fn data_dir(&self) -> PathBuf {
        if self.data_dir.is_empty() {
            Self::home_dir()
        } else {
            PathBuf::from(&self.data_dir)
        }
    }
}

/// Remote assistant API configuration (OpenAI-compatible threads/runs surface).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1".into()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: String::new(),
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
}

fn bool_true() -> bool {
    true
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}
