// Configuration loaded from an optional YAML file

use clap::ValueEnum;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::models::Task;
use crate::record::Record;
use crate::storage::{FileStorage, MemoryStorage, SqliteStorage, Storage, validate_key};

/// Which storage backend holds the collection blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    File,
    Sqlite,
    Memory,
}

/// Optional multi-user sync settings; no network traffic is ever made
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub endpoint: String,
    #[serde(default)]
    pub room: Option<String>,
}

/// Result of the "enable sync" affordance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    NotConfigured,
    Configured { endpoint: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub backend: Backend,
    pub storage_key: String,
    pub sync: Option<SyncConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            backend: Backend::default(),
            storage_key: Task::storage_key().to_string(),
            sync: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("teamtasks")
}

/// Default location of the config file
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("teamtasks").join("config.yml"))
}

impl Config {
    /// Load from `path`; a missing file yields the defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = ?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config = Self::from_yaml(&content).with_context(|| format!("Invalid config file {}", path.display()))?;
        info!(path = ?path, backend = ?config.backend, "Loaded config");
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content).context("Failed to parse YAML")?;
        validate_key(&config.storage_key)?;
        Ok(config)
    }

    /// Open the configured storage backend
    pub fn open_storage(&self) -> Result<Box<dyn Storage>> {
        let storage: Box<dyn Storage> = match self.backend {
            Backend::File => Box::new(FileStorage::open(&self.data_dir).context("Failed to open file storage")?),
            Backend::Sqlite => Box::new(
                SqliteStorage::open(self.data_dir.join("teamtasks.db")).context("Failed to open SQLite storage")?,
            ),
            Backend::Memory => Box::new(MemoryStorage::new()),
        };
        Ok(storage)
    }

    /// Answer the "enable sync" toggle without contacting anything
    pub fn sync_status(&self) -> SyncStatus {
        match &self.sync {
            Some(sync) if !sync.endpoint.trim().is_empty() => SyncStatus::Configured {
                endpoint: sync.endpoint.clone(),
            },
            _ => SyncStatus::NotConfigured,
        }
    }
}
