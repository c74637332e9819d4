//! Daemon configuration file

use anyhow::{Context, Result};
use coedit_core::EngineConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub tcp_port: u16,
    pub ws_port: u16,
    /// Enable the TCP transport
    pub tcp: bool,
    /// Enable the WebSocket transport
    pub websocket: bool,
    pub password: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            tcp_port: 6380,
            ws_port: 6381,
            tcp: true,
            websocket: true,
            password: None,
        }
    }
}

/// Where document content lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Volatile, lost on exit
    Memory,
    /// One file per document under `root`, path taken from the document id
    #[default]
    File,
    /// Files under `root`, located through a SQLite file catalog
    Catalog,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub root: PathBuf,
    /// SQLite catalog database, required by the catalog backend
    pub catalog: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            root: PathBuf::from("documents"),
            catalog: None,
        }
    }
}

impl Config {
    /// Load and parse a TOML configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
