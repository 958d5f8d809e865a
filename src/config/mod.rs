pub mod adapter;
pub mod builder;
pub mod node;
pub mod validator;

pub use adapter::{Adapted, ConfigAdapter};
pub use builder::{ConfigTree, GraphBuilder};
pub use node::{ConfigNode, NodePath, RawNode};

use crate::error::ValidationError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Canonical configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    /// Module nodes, kept as written. Their shape is checked per node by
    /// [`GraphBuilder`] so every malformed node is reported with its path.
    #[serde(default)]
    pub apps: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdminConfig {
    #[serde(default = "default_true")]
    pub enable: bool,
    #[serde(default = "default_admin_socket")]
    pub unix_socket: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LifecycleConfig {
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

// Default values
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_true() -> bool {
    true
}

pub fn default_admin_socket() -> PathBuf {
    PathBuf::from("/tmp/fe-host.sock")
}

fn default_drain_timeout_secs() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enable: default_true(),
            unix_socket: default_admin_socket(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            admin: AdminConfig::default(),
            lifecycle: LifecycleConfig::default(),
            apps: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl LifecycleConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl Config {
    /// Read `path`, convert it with the named adapter (or the one matching
    /// the file extension) and parse the canonical document.
    pub fn from_file(path: &Path, adapter: Option<&str>) -> Result<Self> {
        let adapted = adapter::load(path, adapter)?;
        let config = Self::from_value(adapted.value)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    pub fn from_value(value: Value) -> std::result::Result<Self, ValidationError> {
        serde_json::from_value(value).map_err(|e| ValidationError::document(e.to_string()))
    }

    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).context("Failed to serialize configuration")
    }

    pub fn apps(mut self, apps: Vec<RawNode>) -> Self {
        self.apps = apps.into_iter().map(Value::from).collect();
        self
    }

    /// Non-fatal observations about the document, in the same `[!]`/`[X]`
    /// style the `validate` command prints.
    pub fn warnings(&self) -> Vec<String> {
        validator::warnings(self)
    }
}
