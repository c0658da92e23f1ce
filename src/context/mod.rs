use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::DEFAULT_REQUEST_TIMEOUT;
use crate::cluster::{INVENTORY_PORT, SCHEDULER_PORT};
use crate::environment::OrchestratorConfig;
use crate::runtime::SshTarget;

/// Built-in context for a cluster reachable on this machine
pub const LOCAL_CONTEXT: &str = "local";

/// Default SSH user on cluster controllers
pub const DEFAULT_SSH_USER: &str = "ubuntu";

/// Default config file location: ~/.envctl/config
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".envctl")
        .join("config")
}

/// Errors that can occur during context operations
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Context '{0}' not found")]
    ContextNotFound(String),

    #[error("No current context set")]
    NoCurrentContext,

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Failed to write config: {0}")]
    WriteError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A cluster the CLI can operate on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    /// Display name for this context
    pub name: String,

    /// Controller address (hostname or IP), reached over SSH
    pub controller: String,

    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,

    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,

    /// Private key for the controller; `~` is expanded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<String>,

    /// Inventory endpoint, defaults to `http://<controller>:5050`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventory_url: Option<String>,

    /// Scheduler endpoint, defaults to `http://<controller>:8080`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduler_url: Option<String>,

    /// Central logging node passed to every container
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging_host: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_volume: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Timeouts::is_empty")]
    pub timeouts: Timeouts,
}

/// Overrides for orchestration timing, all in seconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeouts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_poll: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destroy: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destroy_poll: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventory_wait: Option<u64>,
    /// Unused cpus per node tolerated before an underuse notice
    #[serde(skip_serializing_if = "Option::is_none")]
    pub underuse_threshold: Option<f64>,
}

/// The complete configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Currently active context name
    #[serde(rename = "current-context")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_context: Option<String>,

    /// Map of context name to context definition
    #[serde(default)]
    pub contexts: HashMap<String, Context>,

    /// Local cluster configuration
    #[serde(default)]
    pub local: LocalConfig,
}

/// Ports of a cluster running on this machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    #[serde(default = "default_inventory_port")]
    pub inventory_port: u16,
    #[serde(default = "default_scheduler_port")]
    pub scheduler_port: u16,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            inventory_port: INVENTORY_PORT,
            scheduler_port: SCHEDULER_PORT,
        }
    }
}

fn default_inventory_port() -> u16 {
    INVENTORY_PORT
}

fn default_scheduler_port() -> u16 {
    SCHEDULER_PORT
}

fn default_ssh_user() -> String {
    DEFAULT_SSH_USER.to_string()
}

fn default_ssh_port() -> u16 {
    22
}

// ============================================================================
// SBIO: Pure business logic (no I/O)
// ============================================================================

/// Parse config from YAML string
pub fn parse_config(content: &str) -> Result<Config, ContextError> {
    serde_yaml::from_str(content).map_err(|e| ContextError::ParseError(e.to_string()))
}

/// Serialize config to YAML string
pub fn serialize_config(config: &Config) -> Result<String, ContextError> {
    serde_yaml::to_string(config).map_err(|e| ContextError::WriteError(e.to_string()))
}

/// Add or update a context in the config
pub fn add_context(config: &mut Config, context: Context) {
    config.contexts.insert(context.name.clone(), context);
}

/// Remove a context from the config
pub fn remove_context(config: &mut Config, name: &str) -> Option<Context> {
    let removed = config.contexts.remove(name);
    // Clear current context if it was the removed one
    if config.current_context.as_deref() == Some(name) {
        config.current_context = None;
    }
    removed
}

/// Set the current context
pub fn set_current_context(config: &mut Config, name: &str) -> Result<(), ContextError> {
    if !config.contexts.contains_key(name) && name != LOCAL_CONTEXT {
        return Err(ContextError::ContextNotFound(name.to_string()));
    }
    config.current_context = Some(name.to_string());
    Ok(())
}

/// Get the current context name
pub fn get_current_context(config: &Config) -> Result<&str, ContextError> {
    config
        .current_context
        .as_deref()
        .ok_or(ContextError::NoCurrentContext)
}

/// List all context names, sorted
pub fn list_contexts(config: &Config) -> Vec<&str> {
    let mut names: Vec<&str> = config.contexts.keys().map(|s| s.as_str()).collect();
    names.sort_unstable();
    names
}

// ============================================================================
// I/O boundary functions
// ============================================================================

/// Load config from the default location
pub fn load_config() -> Result<Config, ContextError> {
    load_config_from(&default_config_path())
}

/// Load config from a specific path; a missing file is an empty config
pub fn load_config_from(path: &Path) -> Result<Config, ContextError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Save config to the default location
pub fn save_config(config: &Config) -> Result<(), ContextError> {
    save_config_to(config, &default_config_path())
}

/// Save config to a specific path
pub fn save_config_to(config: &Config, path: &Path) -> Result<(), ContextError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serialize_config(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

impl Config {
    /// Resolve the active context. With no current context set, or with
    /// `local` selected, the built-in local cluster is used.
    pub fn current(&self) -> Result<Context, ContextError> {
        let name = self.current_context.as_deref().unwrap_or(LOCAL_CONTEXT);
        self.resolve(name)
    }

    /// Resolve a context by name, including the built-in `local`
    pub fn resolve(&self, name: &str) -> Result<Context, ContextError> {
        match (self.contexts.get(name), name) {
            (Some(context), _) => Ok(context.clone()),
            (None, LOCAL_CONTEXT) => Ok(self.local_context()),
            (None, _) => Err(ContextError::ContextNotFound(name.to_string())),
        }
    }

    fn local_context(&self) -> Context {
        let mut context = Context::new(LOCAL_CONTEXT, "localhost");
        context.inventory_url = Some(format!("http://localhost:{}", self.local.inventory_port));
        context.scheduler_url = Some(format!("http://localhost:{}", self.local.scheduler_port));
        context
    }

    /// Check if currently using the local context
    pub fn is_local(&self) -> bool {
        self.current_context.as_deref().unwrap_or(LOCAL_CONTEXT) == LOCAL_CONTEXT
    }
}

impl Context {
    /// Create a new context
    pub fn new(name: impl Into<String>, controller: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            controller: controller.into(),
            ssh_user: default_ssh_user(),
            ssh_port: default_ssh_port(),
            ssh_key: None,
            inventory_url: None,
            scheduler_url: None,
            logging_host: None,
            shared_volume: None,
            description: None,
            timeouts: Timeouts::default(),
        }
    }

    pub fn with_ssh_key(mut self, key: impl Into<String>) -> Self {
        self.ssh_key = Some(key.into());
        self
    }

    /// Add a description
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn inventory_url(&self) -> String {
        self.inventory_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.controller, INVENTORY_PORT))
    }

    pub fn scheduler_url(&self) -> String {
        self.scheduler_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.controller, SCHEDULER_PORT))
    }

    pub fn ssh_target(&self) -> SshTarget {
        SshTarget {
            host: self.controller.clone(),
            user: self.ssh_user.clone(),
            port: self.ssh_port,
            key: self
                .ssh_key
                .as_deref()
                .map(|key| PathBuf::from(shellexpand::tilde(key).into_owned())),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        self.timeouts
            .request
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Orchestrator settings with this context's overrides applied
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let mut config = self.timeouts.apply(OrchestratorConfig::default());
        if let Some(volume) = &self.shared_volume {
            config.shared_volume = volume.clone();
        }
        config
    }
}

impl Timeouts {
    pub fn is_empty(&self) -> bool {
        self == &Timeouts::default()
    }

    pub fn apply(&self, mut config: OrchestratorConfig) -> OrchestratorConfig {
        if let Some(secs) = self.launch {
            config.launch_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.launch_poll {
            config.launch_poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.destroy {
            config.destroy_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.destroy_poll {
            config.destroy_poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.inventory_wait {
            config.inventory_wait = Duration::from_secs(secs);
        }
        if let Some(threshold) = self.underuse_threshold {
            config.underuse_threshold = threshold;
        }
        config
    }
}
