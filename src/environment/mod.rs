//! # Environment orchestration
//!
//! [`Environment`] turns an environment file into running scheduler apps and
//! back again. It holds nothing but collaborator handles and configuration:
//! every operation re-reads the inventory and the scheduler.
//!
//! ```text
//!                 ┌──────────────┐
//!   launch ──────►│              │──► InventorySource (nodes)
//!   destroy ─────►│ Environment  │──► Scheduler (apps)
//!   scale ───────►│              │──► ClusterHost (images, files, tunnels)
//!   status ──────►│              │
//!                 └──────────────┘
//! ```
//!
//! Each operation lives in its own submodule as an `impl Environment` block.

pub mod destroy;
pub mod error;
pub mod launch;
pub mod scale;
pub mod status;
pub mod tunnel;

pub use destroy::DestroyOutcome;
pub use error::EnvironmentError;
pub use launch::{build_descriptor, LaunchOutcome};
pub use scale::ScaleOutcome;
pub use status::{group_by_machine, RunningComponent};
pub use tunnel::{component_hostname, compose_message};

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::debug;

use crate::client::{InventorySource, Scheduler};
use crate::cluster::{build_cluster_info, ClusterInfo, DEFAULT_UNDERUSE_THRESHOLD, SHARED_VOLUME_PATH};
use crate::runtime::ClusterHost;

/// Timing and placement knobs for orchestration
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Pause between convergence checks after submitting apps
    pub launch_poll_interval: Duration,
    /// Give up waiting for apps to start after this long
    pub launch_timeout: Duration,
    pub destroy_poll_interval: Duration,
    pub destroy_timeout: Duration,
    /// Unused cpus per node tolerated before logging a notice
    pub underuse_threshold: f64,
    /// Mounted read-write into every container at the same path
    pub shared_volume: String,
    /// Delay before reading the inventory during launch
    pub inventory_wait: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            launch_poll_interval: Duration::from_secs(3),
            launch_timeout: Duration::from_secs(600),
            destroy_poll_interval: Duration::from_secs(2),
            destroy_timeout: Duration::from_secs(600),
            underuse_threshold: DEFAULT_UNDERUSE_THRESHOLD,
            shared_volume: SHARED_VOLUME_PATH.to_string(),
            inventory_wait: Duration::ZERO,
        }
    }
}

/// Status of an operation, as reported by the outcome types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationStatus {
    /// Success or failure
    pub success: bool,

    /// Status message
    pub message: String,

    /// Details (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl OperationStatus {
    /// Create success status
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            details: None,
        }
    }

    /// Create failure status
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            details: None,
        }
    }

    /// Add details
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Orchestrator over one cluster
#[derive(Clone)]
pub struct Environment {
    inventory: Arc<dyn InventorySource>,
    scheduler: Arc<dyn Scheduler>,
    host: Arc<dyn ClusterHost>,
    config: OrchestratorConfig,
}

impl Environment {
    pub fn new(
        inventory: Arc<dyn InventorySource>,
        scheduler: Arc<dyn Scheduler>,
        host: Arc<dyn ClusterHost>,
    ) -> Self {
        Self {
            inventory,
            scheduler,
            host,
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Read machine classes from the inventory, optionally after a pause
    /// so recently joined or removed nodes are reflected.
    pub async fn cluster_info(&self, wait: Duration) -> Result<ClusterInfo, EnvironmentError> {
        if !wait.is_zero() {
            debug!("Waiting {:?} before reading the inventory", wait);
            sleep(wait).await;
        }

        let state = self
            .inventory
            .state()
            .await
            .map_err(EnvironmentError::Inventory)?;
        Ok(build_cluster_info(&state)?)
    }
}
