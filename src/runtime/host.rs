//! Side effects on the cluster's controller machine
//!
//! Image builds, file staging and tunnels all go through the controller, so
//! the orchestrator talks to them through [`ClusterHost`] and tests swap in
//! the mock below.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command '{command}' failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
}

// ============================================================================
// SBIO: Trait for abstraction (allows mocking in tests)
// ============================================================================

#[async_trait]
pub trait ClusterHost: Send + Sync {
    /// Whether the controller already has `image`
    async fn image_exists(&self, image: &str) -> Result<bool, HostError>;

    /// Build `image` from the Dockerfile in `context_dir`
    async fn build_image(&self, context_dir: &Path, image: &str) -> Result<(), HostError>;

    /// Copy a local file or directory into the shared volume
    async fn sync_put(&self, local_path: &Path, remote_path: &str) -> Result<(), HostError>;

    /// Address of the central logging node, if the cluster has one
    async fn central_logging_host(&self) -> Result<Option<String>, HostError>;

    /// Forward `controller_port` on the controller to `host:remote_port`
    async fn tunnel_on_controller(
        &self,
        controller_port: u16,
        host: &str,
        remote_port: u16,
    ) -> Result<(), HostError>;

    /// Forward `local_port` on this machine to `controller_port` on the controller
    async fn tunnel_to_controller(
        &self,
        controller_port: u16,
        local_port: u16,
    ) -> Result<(), HostError>;
}

// ============================================================================
// SBIO: Mock implementation for testing (no I/O)
// ============================================================================
