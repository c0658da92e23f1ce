use thiserror::Error;

use crate::client::ClientError;
use crate::cluster::ClusterInfoError;
use crate::config::SpecError;
use crate::runtime::HostError;

/// Errors raised while orchestrating an environment.
///
/// Timeouts are not errors: launch and destroy report them through their
/// outcomes.
#[derive(Error, Debug)]
pub enum EnvironmentError {
    #[error("Invalid environment: {0}")]
    Spec(#[from] SpecError),

    #[error("Could not read cluster state: {0}")]
    ClusterInfo(#[from] ClusterInfoError),

    #[error("Inventory error: {0}")]
    Inventory(#[source] ClientError),

    #[error("Found a running component named \"{0}\". Is an environment already running?")]
    Conflict(String),

    #[error("Environment is partially running ({}); destroy it before launching", .0.join(", "))]
    PartiallyRunning(Vec<String>),

    #[error("Image staging failed: {0}")]
    Staging(String),

    #[error("Could not create tunnel: {0}")]
    Tunnel(String),

    #[error("Scaling failed: {0}")]
    Scale(String),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] ClientError),

    #[error("Cluster host error: {0}")]
    Host(#[from] HostError),
}
