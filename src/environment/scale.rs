//! Keeping a machine class's component in step with its node count
//!
//! A scalable class runs a single count-auto component with a fixed number
//! of instances per node. When nodes join or leave, that per-node rate is
//! recovered from the previous node count and applied to the change.

use std::time::Duration;

use serde_json::json;
use tracing::{debug, info};

use super::{Environment, EnvironmentError, OperationStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScaleOutcome {
    /// The node delta was zero
    NothingToChange,
    /// The class has no nodes left
    NoNodes,
    /// No running component is pinned to the class
    NoComponent { machine: String },
    Scaled { app_id: String, instance_delta: i64 },
}

impl ScaleOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, ScaleOutcome::NoComponent { .. })
    }

    pub fn into_status(self) -> OperationStatus {
        match self {
            ScaleOutcome::NothingToChange => OperationStatus::success("Nothing to change"),
            ScaleOutcome::NoNodes => OperationStatus::success("No nodes running, apps removed"),
            ScaleOutcome::NoComponent { machine } => {
                OperationStatus::failure(format!("No app running on {}", machine))
            }
            ScaleOutcome::Scaled {
                app_id,
                instance_delta,
            } => OperationStatus::success("Success").with_details(json!({
                "app_id": app_id,
                "instance_delta": instance_delta,
            })),
        }
    }
}

/// Instances to add (or remove, when negative) for `node_delta` nodes, given
/// `instances` running across `original_nodes`
pub fn instance_delta(instances: u32, original_nodes: i64, node_delta: i64) -> i64 {
    let per_node = (instances as f64 / original_nodes as f64).floor() as i64;
    per_node * node_delta
}

impl Environment {
    /// Scale the component on `machine` after `node_delta` nodes were added
    /// (positive) or removed (negative).
    ///
    /// `wait` delays the inventory read so the change has propagated.
    pub async fn scale(
        &self,
        machine: &str,
        node_delta: i64,
        wait: Duration,
    ) -> Result<ScaleOutcome, EnvironmentError> {
        if node_delta == 0 {
            return Ok(ScaleOutcome::NothingToChange);
        }

        let cluster = self.cluster_info(wait).await?;
        let Some(class) = cluster.get(machine) else {
            return Ok(ScaleOutcome::NoNodes);
        };
        debug!("Number of nodes according to inventory: {}", class.node_count);
        let original_nodes = class.node_count as i64 - node_delta;

        let mut by_machine = self.running_components_by_machine().await?;
        let mut components = by_machine.remove(machine).unwrap_or_default();
        if components.is_empty() {
            return Ok(ScaleOutcome::NoComponent {
                machine: machine.to_string(),
            });
        }
        if components.len() > 1 {
            return Err(EnvironmentError::Scale(
                "Scaling not possible because multiple components are running".to_string(),
            ));
        }
        if original_nodes <= 0 {
            return Err(EnvironmentError::Scale(format!(
                "Cannot derive instances per node: {} had {} nodes before the change",
                machine, original_nodes
            )));
        }

        let component = components.remove(0);
        let delta = instance_delta(component.instance_count, original_nodes, node_delta);
        debug!(
            "Instances per node: {}",
            component.instance_count as i64 / original_nodes
        );

        self.scheduler
            .scale_app(&component.app_id, delta, true)
            .await?;

        let action = if node_delta < 0 { "Removed" } else { "Added" };
        info!(
            "{} {} running instances of component \"{}\"",
            action,
            delta.abs(),
            component.app_id.trim_matches('/')
        );

        Ok(ScaleOutcome::Scaled {
            app_id: component.app_id,
            instance_delta: delta,
        })
    }
}
