//! Making a component reachable from the operator's machine
//!
//! Two hops: the controller forwards `remote` to the node running the
//! component, then a local tunnel forwards `local` to that controller port.

use std::collections::HashMap;

use tracing::info;

use super::{Environment, EnvironmentError};
use crate::cluster::{ClusterInfo, ComponentResources};
use crate::config::{tunnel_specs, EnvironmentFile, TunnelSpec};

/// User-facing message for an established tunnel
pub fn compose_message(tunnel: &TunnelSpec) -> String {
    let local = tunnel.local_port.to_string();
    match tunnel.message.as_deref() {
        Some(template) if !template.is_empty() => template
            .replace("{url}", &format!("http://localhost:{}", local))
            .replace("{port}", &local),
        _ => format!("Tunnel created on port {}", local),
    }
}

/// Hostname of a node in the machine class `component` was allocated to
pub fn component_hostname(
    component: &str,
    cluster: &ClusterInfo,
    resources: &HashMap<String, ComponentResources>,
) -> Result<String, EnvironmentError> {
    let name = component.trim_matches('/');
    resources
        .get(name)
        .and_then(|r| cluster.get(&r.machine))
        .map(|class| class.hostname.clone())
        .ok_or_else(|| {
            EnvironmentError::Tunnel(format!(
                "No hostname for component \"{}\" could be found",
                name
            ))
        })
}

impl Environment {
    /// Open every tunnel the environment declares and return the
    /// newline-joined messages (empty when none are declared).
    pub async fn expose_tunnels(
        &self,
        env: &EnvironmentFile,
        cluster: &ClusterInfo,
        resources: &HashMap<String, ComponentResources>,
    ) -> Result<String, EnvironmentError> {
        let mut messages = Vec::new();

        for tunnel in tunnel_specs(env)? {
            let hostname = component_hostname(&tunnel.component, cluster, resources)?;

            // The controller listens on the component's own port
            self.host
                .tunnel_on_controller(tunnel.remote_port, &hostname, tunnel.remote_port)
                .await
                .map_err(|e| EnvironmentError::Tunnel(e.to_string()))?;
            self.host
                .tunnel_to_controller(tunnel.remote_port, tunnel.local_port)
                .await
                .map_err(|e| EnvironmentError::Tunnel(e.to_string()))?;

            info!(
                "Tunnel localhost:{} -> {}:{} ({})",
                tunnel.local_port, hostname, tunnel.remote_port, tunnel.component
            );
            messages.push(compose_message(&tunnel));
        }

        Ok(messages.join("\n"))
    }
}
