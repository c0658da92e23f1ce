//! Structural validation of environment files
//!
//! Port strings, dependency lists, volume strings and tunnel declarations
//! are checked here so malformed files are rejected before anything is
//! sent to the cluster.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::environment::{EnvironmentFile, SpecError, TunnelEntry};

/// A container port published on the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: u16,
    pub protocol: String,
}

impl PortMapping {
    pub fn tcp(host_port: u16, container_port: u16) -> Self {
        Self {
            container_port,
            host_port,
            protocol: "tcp".to_string(),
        }
    }
}

/// A host directory mounted into the container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    pub container_path: String,
    pub host_path: String,
    /// `RW` or `RO`
    pub mode: String,
}

impl VolumeMount {
    pub fn read_write(host_path: impl Into<String>, container_path: impl Into<String>) -> Self {
        Self {
            container_path: container_path.into(),
            host_path: host_path.into(),
            mode: "RW".to_string(),
        }
    }
}

/// A validated tunnel declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelSpec {
    pub local_port: u16,
    pub component: String,
    pub remote_port: u16,
    pub message: Option<String>,
}

fn tunnel_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d+):([^:]+):(\d+)$").expect("tunnel service pattern is valid")
    })
}

impl TunnelSpec {
    /// Parse a `localport:component:remoteport` declaration
    pub fn parse(entry: &TunnelEntry) -> Result<Self, SpecError> {
        let invalid = || SpecError::InvalidTunnel(entry.service.clone());
        let caps = tunnel_pattern()
            .captures(entry.service.trim())
            .ok_or_else(invalid)?;

        let local_port = caps[1].parse::<u16>().map_err(|_| invalid())?;
        let remote_port = caps[3].parse::<u16>().map_err(|_| invalid())?;

        Ok(Self {
            local_port,
            component: caps[2].to_string(),
            remote_port,
            message: entry.message.clone().filter(|m| !m.is_empty()),
        })
    }
}

fn parse_port(component: &str, value: &str) -> Result<u16, SpecError> {
    value.trim().parse::<u16>().map_err(|_| SpecError::MalformedPort {
        component: component.to_string(),
        value: value.to_string(),
    })
}

/// Parse a comma separated port list. `"8080"` publishes the same port on
/// the host; `"31000:8080"` maps host port 31000 to container port 8080.
pub fn parse_ports(component: &str, ports: &str) -> Result<Vec<PortMapping>, SpecError> {
    let mut mappings = Vec::new();
    for entry in ports.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let parts: Vec<&str> = entry.split(':').collect();
        let mapping = match parts.as_slice() {
            [port] => {
                let port = parse_port(component, port)?;
                PortMapping::tcp(port, port)
            }
            [host, container] => {
                PortMapping::tcp(parse_port(component, host)?, parse_port(component, container)?)
            }
            _ => {
                return Err(SpecError::MalformedPort {
                    component: component.to_string(),
                    value: entry.to_string(),
                })
            }
        };
        mappings.push(mapping);
    }
    Ok(mappings)
}

/// Parse a comma separated dependency list, checking each name against the
/// components declared in the same environment.
pub fn parse_dependencies(
    component: &str,
    depends: &str,
    known: &[&str],
) -> Result<Vec<String>, SpecError> {
    depends
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|d| {
            if known.contains(&d) {
                Ok(d.to_string())
            } else {
                Err(SpecError::UnknownDependency {
                    component: component.to_string(),
                    dependency: d.to_string(),
                })
            }
        })
        .collect()
}

/// Parse `host:container` or `host:container:mode` (mode `ro` or `rw`)
pub fn parse_volume(component: &str, volume: &str) -> Result<VolumeMount, SpecError> {
    let malformed = || SpecError::MalformedVolume {
        component: component.to_string(),
        value: volume.to_string(),
    };

    let parts: Vec<&str> = volume.split(':').map(str::trim).collect();
    let (host, container, mode) = match parts.as_slice() {
        [host, container] => (*host, *container, "RW"),
        [host, container, mode] => {
            let mode = match mode.to_ascii_lowercase().as_str() {
                "rw" => "RW",
                "ro" => "RO",
                _ => return Err(malformed()),
            };
            (*host, *container, mode)
        }
        _ => return Err(malformed()),
    };

    if host.is_empty() || container.is_empty() {
        return Err(malformed());
    }

    Ok(VolumeMount {
        container_path: container.to_string(),
        host_path: host.to_string(),
        mode: mode.to_string(),
    })
}

/// Parse every tunnel declaration in the environment
pub fn tunnel_specs(env: &EnvironmentFile) -> Result<Vec<TunnelSpec>, SpecError> {
    env.tunnel_entries().iter().map(TunnelSpec::parse).collect()
}

/// Validate an environment for consistency.
/// This is a pure function - no I/O.
pub fn validate_environment(env: &EnvironmentFile) -> Result<(), SpecError> {
    if env.components().is_empty() {
        return Err(SpecError::NoComponents);
    }

    let known = env.component_names();

    for component in env.components() {
        if let Some(ports) = &component.ports {
            parse_ports(&component.name, ports)?;
        }
        if let Some(depends) = &component.depends {
            parse_dependencies(&component.name, depends, &known)?;
        }
        for volume in &component.volumes {
            parse_volume(&component.name, volume)?;
        }
    }

    for spec in tunnel_specs(env)? {
        if !known.contains(&spec.component.as_str()) {
            return Err(SpecError::UnknownTunnelComponent {
                service: format!("{}:{}:{}", spec.local_port, spec.component, spec.remote_port),
                component: spec.component,
            });
        }
    }

    Ok(())
}
