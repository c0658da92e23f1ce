//! Cluster inventory - machine classes derived from raw node records
//!
//! The inventory service reports one record per node. Nodes carry a `name`
//! attribute naming their machine class; nodes of a class are assumed to be
//! homogeneous, so the first record of a class supplies per-node resources
//! and the representative hostname, and later records only bump the count.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::MACHINE_CLASS_ATTRIBUTE;

/// Errors reading cluster information
#[derive(Error, Debug, PartialEq)]
pub enum ClusterInfoError {
    #[error("Could not obtain cluster information: inventory response has no node list")]
    MissingNodeList,
}

/// Raw inventory response (`/master/state.json`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryState {
    /// `None` when the response carried no node list at all
    #[serde(default)]
    pub slaves: Option<Vec<NodeRecord>>,
}

/// A single node as reported by the inventory service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub hostname: String,

    /// Free-form attributes; `name` identifies the machine class
    #[serde(default)]
    pub attributes: HashMap<String, Value>,

    pub resources: NodeResources,
}

/// Resource totals of a node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeResources {
    #[serde(default)]
    pub cpus: f64,

    /// Memory in the inventory's units (MB for Mesos)
    #[serde(default)]
    pub mem: f64,
}

impl NodeRecord {
    pub fn new(machine: &str, hostname: &str, cpus: f64, mem: f64) -> Self {
        let mut attributes = HashMap::new();
        attributes.insert(
            MACHINE_CLASS_ATTRIBUTE.to_string(),
            Value::String(machine.to_string()),
        );
        Self {
            hostname: hostname.to_string(),
            attributes,
            resources: NodeResources { cpus, mem },
        }
    }

    /// Machine class named by the `name` attribute
    pub fn machine_class(&self) -> Option<String> {
        match self.attributes.get(MACHINE_CLASS_ATTRIBUTE)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// A pool of homogeneous nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineClass {
    pub name: String,
    pub node_count: u32,
    pub cpu_per_node: f64,
    pub mem_per_node: f64,
    /// Hostname of one node of the class
    pub hostname: String,
}

/// Machine classes by name, rebuilt on every read
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterInfo {
    classes: BTreeMap<String, MachineClass>,
}

impl ClusterInfo {
    pub fn get(&self, name: &str) -> Option<&MachineClass> {
        self.classes.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MachineClass> {
        self.classes.values()
    }
}

impl FromIterator<MachineClass> for ClusterInfo {
    fn from_iter<I: IntoIterator<Item = MachineClass>>(iter: I) -> Self {
        Self {
            classes: iter.into_iter().map(|c| (c.name.clone(), c)).collect(),
        }
    }
}

/// Group raw node records into machine classes.
/// This is a pure function - no I/O.
pub fn build_cluster_info(state: &InventoryState) -> Result<ClusterInfo, ClusterInfoError> {
    let nodes = state
        .slaves
        .as_ref()
        .ok_or(ClusterInfoError::MissingNodeList)?;

    let mut classes: BTreeMap<String, MachineClass> = BTreeMap::new();

    for node in nodes {
        let Some(name) = node.machine_class() else {
            warn!(
                "No \"{}\" attribute present for node {}, skipping",
                MACHINE_CLASS_ATTRIBUTE, node.hostname
            );
            continue;
        };

        classes
            .entry(name.clone())
            .and_modify(|class| class.node_count += 1)
            .or_insert_with(|| MachineClass {
                name,
                node_count: 1,
                cpu_per_node: node.resources.cpus,
                mem_per_node: node.resources.mem,
                hostname: node.hostname.clone(),
            });
    }

    debug!("Cluster has {} machine class(es)", classes.len());
    Ok(ClusterInfo { classes })
}
