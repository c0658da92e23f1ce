//! # Cluster state
//!
//! Read-only views of the cluster the orchestrator works against:
//!
//! - **ClusterInfo**: machine classes (homogeneous node pools) grouped from
//!   the inventory service's node records
//! - **Resources**: per-component cpu, memory and instance counts resolved
//!   from an environment's `auto` policies
//!
//! Nothing here is cached. Every orchestration call reads the inventory
//! again, so nodes added or removed by other tools are always picked up.
//!
//! ```text
//!   inventory (state.json)          environment file
//!            │                             │
//!            ▼                             ▼
//!   build_cluster_info ──► ClusterInfo ──► allocate_resources
//!                                               │
//!                                               ▼
//!                              component → (cpu, mem, instances, machine)
//! ```

pub mod info;
pub mod resources;

pub use info::{
    build_cluster_info, ClusterInfo, ClusterInfoError, InventoryState, MachineClass, NodeRecord,
    NodeResources,
};
pub use resources::*;

/// Node attribute naming a node's machine class
pub const MACHINE_CLASS_ATTRIBUTE: &str = "name";

/// Scheduler constraint operator that pins an app to a machine class
pub const CLUSTER_OPERATOR: &str = "CLUSTER";

/// Default Mesos master port
pub const INVENTORY_PORT: u16 = 5050;

/// Default Marathon port
pub const SCHEDULER_PORT: u16 = 8080;

/// Default shared volume mounted into every container
pub const SHARED_VOLUME_PATH: &str = "/home/data";
