//! Resource allocation
//!
//! Every component names a machine class and leaves exactly one of cpu and
//! count as `auto`. All components on one class must agree on which one:
//!
//! - **auto cpu**: the class's per-node cpu and memory are split evenly
//!   between its components; instance counts stay as declared.
//! - **auto count**: cpu is explicit; as many instances as fit on a node are
//!   started on every node of the class. An instance never spans nodes, so a
//!   request above one node's cpu is rejected.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::info::{ClusterInfo, MachineClass};
use crate::config::{ComponentSpec, ResourcePolicy, SpecError};

/// Default slack (in cpus) left on a node before a component counts as underusing it
pub const DEFAULT_UNDERUSE_THRESHOLD: f64 = 0.05;

/// Concrete resources for one component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentResources {
    /// Cpus per instance
    pub cpu: f64,
    /// Memory per instance
    pub mem: f64,
    pub instances: u32,
    /// Machine class the component runs on
    pub machine: String,
}

/// Which resource the allocator derives for a machine class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AutoMode {
    Cpu,
    Count,
}

/// A component's request with the explicit half resolved
#[derive(Debug, Clone, Copy)]
enum Request {
    AutoCpu { count: u32 },
    AutoCount { cpu: f64 },
}

impl Request {
    fn of(component: &ComponentSpec) -> Result<Self, SpecError> {
        match (component.cpu, component.count) {
            (ResourcePolicy::Auto, ResourcePolicy::Fixed(count)) => Ok(Request::AutoCpu { count }),
            (ResourcePolicy::Fixed(cpu), ResourcePolicy::Auto) => Ok(Request::AutoCount { cpu }),
            (ResourcePolicy::Auto, ResourcePolicy::Auto) => Err(SpecError::InvalidPolicy {
                component: component.name.clone(),
                detail: "both cpu and count are \"auto\", which is an invalid combination"
                    .to_string(),
            }),
            (ResourcePolicy::Fixed(cpu), ResourcePolicy::Fixed(count)) => {
                Err(SpecError::InvalidPolicy {
                    component: component.name.clone(),
                    detail: format!(
                        "cpu is explicitly set to {} and count to {}, which is an invalid combination",
                        cpu, count
                    ),
                })
            }
        }
    }

    fn mode(&self) -> AutoMode {
        match self {
            Request::AutoCpu { .. } => AutoMode::Cpu,
            Request::AutoCount { .. } => AutoMode::Count,
        }
    }
}

struct MachineGroup<'a> {
    class: &'a MachineClass,
    mode: AutoMode,
    members: Vec<(&'a str, Request)>,
}

/// Outcome of resolving an environment's resource policies
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Allocation {
    pub resources: HashMap<String, ComponentResources>,
    /// Auto-count components leaving more than the threshold of cpus idle on
    /// each node
    pub underused: Vec<String>,
}

/// Resolve `auto` policies into concrete cpu, memory and instance counts.
/// This is a pure function - no I/O.
pub fn allocate_resources(
    components: &[ComponentSpec],
    cluster: &ClusterInfo,
    underuse_threshold: f64,
) -> Result<Allocation, SpecError> {
    let mut groups: Vec<MachineGroup> = Vec::new();

    for component in components {
        let class = cluster
            .get(&component.machine)
            .ok_or_else(|| SpecError::UnknownMachine {
                component: component.name.clone(),
                machine: component.machine.clone(),
            })?;

        let request = Request::of(component)?;

        let group = match groups.iter_mut().position(|g| g.class.name == class.name) {
            Some(idx) => &mut groups[idx],
            None => {
                groups.push(MachineGroup {
                    class,
                    mode: request.mode(),
                    members: Vec::new(),
                });
                let last = groups.len() - 1;
                &mut groups[last]
            }
        };

        if group.mode != request.mode() {
            return Err(SpecError::MixedAutoModes(class.name.clone()));
        }
        group.members.push((component.name.as_str(), request));
    }

    let mut allocation = Allocation::default();
    for group in &groups {
        let class = group.class;
        let sharing = group.members.len() as f64;

        for &(name, request) in &group.members {
            let resources = match request {
                Request::AutoCpu { count } => ComponentResources {
                    cpu: class.cpu_per_node / sharing,
                    mem: class.mem_per_node / sharing,
                    instances: count,
                    machine: class.name.clone(),
                },
                Request::AutoCount { cpu } => {
                    let (resources, idle) = allocate_count(name, cpu, class)?;
                    if idle > underuse_threshold {
                        allocation.underused.push(name.to_string());
                    }
                    resources
                }
            };
            allocation.resources.insert(name.to_string(), resources);
        }
    }

    Ok(allocation)
}

/// Resources for an auto-count component and the cpus it leaves idle per node
fn allocate_count(
    name: &str,
    cpu: f64,
    class: &MachineClass,
) -> Result<(ComponentResources, f64), SpecError> {
    let cpus_per_node = class.cpu_per_node;

    if !cpu.is_finite() || cpu <= 0.0 {
        return Err(SpecError::InvalidPolicy {
            component: name.to_string(),
            detail: format!("cpu must be a positive number, got {}", cpu),
        });
    }
    if cpu > cpus_per_node {
        return Err(SpecError::CpuExceedsNode {
            component: name.to_string(),
            cpu,
            machine: class.name.clone(),
            available: cpus_per_node,
        });
    }

    let per_node = (cpus_per_node / cpu).floor();
    let too_many = || SpecError::TooManyInstances {
        component: name.to_string(),
        cpu,
        machine: class.name.clone(),
    };
    if per_node > u32::MAX as f64 {
        return Err(too_many());
    }
    let instances_per_node = per_node as u32;
    let instances = class
        .node_count
        .checked_mul(instances_per_node)
        .ok_or_else(too_many)?;

    let idle = cpus_per_node - instances_per_node as f64 * cpu;
    Ok((
        ComponentResources {
            cpu,
            mem: (class.mem_per_node / cpus_per_node) * cpu,
            instances,
            machine: class.name.clone(),
        },
        idle,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::info::MachineClass;

    fn cluster() -> ClusterInfo {
        [
            MachineClass {
                name: "worker".to_string(),
                node_count: 2,
                cpu_per_node: 4.0,
                mem_per_node: 8192.0,
                hostname: "10.0.0.11".to_string(),
            },
            MachineClass {
                name: "master".to_string(),
                node_count: 1,
                cpu_per_node: 2.0,
                mem_per_node: 4096.0,
                hostname: "10.0.0.2".to_string(),
            },
        ]
        .into_iter()
        .collect()
    }

    fn component(
        name: &str,
        machine: &str,
        cpu: ResourcePolicy<f64>,
        count: ResourcePolicy<u32>,
    ) -> ComponentSpec {
        ComponentSpec {
            name: name.to_string(),
            machine: machine.to_string(),
            cpu,
            count,
            ports: None,
            depends: None,
            image: "busybox".to_string(),
            cmd: None,
            docker_network: "bridge".to_string(),
            volumes: vec![],
        }
    }

    fn allocate(components: &[ComponentSpec]) -> Result<HashMap<String, ComponentResources>, SpecError> {
        allocate_resources(components, &cluster(), DEFAULT_UNDERUSE_THRESHOLD)
            .map(|allocation| allocation.resources)
    }

    fn auto_count(cpu: f64) -> [ComponentSpec; 1] {
        [component("a", "worker", ResourcePolicy::Fixed(cpu), ResourcePolicy::Auto)]
    }

    #[test]
    fn test_single_auto_cpu_component_takes_whole_node() {
        let components = [component("a", "worker", ResourcePolicy::Auto, ResourcePolicy::Fixed(3))];
        let res = allocate(&components).unwrap();

        assert_eq!(
            res["a"],
            ComponentResources {
                cpu: 4.0,
                mem: 8192.0,
                instances: 3,
                machine: "worker".to_string()
            }
        );
    }

    #[test]
    fn test_auto_cpu_split_evenly() {
        let components = [
            component("a", "worker", ResourcePolicy::Auto, ResourcePolicy::Fixed(1)),
            component("b", "worker", ResourcePolicy::Auto, ResourcePolicy::Fixed(5)),
        ];
        let res = allocate(&components).unwrap();

        assert_eq!(res["a"].cpu, 2.0);
        assert_eq!(res["a"].mem, 4096.0);
        assert_eq!(res["b"].cpu, 2.0);
        assert_eq!(res["b"].mem, 4096.0);
        assert_eq!(res["b"].instances, 5);
    }

    #[test]
    fn test_auto_cpu_shares_sum_to_node() {
        let components: Vec<_> = (0..3)
            .map(|i| {
                component(&format!("c{}", i), "worker", ResourcePolicy::Auto, ResourcePolicy::Fixed(1))
            })
            .collect();
        let res = allocate(&components).unwrap();

        let total: f64 = res.values().map(|r| r.cpu).sum();
        assert!((total - 4.0).abs() < 1e-9);
        assert!(res.values().all(|r| (r.cpu - res["c0"].cpu).abs() < 1e-12));
    }

    #[test]
    fn test_auto_count() {
        let components = [component("a", "worker", ResourcePolicy::Fixed(1.5), ResourcePolicy::Auto)];
        let res = allocate(&components).unwrap();

        assert_eq!(res["a"].cpu, 1.5);
        assert_eq!(res["a"].instances, 4);
        assert_eq!(res["a"].mem, 3072.0);
    }

    #[test]
    fn test_auto_count_formula() {
        for cpu in [0.1, 0.25, 0.5, 1.0, 1.3, 2.0, 3.9, 4.0] {
            let components = [component("a", "worker", ResourcePolicy::Fixed(cpu), ResourcePolicy::Auto)];
            let res = allocate(&components).unwrap();
            assert_eq!(res["a"].instances, 2 * (4.0 / cpu).floor() as u32, "cpu {}", cpu);
        }
    }

    #[test]
    fn test_auto_count_cpu_exceeds_node() {
        let components = [component("a", "worker", ResourcePolicy::Fixed(4.5), ResourcePolicy::Auto)];
        assert!(matches!(
            allocate(&components),
            Err(SpecError::CpuExceedsNode { .. })
        ));
    }

    #[test]
    fn test_auto_count_zero_cpu_rejected() {
        let components = [component("a", "worker", ResourcePolicy::Fixed(0.0), ResourcePolicy::Auto)];
        assert!(matches!(
            allocate(&components),
            Err(SpecError::InvalidPolicy { .. })
        ));
    }

    #[test]
    fn test_mixed_modes_rejected_in_any_order() {
        let auto_cpu = component("a", "worker", ResourcePolicy::Auto, ResourcePolicy::Fixed(1));
        let auto_count = component("b", "worker", ResourcePolicy::Fixed(1.0), ResourcePolicy::Auto);

        for order in [
            vec![auto_cpu.clone(), auto_count.clone()],
            vec![auto_count.clone(), auto_cpu.clone()],
        ] {
            assert_eq!(
                allocate(&order),
                Err(SpecError::MixedAutoModes("worker".to_string()))
            );
        }
    }

    #[test]
    fn test_modes_independent_across_classes() {
        let components = [
            component("a", "worker", ResourcePolicy::Fixed(1.0), ResourcePolicy::Auto),
            component("b", "master", ResourcePolicy::Auto, ResourcePolicy::Fixed(1)),
        ];
        let res = allocate(&components).unwrap();
        assert_eq!(res["a"].instances, 8);
        assert_eq!(res["b"].cpu, 2.0);
        assert_eq!(res["b"].machine, "master");
    }

    #[test]
    fn test_both_auto_rejected() {
        let components = [component("a", "worker", ResourcePolicy::Auto, ResourcePolicy::Auto)];
        assert!(matches!(
            allocate(&components),
            Err(SpecError::InvalidPolicy { .. })
        ));
    }

    #[test]
    fn test_both_explicit_rejected() {
        let components = [component("a", "worker", ResourcePolicy::Fixed(1.0), ResourcePolicy::Fixed(2))];
        assert!(matches!(
            allocate(&components),
            Err(SpecError::InvalidPolicy { .. })
        ));
    }

    #[test]
    fn test_unknown_machine() {
        let components = [component("a", "gpu", ResourcePolicy::Auto, ResourcePolicy::Fixed(1))];
        assert_eq!(
            allocate(&components),
            Err(SpecError::UnknownMachine {
                component: "a".to_string(),
                machine: "gpu".to_string()
            })
        );
    }

    #[test]
    fn test_underuse_reported() {
        let underused = |cpu: f64| {
            allocate_resources(&auto_count(cpu), &cluster(), DEFAULT_UNDERUSE_THRESHOLD)
                .unwrap()
                .underused
        };

        // 4 cpus / 1.5 leaves one cpu idle on every node
        assert_eq!(underused(1.5), vec!["a".to_string()]);
        assert!(underused(1.0).is_empty());
        assert!(underused(2.0).is_empty());
    }

    #[test]
    fn test_underuse_threshold() {
        // 4 cpus / 1.3 leaves 0.1 idle
        let tolerant = allocate_resources(&auto_count(1.3), &cluster(), 0.5).unwrap();
        assert!(tolerant.underused.is_empty());

        let strict = allocate_resources(&auto_count(1.3), &cluster(), 0.05).unwrap();
        assert_eq!(strict.underused, vec!["a".to_string()]);
    }

    #[test]
    fn test_auto_cpu_never_underused() {
        let components = [component("a", "worker", ResourcePolicy::Auto, ResourcePolicy::Fixed(3))];
        let allocation = allocate_resources(&components, &cluster(), 0.0).unwrap();
        assert!(allocation.underused.is_empty());
    }

    #[test]
    fn test_auto_count_non_finite_cpu_rejected() {
        for cpu in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -1.0] {
            assert!(
                matches!(allocate(&auto_count(cpu)), Err(SpecError::InvalidPolicy { .. })),
                "cpu {}",
                cpu
            );
        }
    }

    #[test]
    fn test_auto_count_nan_from_yaml_rejected() {
        let policy: ResourcePolicy<f64> = serde_yaml::from_str(".nan").unwrap();
        let components = [component("a", "worker", policy, ResourcePolicy::Auto)];
        assert!(matches!(
            allocate(&components),
            Err(SpecError::InvalidPolicy { .. })
        ));
    }

    #[test]
    fn test_auto_count_instance_overflow_rejected() {
        assert_eq!(
            allocate(&auto_count(1e-9)),
            Err(SpecError::TooManyInstances {
                component: "a".to_string(),
                cpu: 1e-9,
                machine: "worker".to_string(),
            })
        );
    }
}
