//! Launching an environment
//!
//! ```text
//! CheckingRunning ─┬─► AlreadyRunning
//!                  └─► StagingImages ─► CopyingFiles ─► Submitting ─► WaitingForConvergence
//!                                                                      ├─► Launched
//!                                                                      └─► TimedOut
//! ```
//!
//! Nothing is rolled back: apps submitted before a failure or a timeout are
//! left running and can be removed with `destroy`.

use std::collections::HashMap;

use serde_json::json;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::{Environment, EnvironmentError, OperationStatus};
use crate::client::scheduler::machine_constraint;
use crate::client::{AppDescriptor, Container, DockerParameter, DockerSpec};
use crate::cluster::{allocate_resources, ComponentResources};
use crate::config::{
    parse_dependencies, parse_ports, parse_volume, validate_environment, ComponentSpec,
    EnvironmentFile, SpecError, VolumeMount,
};

/// Docker `--add-host` alias for the central logging node
pub const CENTRAL_LOGGING_ALIAS: &str = "central-logging";

/// Environment variable carrying the central logging address
pub const CENTRAL_LOGGING_ENV: &str = "CENTRAL_LOGGING_HOST";

/// Result of a launch that did not fail outright
#[derive(Debug, Clone, PartialEq)]
pub enum LaunchOutcome {
    /// Every component was already running; nothing was submitted
    AlreadyRunning { message: String },
    /// All components converged
    Launched {
        components: Vec<String>,
        message: String,
    },
    /// Some components did not start in time
    TimedOut {
        converged: Vec<String>,
        pending: Vec<String>,
    },
}

impl LaunchOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, LaunchOutcome::TimedOut { .. })
    }

    /// Tunnel messages, if any were produced
    pub fn message(&self) -> &str {
        match self {
            LaunchOutcome::AlreadyRunning { message } => message,
            LaunchOutcome::Launched { message, .. } => message,
            LaunchOutcome::TimedOut { .. } => "",
        }
    }

    pub fn into_status(self) -> OperationStatus {
        match self {
            LaunchOutcome::AlreadyRunning { message } => {
                let text = if message.is_empty() {
                    "Environment already running, not launching anything".to_string()
                } else {
                    message
                };
                OperationStatus::success(text)
            }
            LaunchOutcome::Launched {
                components,
                message,
            } => {
                let mut text = format!(
                    "Launched {} components: {}",
                    components.len(),
                    components.join(", ")
                );
                if !message.is_empty() {
                    text.push('\n');
                    text.push_str(&message);
                }
                OperationStatus::success(text).with_details(json!({ "components": components }))
            }
            LaunchOutcome::TimedOut { converged, pending } => OperationStatus::failure(format!(
                "Timed out waiting for components to launch: {} not running",
                pending.join(", ")
            ))
            .with_details(json!({ "converged": converged, "pending": pending })),
        }
    }
}

// ============================================================================
// SBIO: Pure descriptor construction (no I/O)
// ============================================================================

/// Scheduler app descriptor for one component.
///
/// `known` lists every component of the environment so dependencies can be
/// checked; they are submitted as `/<name>`.
pub fn build_descriptor(
    component: &ComponentSpec,
    resources: &ComponentResources,
    known: &[&str],
    shared_volume: &str,
    logging_host: Option<&str>,
) -> Result<AppDescriptor, SpecError> {
    let port_mappings = match &component.ports {
        Some(ports) => parse_ports(&component.name, ports)?,
        None => vec![],
    };

    let dependencies = match &component.depends {
        Some(depends) => parse_dependencies(&component.name, depends, known)?
            .into_iter()
            .map(|d| format!("/{}", d))
            .collect(),
        None => vec![],
    };

    let mut volumes = vec![VolumeMount::read_write(shared_volume, shared_volume)];
    for volume in &component.volumes {
        volumes.push(parse_volume(&component.name, volume)?);
    }

    let mut parameters = vec![];
    let mut env = HashMap::new();
    if let Some(ip) = logging_host {
        parameters.push(DockerParameter {
            key: "add-host".to_string(),
            value: format!("{}:{}", CENTRAL_LOGGING_ALIAS, ip),
        });
        env.insert(CENTRAL_LOGGING_ENV.to_string(), ip.to_string());
    }

    Ok(AppDescriptor {
        id: component.name.clone(),
        cmd: component.cmd.clone().filter(|c| !c.trim().is_empty()),
        cpus: resources.cpu,
        mem: resources.mem,
        instances: resources.instances,
        dependencies,
        constraints: vec![machine_constraint(&component.machine)],
        container: Container {
            container_type: "DOCKER".to_string(),
            docker: DockerSpec {
                image: component.image.clone(),
                network: component.docker_network.to_uppercase(),
                port_mappings,
                force_pull_image: true,
                privileged: true,
                parameters,
            },
            volumes,
        },
        env,
    })
}

// ============================================================================
// SBIO: Orchestration (I/O through collaborators)
// ============================================================================

impl Environment {
    /// Launch every component of `env` and wait for all of them to start
    pub async fn launch(&self, env: &EnvironmentFile) -> Result<LaunchOutcome, EnvironmentError> {
        validate_environment(env)?;

        let cluster = self.cluster_info(self.config.inventory_wait).await?;
        let allocation =
            allocate_resources(env.components(), &cluster, self.config.underuse_threshold)?;
        for name in &allocation.underused {
            info!(
                "Component \"{}\" leaves cpus idle on every node, resources are underused",
                name
            );
        }
        let resources = allocation.resources;

        let names = env.component_names();
        let running = self.running_app_names().await?;
        let present: Vec<String> = names
            .iter()
            .filter(|name| running.iter().any(|r| r.as_str() == **name))
            .map(|name| name.to_string())
            .collect();

        if present.len() == names.len() {
            info!("Environment already running, not launching anything");
            let message = self.expose_tunnels(env, &cluster, &resources).await?;
            return Ok(LaunchOutcome::AlreadyRunning { message });
        }
        if !present.is_empty() {
            return Err(EnvironmentError::PartiallyRunning(present));
        }

        self.stage_images(env).await?;
        self.copy_files(env).await?;
        let submitted = self.submit_components(env, &resources).await?;

        let (converged, pending) = self.wait_for_convergence(&submitted).await?;
        info!(
            "Launched {} components: {}",
            converged.len(),
            converged.join(", ")
        );
        if !pending.is_empty() {
            warn!("Timed out waiting for components to launch");
            warn!("Could not launch all components: {}", pending.join(", "));
            return Ok(LaunchOutcome::TimedOut { converged, pending });
        }

        let message = self.expose_tunnels(env, &cluster, &resources).await?;
        Ok(LaunchOutcome::Launched {
            components: converged,
            message,
        })
    }

    /// Build every declared image the controller does not have yet.
    /// All Dockerfiles are located before the first build starts.
    async fn stage_images(&self, env: &EnvironmentFile) -> Result<(), EnvironmentError> {
        info!("Checking for Docker images...");

        let mut to_build = Vec::new();
        for image in &env.environment.image {
            if self.host.image_exists(&image.image_name).await? {
                debug!("Image \"{}\" already exists, no need to build", image.image_name);
                continue;
            }
            let folder = env.full_path(&image.dockerfile);
            if !folder.join("Dockerfile").is_file() {
                return Err(SpecError::MissingDockerfile(image.dockerfile.clone()).into());
            }
            to_build.push((folder, &image.image_name));
        }

        for (folder, image_name) in to_build {
            self.host
                .build_image(&folder, image_name)
                .await
                .map_err(|e| {
                    EnvironmentError::Staging(format!(
                        "Problem building image from {}: {}",
                        folder.display(),
                        e
                    ))
                })?;
        }
        Ok(())
    }

    async fn copy_files(&self, env: &EnvironmentFile) -> Result<(), EnvironmentError> {
        if env.environment.copy.is_empty() {
            return Ok(());
        }
        info!("Copying files...");
        for item in &env.environment.copy {
            self.host.sync_put(&env.full_path(item), "").await?;
        }
        Ok(())
    }

    /// Submit components in declaration order, returning each name with its
    /// expected instance count
    async fn submit_components(
        &self,
        env: &EnvironmentFile,
        resources: &HashMap<String, ComponentResources>,
    ) -> Result<Vec<(String, u32)>, EnvironmentError> {
        let known = env.component_names();
        let logging_host = self.host.central_logging_host().await?;

        let mut descriptors = Vec::new();
        for component in env.components() {
            let allocated = resources.get(&component.name).ok_or_else(|| {
                SpecError::UnknownMachine {
                    component: component.name.clone(),
                    machine: component.machine.clone(),
                }
            })?;
            descriptors.push(build_descriptor(
                component,
                allocated,
                &known,
                &self.config.shared_volume,
                logging_host.as_deref(),
            )?);
        }

        let mut submitted = Vec::new();
        for descriptor in descriptors {
            // Another client may have created the app since the first check
            if self.running_app_names().await?.contains(&descriptor.id) {
                return Err(EnvironmentError::Conflict(descriptor.id));
            }

            let noun = if descriptor.instances == 1 {
                "instance"
            } else {
                "instances"
            };
            info!("Starting {} {} of {}", descriptor.instances, noun, descriptor.id);

            self.scheduler.create_app(&descriptor).await?;
            submitted.push((descriptor.id, descriptor.instances));
        }
        Ok(submitted)
    }

    /// Poll until every app has its full set of started tasks or the launch
    /// timeout passes. Returns (converged, pending) names.
    async fn wait_for_convergence(
        &self,
        submitted: &[(String, u32)],
    ) -> Result<(Vec<String>, Vec<String>), EnvironmentError> {
        debug!("Waiting for components to start up...");

        let deadline = Instant::now() + self.config.launch_timeout;
        let mut converged = Vec::new();
        let mut pending = submitted.to_vec();

        while !pending.is_empty() && Instant::now() < deadline {
            sleep(self.config.launch_poll_interval).await;

            let mut still_pending = Vec::new();
            for (name, expected) in pending {
                let app = self.scheduler.get_app(&name).await?;
                if app.is_converged(expected) {
                    debug!("Component {} is running", name);
                    converged.push(name);
                } else {
                    still_pending.push((name, expected));
                }
            }
            pending = still_pending;
        }

        Ok((converged, pending.into_iter().map(|(name, _)| name).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{environment, harness};
    use super::*;
    use crate::client::inventory::mock::MockInventory;
    use crate::client::scheduler::mock::{Convergence, MockScheduler};
    use crate::client::App;
    use crate::cluster::NodeRecord;
    use crate::config::PortMapping;
    use crate::runtime::host::mock::MockHost;

    const ENV: &str = r#"
environment:
  image:
    - image_name: bdkd/engine
      dockerfile: image/engine
  copy:
    - data/
  components:
    db:
      machine: worker
      cpu: 1
      count: auto
      image: redis
      ports: "6379"
    engine:
      machine: master
      cpu: auto
      count: 2
      image: bdkd/engine
      cmd: /bin/run --port 8080
      ports: "31080:8080, 9000"
      depends: db
      docker_network: host
      volumes:
        - /scratch:/scratch:ro
  expose_tunnel:
    service: "8888:engine:8080"
    message: "Engine at {url}"
"#;

    fn inventory() -> MockInventory {
        MockInventory::new(vec![
            NodeRecord::new("worker", "10.0.1.1", 4.0, 8192.0),
            NodeRecord::new("worker", "10.0.1.2", 4.0, 8192.0),
            NodeRecord::new("master", "10.0.0.1", 2.0, 4096.0),
        ])
    }

    fn host() -> MockHost {
        MockHost::new().with_image("bdkd/engine")
    }

    fn engine_resources() -> ComponentResources {
        ComponentResources {
            cpu: 2.0,
            mem: 4096.0,
            instances: 2,
            machine: "master".to_string(),
        }
    }

    #[test]
    fn test_build_descriptor() {
        let env = environment(ENV);
        let engine = env.component("engine").unwrap();
        let descriptor =
            build_descriptor(engine, &engine_resources(), &["db", "engine"], "/home/data", None)
                .unwrap();

        assert_eq!(descriptor.id, "engine");
        assert_eq!(descriptor.cmd.as_deref(), Some("/bin/run --port 8080"));
        assert_eq!(descriptor.instances, 2);
        assert_eq!(descriptor.dependencies, vec!["/db"]);
        assert_eq!(descriptor.constraints, vec![vec!["name", "CLUSTER", "master"]]);

        let docker = &descriptor.container.docker;
        assert_eq!(docker.network, "HOST");
        assert!(docker.force_pull_image);
        assert!(docker.privileged);
        assert!(docker.parameters.is_empty());
        assert_eq!(
            docker.port_mappings,
            vec![PortMapping::tcp(31080, 8080), PortMapping::tcp(9000, 9000)]
        );

        let volumes = &descriptor.container.volumes;
        assert_eq!(volumes[0], VolumeMount::read_write("/home/data", "/home/data"));
        assert_eq!(volumes[1].mode, "RO");
        assert!(descriptor.env.is_empty());
    }

    #[test]
    fn test_build_descriptor_with_logging_host() {
        let env = environment(ENV);
        let engine = env.component("engine").unwrap();
        let descriptor = build_descriptor(
            engine,
            &engine_resources(),
            &["db", "engine"],
            "/home/data",
            Some("10.0.0.9"),
        )
        .unwrap();

        assert_eq!(
            descriptor.container.docker.parameters,
            vec![DockerParameter {
                key: "add-host".to_string(),
                value: "central-logging:10.0.0.9".to_string()
            }]
        );
        assert_eq!(descriptor.env[CENTRAL_LOGGING_ENV], "10.0.0.9");
    }

    #[test]
    fn test_build_descriptor_unknown_dependency() {
        let env = environment(ENV);
        let engine = env.component("engine").unwrap();
        let result = build_descriptor(engine, &engine_resources(), &["engine"], "/home/data", None);
        assert!(matches!(result, Err(SpecError::UnknownDependency { .. })));
    }

    #[tokio::test]
    async fn test_launch_fresh_environment() {
        let h = harness(inventory(), MockScheduler::new(), host());
        let outcome = h.env.launch(&environment(ENV)).await.unwrap();

        assert!(outcome.is_success());
        assert_eq!(
            outcome,
            LaunchOutcome::Launched {
                components: vec!["db".to_string(), "engine".to_string()],
                message: "Engine at http://localhost:8888".to_string(),
            }
        );

        let created = h.scheduler.created();
        let ids: Vec<&str> = created.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["db", "engine"]);
        // count-auto: 2 nodes * floor(4 / 1)
        assert_eq!(created[0].instances, 8);
        assert_eq!(created[0].mem, 2048.0);

        assert!(h.host.builds().is_empty());
        assert_eq!(
            h.host.syncs(),
            vec![(std::path::PathBuf::from("/work/env/data/"), String::new())]
        );
        assert_eq!(h.host.local_tunnels(), vec![(8080, 8888)]);
        assert_eq!(h.host.controller_tunnels()[0].1, "10.0.0.1");
    }

    #[tokio::test]
    async fn test_launch_points_components_at_logging_host() {
        let h = harness(inventory(), MockScheduler::new(), host().with_logging_host("10.0.0.9"));
        h.env.launch(&environment(ENV)).await.unwrap();

        for descriptor in h.scheduler.created() {
            assert_eq!(
                descriptor.container.docker.parameters,
                vec![DockerParameter {
                    key: "add-host".to_string(),
                    value: "central-logging:10.0.0.9".to_string(),
                }],
                "{}",
                descriptor.id
            );
            assert_eq!(descriptor.env[CENTRAL_LOGGING_ENV], "10.0.0.9");
        }
    }

    #[tokio::test]
    async fn test_launch_without_logging_host() {
        let h = harness(inventory(), MockScheduler::new(), host());
        h.env.launch(&environment(ENV)).await.unwrap();

        for descriptor in h.scheduler.created() {
            assert!(descriptor.container.docker.parameters.is_empty());
            assert!(descriptor.env.is_empty());
        }
    }

    #[tokio::test]
    async fn test_second_launch_is_idempotent() {
        let h = harness(inventory(), MockScheduler::new(), host());
        let env = environment(ENV);

        h.env.launch(&env).await.unwrap();
        let mutations = h.scheduler.mutation_count();

        let outcome = h.env.launch(&env).await.unwrap();
        assert!(matches!(outcome, LaunchOutcome::AlreadyRunning { .. }));
        assert_eq!(outcome.message(), "Engine at http://localhost:8888");
        assert_eq!(h.scheduler.mutation_count(), mutations);
    }

    #[tokio::test]
    async fn test_partially_running_environment_fails() {
        let scheduler = MockScheduler::new().with_app(App::new("/db", 8).on_machine("worker"));
        let h = harness(inventory(), scheduler, host());

        let result = h.env.launch(&environment(ENV)).await;
        match result {
            Err(EnvironmentError::PartiallyRunning(names)) => assert_eq!(names, vec!["db"]),
            other => panic!("expected PartiallyRunning, got {:?}", other),
        }
        assert_eq!(h.scheduler.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_conflict_detected_before_each_create() {
        // 1st listing: running check, 2nd: before db, 3rd: before engine
        let scheduler =
            MockScheduler::new().inject_on_list(3, App::new("/engine", 1).on_machine("master"));
        let h = harness(inventory(), scheduler, host());

        let result = h.env.launch(&environment(ENV)).await;
        assert!(matches!(result, Err(EnvironmentError::Conflict(name)) if name == "engine"));
        assert_eq!(h.scheduler.created().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_dockerfile_aborts_before_submission() {
        let h = harness(inventory(), MockScheduler::new(), MockHost::new());

        let result = h.env.launch(&environment(ENV)).await;
        assert!(matches!(
            result,
            Err(EnvironmentError::Spec(SpecError::MissingDockerfile(ref dir))) if dir == "image/engine"
        ));
        assert_eq!(h.scheduler.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_builds_missing_image() {
        let dir = tempfile::tempdir().unwrap();
        let image_dir = dir.path().join("image/engine");
        std::fs::create_dir_all(&image_dir).unwrap();
        std::fs::write(image_dir.join("Dockerfile"), "FROM ubuntu\n").unwrap();

        let h = harness(inventory(), MockScheduler::new(), MockHost::new());
        let env = EnvironmentFile::from_str_in(ENV, dir.path()).unwrap();

        let outcome = h.env.launch(&env).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(
            h.host.builds(),
            vec![(image_dir, "bdkd/engine".to_string())]
        );
    }

    #[tokio::test]
    async fn test_failed_build_aborts_before_submission() {
        let dir = tempfile::tempdir().unwrap();
        let image_dir = dir.path().join("image/engine");
        std::fs::create_dir_all(&image_dir).unwrap();
        std::fs::write(image_dir.join("Dockerfile"), "FROM ubuntu\n").unwrap();

        let h = harness(inventory(), MockScheduler::new(), MockHost::new().failing_builds());
        let env = EnvironmentFile::from_str_in(ENV, dir.path()).unwrap();

        let result = h.env.launch(&env).await;
        assert!(matches!(result, Err(EnvironmentError::Staging(_))));
        assert_eq!(h.scheduler.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_copy_aborts_before_submission() {
        let h = harness(inventory(), MockScheduler::new(), host().failing_syncs());

        let result = h.env.launch(&environment(ENV)).await;
        assert!(matches!(result, Err(EnvironmentError::Host(_))));
        assert_eq!(h.scheduler.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_launch_waits_for_convergence() {
        let scheduler = MockScheduler::with_convergence(Convergence::AfterPolls(3));
        let h = harness(inventory(), scheduler, host());

        let outcome = h.env.launch(&environment(ENV)).await.unwrap();
        assert!(matches!(outcome, LaunchOutcome::Launched { .. }));
    }

    #[tokio::test]
    async fn test_launch_timeout_is_an_outcome() {
        let scheduler = MockScheduler::with_convergence(Convergence::Never);
        let h = harness(inventory(), scheduler, host());

        let outcome = h.env.launch(&environment(ENV)).await.unwrap();
        assert!(!outcome.is_success());
        match &outcome {
            LaunchOutcome::TimedOut { converged, pending } => {
                assert!(converged.is_empty());
                assert_eq!(pending, &vec!["db".to_string(), "engine".to_string()]);
            }
            other => panic!("expected TimedOut, got {:?}", other),
        }
        // Submitted apps stay, no tunnels opened
        assert_eq!(h.scheduler.app_count(), 2);
        assert!(h.host.local_tunnels().is_empty());
        assert!(!outcome.into_status().success);
    }

    #[tokio::test]
    async fn test_unknown_machine_rejected_without_mutation() {
        let h = harness(MockInventory::workers(2), MockScheduler::new(), host());

        let result = h.env.launch(&environment(ENV)).await;
        assert!(matches!(
            result,
            Err(EnvironmentError::Spec(SpecError::UnknownMachine { .. }))
        ));
        assert_eq!(h.scheduler.mutation_count(), 0);
    }

    #[test]
    fn test_launched_status() {
        let status = LaunchOutcome::Launched {
            components: vec!["db".to_string()],
            message: "Tunnel created on port 8888".to_string(),
        }
        .into_status();
        assert!(status.success);
        assert_eq!(
            status.message,
            "Launched 1 components: db\nTunnel created on port 8888"
        );
    }
}
