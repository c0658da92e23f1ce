//! [`ClusterHost`] backed by the local `ssh` and `rsync` binaries
//!
//! Every remote action runs as a command on the controller. Argument lists
//! are built by the pure `generate_*` functions so they can be tested
//! without a cluster.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::host::{ClusterHost, HostError};

/// Directory on the controller that receives Dockerfile build contexts
pub const REMOTE_BUILD_ROOT: &str = "/tmp/envctl-build";

/// How to reach the controller
#[derive(Debug, Clone, PartialEq)]
pub struct SshTarget {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub key: Option<PathBuf>,
}

impl SshTarget {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            port: 22,
            key: None,
        }
    }

    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

// ============================================================================
// SBIO: Pure argument generation (no I/O)
// ============================================================================

/// Options shared by every `ssh` invocation
pub fn generate_ssh_options(target: &SshTarget) -> Vec<String> {
    let mut args = vec![
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=no".to_string(),
        "-p".to_string(),
        target.port.to_string(),
    ];
    if let Some(key) = &target.key {
        args.push("-i".to_string());
        args.push(key.to_string_lossy().into_owned());
    }
    args
}

/// `ssh` arguments running `command` on the controller
pub fn generate_remote_args(target: &SshTarget, command: &[String]) -> Vec<String> {
    let mut args = generate_ssh_options(target);
    args.push(target.destination());
    args.extend(command.iter().cloned());
    args
}

/// Prints the image id, or nothing when the image is absent
pub fn generate_image_query(image: &str) -> Vec<String> {
    vec![
        "docker".to_string(),
        "images".to_string(),
        "-q".to_string(),
        image.to_string(),
    ]
}

pub fn generate_build_command(context_dir: &str, image: &str) -> Vec<String> {
    vec![
        "docker".to_string(),
        "build".to_string(),
        "-t".to_string(),
        image.to_string(),
        context_dir.to_string(),
    ]
}

/// Remote directory a build context for `image` is uploaded to
pub fn remote_build_dir(image: &str) -> String {
    let safe: String = image
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("{}/{}", REMOTE_BUILD_ROOT, safe)
}

/// What `rsync` takes from a local directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// The directory itself, created inside the destination
    Directory,
    /// Only its contents, so the destination mirrors the directory
    Contents,
}

/// `rsync` arguments copying `local` to `remote` on the controller
pub fn generate_rsync_args(
    target: &SshTarget,
    local: &Path,
    remote: &str,
    mode: SyncMode,
) -> Vec<String> {
    let mut local = local.to_string_lossy().into_owned();
    // rsync copies a directory's contents when the source ends in a slash
    while local.len() > 1 && local.ends_with('/') {
        local.pop();
    }
    if mode == SyncMode::Contents && !local.ends_with('/') {
        local.push('/');
    }

    let shell = std::iter::once("ssh".to_string())
        .chain(generate_ssh_options(target))
        .collect::<Vec<_>>()
        .join(" ");

    vec![
        "-az".to_string(),
        "--delete".to_string(),
        "-e".to_string(),
        shell,
        local,
        format!("{}:{}", target.destination(), remote),
    ]
}

/// Upload a build context and build `image` from it: the `rsync`
/// arguments and the remote `docker build` command
pub fn generate_image_build(
    target: &SshTarget,
    context_dir: &Path,
    image: &str,
) -> (Vec<String>, Vec<String>) {
    let remote_dir = remote_build_dir(image);
    (
        generate_rsync_args(target, context_dir, &remote_dir, SyncMode::Contents),
        generate_build_command(&remote_dir, image),
    )
}

/// Command run on the controller to forward its `controller_port` to a node
pub fn generate_controller_tunnel_command(
    controller_port: u16,
    host: &str,
    remote_port: u16,
) -> Vec<String> {
    vec![
        "ssh".to_string(),
        "-f".to_string(),
        "-N".to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=no".to_string(),
        "-L".to_string(),
        format!("0.0.0.0:{}:{}:{}", controller_port, host, remote_port),
        host.to_string(),
    ]
}

/// `ssh` arguments for a background tunnel from this machine to the controller
pub fn generate_local_tunnel_args(
    target: &SshTarget,
    controller_port: u16,
    local_port: u16,
) -> Vec<String> {
    let mut args = vec![
        "-f".to_string(),
        "-N".to_string(),
        "-L".to_string(),
        format!("{}:localhost:{}", local_port, controller_port),
    ];
    args.extend(generate_ssh_options(target));
    args.push(target.destination());
    args
}

/// Path inside the shared volume, with `remote` relative to its root
pub fn shared_volume_path(shared_volume: &str, remote: &str) -> String {
    let root = shared_volume.trim_end_matches('/');
    let relative = remote.trim_start_matches('/');
    if relative.is_empty() {
        format!("{}/", root)
    } else {
        format!("{}/{}", root, relative)
    }
}

// ============================================================================
// SBIO: I/O implementation
// ============================================================================

pub struct SshHost {
    target: SshTarget,
    shared_volume: String,
    logging_host: Option<String>,
}

impl SshHost {
    pub fn new(target: SshTarget, shared_volume: impl Into<String>) -> Self {
        Self {
            target,
            shared_volume: shared_volume.into(),
            logging_host: None,
        }
    }

    pub fn with_logging_host(mut self, logging_host: Option<String>) -> Self {
        self.logging_host = logging_host;
        self
    }

    async fn run(&self, program: &str, args: &[String]) -> Result<String, HostError> {
        debug!("Running {} {:?}", program, args);

        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|source| HostError::Spawn {
                program: program.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(HostError::CommandFailed {
                command: format!("{} {}", program, args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run_remote(&self, command: &[String]) -> Result<String, HostError> {
        self.run("ssh", &generate_remote_args(&self.target, command))
            .await
    }
}

#[async_trait]
impl ClusterHost for SshHost {
    async fn image_exists(&self, image: &str) -> Result<bool, HostError> {
        let stdout = self.run_remote(&generate_image_query(image)).await?;
        Ok(!stdout.trim().is_empty())
    }

    async fn build_image(&self, context_dir: &Path, image: &str) -> Result<(), HostError> {
        info!("Building image {} on {}", image, self.target.host);
        let (upload, build) = generate_image_build(&self.target, context_dir, image);

        self.run_remote(&[
            "mkdir".to_string(),
            "-p".to_string(),
            REMOTE_BUILD_ROOT.to_string(),
        ])
        .await?;
        self.run("rsync", &upload).await?;
        self.run_remote(&build).await?;
        Ok(())
    }

    async fn sync_put(&self, local_path: &Path, remote_path: &str) -> Result<(), HostError> {
        let destination = shared_volume_path(&self.shared_volume, remote_path);
        info!("Copying {} to {}", local_path.display(), destination);
        self.run(
            "rsync",
            &generate_rsync_args(&self.target, local_path, &destination, SyncMode::Directory),
        )
        .await?;
        Ok(())
    }

    async fn central_logging_host(&self) -> Result<Option<String>, HostError> {
        Ok(self.logging_host.clone())
    }

    async fn tunnel_on_controller(
        &self,
        controller_port: u16,
        host: &str,
        remote_port: u16,
    ) -> Result<(), HostError> {
        self.run_remote(&generate_controller_tunnel_command(
            controller_port,
            host,
            remote_port,
        ))
        .await?;
        Ok(())
    }

    async fn tunnel_to_controller(
        &self,
        controller_port: u16,
        local_port: u16,
    ) -> Result<(), HostError> {
        self.run(
            "ssh",
            &generate_local_tunnel_args(&self.target, controller_port, local_port),
        )
        .await?;
        Ok(())
    }
}
