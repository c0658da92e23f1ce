//! Command implementations for the CLI
//!
//! SBIO pattern: Commands return Results, I/O is handled by caller

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::ContextAddArgs;
use crate::client::{ClientError, MarathonClient, MesosClient};
use crate::cluster::ClusterInfo;
use crate::config::{load_environment_file, tunnel_specs, ConfigError, EnvironmentFile};
use crate::context::{self, Config, Context, ContextError, LOCAL_CONTEXT};
use crate::environment::{
    DestroyOutcome, Environment, EnvironmentError, LaunchOutcome, RunningComponent, ScaleOutcome,
};
use crate::runtime::SshHost;

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error(transparent)]
    Environment(#[from] EnvironmentError),
}

/// Result type for commands
pub type CommandResult<T> = Result<T, CommandError>;

// ============================================================================
// Context Commands (Pure business logic)
// ============================================================================

/// Info about a context for display
#[derive(Debug, Clone)]
pub struct ContextInfo {
    pub name: String,
    pub controller: String,
    pub scheduler_url: String,
    pub is_current: bool,
}

impl ContextInfo {
    fn of(ctx: &Context, current: &str) -> Self {
        Self {
            name: ctx.name.clone(),
            controller: ctx.controller.clone(),
            scheduler_url: ctx.scheduler_url(),
            is_current: ctx.name == current,
        }
    }
}

/// List all contexts, including the built-in `local`
pub fn context_list(config: &Config) -> Vec<ContextInfo> {
    let current = config.current_context.as_deref().unwrap_or(LOCAL_CONTEXT);
    let mut contexts: Vec<_> = config
        .contexts
        .values()
        .map(|ctx| ContextInfo::of(ctx, current))
        .collect();

    if !config.contexts.contains_key(LOCAL_CONTEXT) {
        if let Ok(local) = config.resolve(LOCAL_CONTEXT) {
            contexts.push(ContextInfo::of(&local, current));
        }
    }

    contexts.sort_by(|a, b| a.name.cmp(&b.name));
    contexts
}

/// Get the current context
pub fn context_current(config: &Config) -> CommandResult<ContextInfo> {
    let ctx = config.current()?;
    Ok(ContextInfo::of(&ctx, &ctx.name))
}

/// Switch to a context
pub fn context_use(config: &mut Config, name: &str) -> CommandResult<()> {
    context::set_current_context(config, name)?;
    Ok(())
}

/// Add a new context
pub fn context_add(config: &mut Config, args: &ContextAddArgs) -> CommandResult<()> {
    let mut ctx = Context::new(&args.name, &args.controller);
    if let Some(user) = &args.ssh_user {
        ctx.ssh_user = user.clone();
    }
    if let Some(key) = &args.ssh_key {
        ctx = ctx.with_ssh_key(key);
    }
    if let Some(desc) = &args.description {
        ctx = ctx.with_description(desc);
    }
    ctx.inventory_url = args.inventory_url.clone();
    ctx.scheduler_url = args.scheduler_url.clone();
    ctx.logging_host = args.logging_host.clone();
    context::add_context(config, ctx);
    Ok(())
}

/// Delete a context
pub fn context_delete(config: &mut Config, name: &str) -> CommandResult<bool> {
    let removed = context::remove_context(config, name);
    Ok(removed.is_some())
}

// ============================================================================
// Validate Commands
// ============================================================================

/// Result of validating an environment file
#[derive(Debug)]
pub struct ValidationResult {
    pub valid: bool,
    pub name: Option<String>,
    pub components: Vec<String>,
    pub tunnels: usize,
    pub error: Option<String>,
}

/// Validate an environment file
pub fn validate_environment_file(path: &Path) -> ValidationResult {
    match load_environment_file(path) {
        Ok(env) => summarize(&env),
        Err(e) => ValidationResult {
            valid: false,
            name: None,
            components: vec![],
            tunnels: 0,
            error: Some(e.to_string()),
        },
    }
}

fn summarize(env: &EnvironmentFile) -> ValidationResult {
    ValidationResult {
        valid: true,
        name: env.name.clone(),
        components: env.component_names().iter().map(|s| s.to_string()).collect(),
        tunnels: tunnel_specs(env).map(|t| t.len()).unwrap_or(0),
        error: None,
    }
}

// ============================================================================
// Cluster Commands
// ============================================================================

/// Build an orchestrator for a context
pub fn connect(ctx: &Context) -> CommandResult<Environment> {
    let timeout = ctx.request_timeout();
    let inventory = MesosClient::new(ctx.inventory_url(), timeout)?;
    let scheduler = MarathonClient::new(ctx.scheduler_url(), timeout)?;
    let config = ctx.orchestrator_config();
    let host = SshHost::new(ctx.ssh_target(), config.shared_volume.clone())
        .with_logging_host(ctx.logging_host.clone());

    Ok(
        Environment::new(Arc::new(inventory), Arc::new(scheduler), Arc::new(host))
            .with_config(config),
    )
}

/// Load an environment file and launch it
pub async fn run_environment(env: &Environment, path: &Path) -> CommandResult<LaunchOutcome> {
    let file = load_environment_file(path)?;
    Ok(env.launch(&file).await?)
}

pub async fn destroy_environment(env: &Environment) -> CommandResult<DestroyOutcome> {
    Ok(env.destroy().await?)
}

pub async fn scale_environment(
    env: &Environment,
    machine: &str,
    delta: i64,
    wait: Duration,
) -> CommandResult<ScaleOutcome> {
    Ok(env.scale(machine, delta, wait).await?)
}

/// Snapshot of cluster and running components
#[derive(Debug)]
pub struct StatusReport {
    pub cluster: ClusterInfo,
    pub by_machine: HashMap<String, Vec<RunningComponent>>,
}

pub async fn environment_status(env: &Environment) -> CommandResult<StatusReport> {
    let cluster = env.cluster_info(Duration::ZERO).await?;
    let by_machine = env.running_components_by_machine().await?;
    Ok(StatusReport {
        cluster,
        by_machine,
    })
}
