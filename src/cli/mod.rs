//! CLI module for envctl
//!
//! Subcommands:
//! - `envctl run` - Launch an environment file on the current context
//! - `envctl destroy` - Remove every running component
//! - `envctl scale` - Adjust a machine class's component after nodes changed
//! - `envctl status` - Show machine classes and running components
//! - `envctl validate` - Check an environment file without touching the cluster
//! - `envctl context` - Manage contexts

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod display;

pub use commands::*;
pub use display::*;

#[derive(Parser, Debug)]
#[command(name = "envctl")]
#[command(about = "Launch and manage container environments on Mesos/Marathon clusters")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file (default: ~/.envctl/config)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Use this context instead of the current one
    #[arg(long, global = true)]
    pub context: Option<String>,

    /// Path to a .env file loaded before anything else
    #[arg(long, value_name = "FILE", global = true)]
    pub env_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch an environment
    Run(RunArgs),

    /// Destroy every running component
    Destroy,

    /// Scale the component on a machine class after its node count changed
    Scale(ScaleArgs),

    /// Show cluster and environment status
    Status,

    /// Validate an environment file
    Validate(ValidateArgs),

    /// Manage cluster contexts
    Context(ContextArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the environment file (YAML or JSON)
    pub file: PathBuf,
}

/// Arguments for the scale command
#[derive(Parser, Debug)]
pub struct ScaleArgs {
    /// Machine class whose node count changed
    pub machine: String,

    /// Number of nodes added (positive) or removed (negative)
    #[arg(allow_hyphen_values = true)]
    pub delta: i64,

    /// Seconds to wait before reading the inventory
    #[arg(long, default_value = "0")]
    pub wait: u64,
}

/// Arguments for the validate command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to the environment file
    pub file: PathBuf,
}

/// Arguments for the context command
#[derive(Parser, Debug)]
pub struct ContextArgs {
    #[command(subcommand)]
    pub action: ContextAction,
}

#[derive(Subcommand, Debug)]
pub enum ContextAction {
    /// List all contexts
    List,

    /// Show current context
    Current,

    /// Switch to a context
    Use {
        /// Context name
        name: String,
    },

    /// Add a new context
    Add(ContextAddArgs),

    /// Delete a context
    Delete {
        /// Context name
        name: String,
    },
}

/// Arguments for `context add`
#[derive(Parser, Debug)]
pub struct ContextAddArgs {
    /// Context name
    pub name: String,

    /// Controller hostname or IP
    #[arg(long)]
    pub controller: String,

    /// SSH user on the controller
    #[arg(long)]
    pub ssh_user: Option<String>,

    /// SSH private key for the controller
    #[arg(long)]
    pub ssh_key: Option<String>,

    /// Inventory URL (default: http://<controller>:5050)
    #[arg(long)]
    pub inventory_url: Option<String>,

    /// Scheduler URL (default: http://<controller>:8080)
    #[arg(long)]
    pub scheduler_url: Option<String>,

    /// Central logging host passed to containers
    #[arg(long)]
    pub logging_host: Option<String>,

    #[arg(long)]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from(["envctl", "run", "env.yml"]);
        match cli.command {
            Commands::Run(args) => assert_eq!(args.file, PathBuf::from("env.yml")),
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_parse_scale_negative_delta() {
        let cli = Cli::parse_from(["envctl", "scale", "worker", "-2", "--wait", "5"]);
        match cli.command {
            Commands::Scale(args) => {
                assert_eq!(args.machine, "worker");
                assert_eq!(args.delta, -2);
                assert_eq!(args.wait, 5);
            }
            _ => panic!("Expected Scale command"),
        }
    }

    #[test]
    fn test_parse_destroy() {
        let cli = Cli::parse_from(["envctl", "destroy"]);
        assert!(matches!(cli.command, Commands::Destroy));
    }

    #[test]
    fn test_parse_context_use() {
        let cli = Cli::parse_from(["envctl", "context", "use", "my-cluster"]);
        match cli.command {
            Commands::Context(args) => match args.action {
                ContextAction::Use { name } => {
                    assert_eq!(name, "my-cluster");
                }
                _ => panic!("Expected Use action"),
            },
            _ => panic!("Expected Context command"),
        }
    }

    #[test]
    fn test_parse_context_add() {
        let cli = Cli::parse_from([
            "envctl",
            "context",
            "add",
            "lab",
            "--controller",
            "10.0.0.5",
            "--ssh-key",
            "~/.ssh/lab.pem",
        ]);
        match cli.command {
            Commands::Context(args) => match args.action {
                ContextAction::Add(add) => {
                    assert_eq!(add.name, "lab");
                    assert_eq!(add.controller, "10.0.0.5");
                    assert_eq!(add.ssh_key.as_deref(), Some("~/.ssh/lab.pem"));
                }
                _ => panic!("Expected Add action"),
            },
            _ => panic!("Expected Context command"),
        }
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["envctl", "-vvv", "status", "--context", "lab"]);
        assert_eq!(cli.verbose, 3);
        assert_eq!(cli.context.as_deref(), Some("lab"));
    }
}
