use std::process;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use envctl::cli::{
    connect, context_add, context_current, context_delete, context_list, context_use,
    destroy_environment, environment_status, format_context_list, format_current_context,
    format_operation_status, format_status, format_validation_result, run_environment,
    scale_environment, validate_environment_file, Cli, Commands, ContextAction,
};
use envctl::environment::OperationStatus;
use envctl::context::{default_config_path, load_config_from, save_config_to};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    // Load .env file if specified
    if let Some(ref env_file) = cli.env_file {
        if let Err(e) = dotenvy::from_path(env_file) {
            error!("Failed to load env file {}: {}", env_file.display(), e);
            process::exit(1);
        }
    }

    match execute(cli).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

/// Run the selected command, returning whether it succeeded
async fn execute(cli: Cli) -> Result<bool> {
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = load_config_from(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let status = match cli.command {
        Commands::Validate(args) => {
            let result = validate_environment_file(&args.file);
            print!(
                "{}",
                format_validation_result(&result, &args.file.display().to_string())
            );
            return Ok(result.valid);
        }
        Commands::Context(args) => {
            match args.action {
                ContextAction::List => print!("{}", format_context_list(&context_list(&config))),
                ContextAction::Current => {
                    print!("{}", format_current_context(&context_current(&config)?))
                }
                ContextAction::Use { name } => {
                    context_use(&mut config, &name)?;
                    save_config_to(&config, &config_path)?;
                    println!("Switched to context \"{}\"", name);
                }
                ContextAction::Add(add) => {
                    context_add(&mut config, &add)?;
                    save_config_to(&config, &config_path)?;
                    println!("Context \"{}\" added", add.name);
                }
                ContextAction::Delete { name } => {
                    if context_delete(&mut config, &name)? {
                        save_config_to(&config, &config_path)?;
                        println!("Context \"{}\" deleted", name);
                    } else {
                        println!("Context \"{}\" not found", name);
                        return Ok(false);
                    }
                }
            }
            return Ok(true);
        }
        Commands::Run(args) => {
            let env = connect(&resolve(&config, cli.context.as_deref())?)?;
            run_environment(&env, &args.file).await?.into_status()
        }
        Commands::Destroy => {
            let env = connect(&resolve(&config, cli.context.as_deref())?)?;
            destroy_environment(&env).await?.into_status()
        }
        Commands::Scale(args) => {
            let env = connect(&resolve(&config, cli.context.as_deref())?)?;
            scale_environment(&env, &args.machine, args.delta, Duration::from_secs(args.wait))
                .await?
                .into_status()
        }
        Commands::Status => {
            let env = connect(&resolve(&config, cli.context.as_deref())?)?;
            let report = environment_status(&env).await?;
            print!("{}", format_status(&report));
            OperationStatus::success("")
        }
    };

    if !status.message.is_empty() {
        print!("{}", format_operation_status(&status));
    }
    Ok(status.success)
}

fn resolve(
    config: &envctl::context::Config,
    name: Option<&str>,
) -> Result<envctl::context::Context> {
    Ok(match name {
        Some(name) => config.resolve(name)?,
        None => config.current()?,
    })
}
