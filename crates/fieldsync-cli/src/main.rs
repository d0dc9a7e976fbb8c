//! fieldsync CLI - replicate a field device with the central store
//!
//! Runs sync cycles against the local store and reports what moved.

mod central;
mod cli;
mod commands;
mod config_file;
mod error;
#[cfg(test)]
mod tests;

use clap::Parser;

use crate::cli::{AdminCommands, Cli, Commands};
use crate::commands::admin::{run_mark_synced, run_reset};
use crate::commands::common::CliContext;
use crate::commands::completions::run_completions;
use crate::commands::device::run_device;
use crate::commands::status::run_status;
use crate::commands::sync::{run_pull, run_push, run_sync};
use crate::config_file::{resolve_db_path, resolve_sync_config, ConfigOverrides};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("fieldsync=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let lookup = |key: &str| std::env::var(key).ok();
    let overrides = ConfigOverrides {
        central_url: cli.central_url,
        conflict_policy: cli.conflict_policy,
    };
    let context = CliContext {
        db_path: resolve_db_path(cli.db_path, lookup),
        config: resolve_sync_config(cli.config.as_deref(), &overrides, lookup)?,
    };

    match cli.command {
        Commands::Sync { json } => run_sync(&context, json).await?,
        Commands::Pull { json } => run_pull(&context, json).await?,
        Commands::Push { json } => run_push(&context, json).await?,
        Commands::Status { json } => run_status(&context, json).await?,
        Commands::Device { json } => run_device(&context, json).await?,
        Commands::Admin { command } => match command {
            AdminCommands::MarkSynced { json } => run_mark_synced(&context, json).await?,
            AdminCommands::Reset { json } => run_reset(&context, json).await?,
        },
        Commands::Completions { .. } => {}
    }

    Ok(())
}
