//! fieldsync CLI - operator tool for the offline sync queue
//!
//! Enqueue operations, inspect what is waiting, retry or discard stuck items,
//! and drain the queue against the CRM API from a terminal.

mod cli;
mod commands;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::capture::run_capture;
use crate::commands::common::{load_config, resolve_config_path, resolve_db_path};
use crate::commands::enqueue::{run_enqueue, run_request};
use crate::commands::queue::{run_discard, run_queue, run_retry};
use crate::commands::sync::{run_conflicts, run_status, run_sync};
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

    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(
        "fieldsync=info"
            .parse()
            .map_err(|error| CliError::Config(format!("invalid log directive: {error}")))?,
    );
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    let config = load_config(&resolve_config_path(cli.config))?;

    match cli.command {
        Commands::Enqueue {
            kind,
            entity,
            data,
            priority,
        } => run_enqueue(&kind, &entity, data.as_deref(), priority, &db_path).await?,
        Commands::Request {
            method,
            url,
            data,
            priority,
        } => run_request(&method, &url, data.as_deref(), priority, &db_path).await?,
        Commands::Queue { dead, json } => {
            run_queue(dead, json, config.max_retries, &db_path).await?;
        }
        Commands::Retry { id, all } => {
            run_retry(id.as_deref(), all, config.max_retries, &db_path).await?;
        }
        Commands::Discard { id } => run_discard(&id, &db_path).await?,
        Commands::Capture {
            kind,
            entity,
            parent_id,
            file,
            mime_type,
        } => {
            run_capture(
                kind,
                &entity,
                &parent_id,
                &file,
                mime_type.as_deref(),
                &db_path,
            )
            .await?;
        }
        Commands::Sync { media, json } => run_sync(media, json, &config, &db_path).await?,
        Commands::Status { json } => run_status(json, &config, &db_path).await?,
        Commands::Conflicts { limit, json } => run_conflicts(limit, json, &db_path).await?,
    }

    Ok(())
}
