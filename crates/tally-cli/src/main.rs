//! Tally CLI - offline-first sync from the command line
//!
//! Local edits are queued durably and pushed when the backend is reachable.

mod cli;
mod commands;
mod error;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::common::resolve_data_dir;
use crate::commands::delete::run_delete;
use crate::commands::pull::run_pull;
use crate::commands::push::run_push;
use crate::commands::put::run_put;
use crate::commands::queue::run_queue;
use crate::commands::records::run_records;
use crate::commands::session::{run_login, run_logout};
use crate::commands::status::run_status;
use crate::commands::watch::run_watch;
use crate::error::CliError;

const DEFAULT_LOG_DIRECTIVE: &str = "tally=info";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = DEFAULT_LOG_DIRECTIVE.parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let data_dir = resolve_data_dir(cli.data_dir)?;

    match cli.command {
        Commands::Status => run_status(&data_dir).await?,
        Commands::Queue { json } => run_queue(json, &data_dir).await?,
        Commands::Put { table, payload, id } => {
            run_put(&table, &payload, id.as_deref(), &data_dir).await?;
        }
        Commands::Delete { table, id } => run_delete(&table, &id, &data_dir).await?,
        Commands::Push => run_push(&data_dir).await?,
        Commands::Pull { full } => run_pull(full, &data_dir).await?,
        Commands::Records { table, all, json } => {
            run_records(&table, all, json, &data_dir).await?;
        }
        Commands::Watch => run_watch(&data_dir).await?,
        Commands::Login { user_id, token } => run_login(&user_id, &token, &data_dir)?,
        Commands::Logout => run_logout(&data_dir).await?,
    }

    Ok(())
}
