use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Offline-first sync for Tally records")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding the local database, queue and sync watermark
    #[arg(long, global = true, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show sync status
    Status,
    /// List changes waiting to be pushed
    Queue {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create or update a record locally and queue it
    Put {
        /// Table name (persons, groups, transactions, expenses, expense_splits, settlements)
        table: String,
        /// Record body as a JSON object
        payload: String,
        /// Existing record ID to update (a new ID is generated when omitted)
        #[arg(long)]
        id: Option<String>,
    },
    /// Delete a record locally and queue the deletion
    Delete {
        /// Table name
        table: String,
        /// Record ID
        id: String,
    },
    /// Push queued changes to the backend
    Push,
    /// Pull remote changes into the local store
    Pull {
        /// Fetch every table instead of changes since the last pull
        #[arg(long)]
        full: bool,
    },
    /// List local records of a table
    Records {
        /// Table name
        table: String,
        /// Include soft-deleted records
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Follow realtime changes until interrupted
    Watch,
    /// Store a session for sync
    Login {
        /// Backend user ID
        #[arg(long)]
        user_id: String,
        /// Access token issued for that user
        #[arg(long)]
        token: String,
    },
    /// Forget the session, queued changes and the sync watermark
    Logout,
}
