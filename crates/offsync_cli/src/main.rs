//! offsync CLI
//!
//! Operator tools for inspecting and intervening in offsync state.
//!
//! # Commands
//!
//! - `status` - Per-collection sync status indicators
//! - `pending` - List outstanding queue items
//! - `retries` - List retry ledger records
//! - `conflicts` - List version conflicts
//! - `connections` - List client sessions
//! - `rules` - Show the priority table
//! - `enqueue` - Queue a mutation by hand
//! - `resolve` - Resolve an open conflict
//! - `retry-now` - Cancel an operation's backoff wait
//! - `abandon` - Drop an exhausted operation
//! - `resubmit` - Give an exhausted operation a fresh retry budget

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// offsync operator command-line tools.
#[derive(Parser)]
#[command(name = "offsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the sync store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Per-collection sync status indicators
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List outstanding queue items
    Pending {
        /// Restrict to one collection
        #[arg(short, long)]
        collection: Option<String>,

        /// Restrict to one status (pending, synced, failed, conflict, abandoned)
        #[arg(short, long)]
        status: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List retry ledger records
    Retries {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List version conflicts
    Conflicts {
        /// Include resolved conflicts
        #[arg(short, long)]
        all: bool,

        /// Show only resolved conflicts
        #[arg(short, long)]
        resolved: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List client sessions
    Connections {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the priority table
    Rules {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Queue a mutation by hand
    Enqueue {
        /// Collection name
        #[arg(short, long)]
        collection: String,

        /// Record identifier
        #[arg(short, long)]
        record: String,

        /// Mutation action (create, update, delete)
        #[arg(short, long, default_value = "update")]
        action: String,

        /// Payload string (stored as bytes)
        #[arg(long, default_value = "")]
        payload: String,

        /// Base version observed locally
        #[arg(short, long, default_value = "0")]
        base_version: u64,
    },

    /// Resolve an open conflict
    Resolve {
        /// Conflict id
        id: String,

        /// Strategy (local-wins, remote-wins, manual)
        #[arg(short, long)]
        strategy: String,

        /// Who resolved it
        #[arg(long, default_value = "operator")]
        resolved_by: String,

        /// Merged payload for manual resolution
        #[arg(short, long)]
        merged: Option<String>,
    },

    /// Cancel an operation's backoff wait
    RetryNow {
        /// Operation id
        id: String,
    },

    /// Drop an exhausted operation
    Abandon {
        /// Operation id
        id: String,
    },

    /// Give an exhausted operation a fresh retry budget
    Resubmit {
        /// Operation id
        id: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let path = cli.path.ok_or("store path required (--path)")?;

    match cli.command {
        Commands::Status { format } => commands::status::run(&path, &format)?,
        Commands::Pending {
            collection,
            status,
            format,
        } => commands::pending::run(&path, collection, status, &format)?,
        Commands::Retries { format } => commands::retries::run(&path, &format)?,
        Commands::Conflicts {
            all,
            resolved,
            format,
        } => commands::conflicts::run(&path, all, resolved, &format)?,
        Commands::Connections { format } => commands::connections::run(&path, &format)?,
        Commands::Rules { format } => commands::rules::run(&path, &format)?,
        Commands::Enqueue {
            collection,
            record,
            action,
            payload,
            base_version,
        } => commands::enqueue::run(&path, &collection, &record, &action, &payload, base_version)?,
        Commands::Resolve {
            id,
            strategy,
            resolved_by,
            merged,
        } => commands::resolve::run(&path, &id, &strategy, &resolved_by, merged)?,
        Commands::RetryNow { id } => commands::operations::retry_now(&path, &id)?,
        Commands::Abandon { id } => commands::operations::abandon(&path, &id)?,
        Commands::Resubmit { id } => commands::operations::resubmit(&path, &id)?,
    }

    Ok(())
}
