//! # Vault Index CLI (`vidx`)
//!
//! ## Usage
//!
//! ```bash
//! vidx --config ./config/vidx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vidx init` | Create the SQLite database and schema |
//! | `vidx sync` | Reconcile the remote source into the local store |
//! | `vidx search "<query>"` | Semantic or substring search |
//! | `vidx get <id>` | Print one document |
//! | `vidx list` | Page through documents |
//! | `vidx stats` | Store and index counts |
//! | `vidx serve` | Start the HTTP API |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use vault_index::app::AppContext;
use vault_index::commands::{self, SearchMode};
use vault_index::config;
use vault_index::logging::init_tracing;
use vault_index::progress::ProgressMode;
use vault_index::server;

/// Vault Index: keeps a local, searchable copy of a remote note collection.
#[derive(Parser)]
#[command(name = "vidx", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/vidx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Run one sync pass against the configured remote.
    Sync {
        /// Progress output on stderr. Defaults to `human` on a terminal, else `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Search synchronized documents.
    Search {
        query: String,

        #[arg(long, value_enum, default_value = "semantic")]
        mode: SearchMode,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print a document by id.
    Get { id: String },

    /// List documents, most recently modified first.
    List {
        #[arg(long, default_value_t = 0)]
        skip: i64,

        #[arg(long, default_value_t = 100)]
        limit: i64,
    },

    /// Show store and index statistics.
    Stats,

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing("warn,vault_index=info");

    let cfg = config::load_config(&cli.config)?;

    if let Commands::Init = cli.command {
        return commands::run_init(&cfg).await;
    }

    let ctx = AppContext::init(cfg).await?;

    match cli.command {
        Commands::Init => {
            // Handled above (before building the context)
            unreachable!()
        }
        Commands::Sync { progress } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            commands::run_sync(&ctx, mode).await?;
        }
        Commands::Search { query, mode, limit } => {
            commands::run_search(&ctx, &query, mode, limit).await?;
        }
        Commands::Get { id } => commands::run_get(&ctx, &id).await?,
        Commands::List { skip, limit } => commands::run_list(&ctx, skip, limit).await?,
        Commands::Stats => commands::run_stats(&ctx).await?,
        Commands::Serve => server::run_server(ctx).await?,
    }

    Ok(())
}
