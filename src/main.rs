//! # sneakr CLI
//!
//! ```bash
//! sneakr --config ./config/sneakr.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sneakr init` | Create the SQLite database and schema |
//! | `sneakr sync` | Run ingestion now, until the catalog is exhausted |
//! | `sneakr search "<words>"` | Keyword search over stored sneakers |
//! | `sneakr list` | Page through stored sneakers |
//! | `sneakr get <id>` | Show one stored sneaker |
//! | `sneakr stats` | Counts and recent ingestion runs |
//! | `sneakr completions <shell>` | Print shell completions |
//!
//! `sync` exits 0 whenever the run reaches its end, even if pages or records
//! were skipped. It exits non-zero only when the store cannot be opened or the
//! upstream cannot be reached at all.

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use sneakr::{config, get, ingest, logging, migrate, search, stats};

/// sneakr: ingest a paginated sneaker catalog into SQLite.
#[derive(Parser)]
#[command(name = "sneakr", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/sneakr.toml")]
    config: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Ingest the upstream catalog page by page.
    ///
    /// Stops at the first empty page, at the page ceiling, or (under the
    /// default `stop` policy) at the first page that fails to fetch.
    Sync {
        /// Records per page (1-100). Overrides `upstream.page_size`.
        #[arg(long)]
        page_size: Option<u32>,

        /// Never fetch past this page. Overrides `upstream.page_ceiling`.
        #[arg(long)]
        page_ceiling: Option<u32>,

        /// Fetch and normalize without writing to the database.
        #[arg(long)]
        dry_run: bool,
    },

    /// Search stored sneakers; every word must match brand, colorway or gender.
    Search {
        query: String,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// List stored sneakers, 25 per page.
    List {
        #[arg(long, default_value_t = 1)]
        page: i64,
    },

    /// Show one stored sneaker by id.
    Get { id: i64 },

    /// Show row counts and recent ingestion runs.
    Stats,

    /// Print shell completions to stdout.
    Completions { shell: clap_complete::Shell },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "sneakr", &mut std::io::stdout());
        return Ok(());
    }

    logging::init_tracing(cli.verbose)?;
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sync {
            page_size,
            page_ceiling,
            dry_run,
        } => {
            let cfg = cfg.with_overrides(page_size, page_ceiling)?;

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupt received; finishing current page");
                    on_signal.cancel();
                }
            });

            ingest::run_sync(&cfg, dry_run, cancel).await?;
        }
        Commands::Search { query, limit } => {
            search::run_search(&cfg, &query, limit).await?;
        }
        Commands::List { page } => {
            search::run_list(&cfg, page).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, id).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Completions { .. } => unreachable!(),
    }

    Ok(())
}
