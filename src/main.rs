//! # Habit Context CLI (`habit`)
//!
//! Stages files, feeds the persistent context store, queries it, and
//! serves the HTTP API the host chat runtime calls.
//!
//! ## Usage
//!
//! ```bash
//! habit --config ./config/habit.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `habit serve` | Start the HTTP API |
//! | `habit stage <files>` | Copy files into a store's managed directory |
//! | `habit unstage <files>` | Delete staged copies from a managed directory |
//! | `habit ingest [files]` | Add files (or all staged session files) to persistent context |
//! | `habit search "<query>"` | Query persistent context |
//! | `habit status` | Show store and collection status |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use habit_context::config;
use habit_context::manager::{ContextManager, StoreKind};
use habit_context::server;

/// Habit Context: ephemeral and persistent retrieval context for a chat model.
#[derive(Parser)]
#[command(name = "habit", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/habit.toml")]
    config: PathBuf,

    /// Default log level when `RUST_LOG` is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Copy files into a store's managed directory without ingesting them.
    Stage {
        files: Vec<PathBuf>,
        #[arg(long, value_enum, default_value = "ephemeral")]
        store: StoreKind,
    },

    /// Delete staged copies from a store's managed directory.
    ///
    /// Only files directly inside the managed directory are deleted.
    Unstage {
        files: Vec<PathBuf>,
        #[arg(long, value_enum, default_value = "ephemeral")]
        store: StoreKind,
    },

    /// Add files to persistent context.
    ///
    /// With no files, every file staged in the ephemeral directory is used.
    Ingest { files: Vec<PathBuf> },

    /// Query persistent context.
    Search {
        query: String,
        /// Number of results (defaults to `retrieval.persistent_chunks`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Show store and collection status.
    Status,
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("habit_context={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_paths(label: &str, paths: &[PathBuf]) {
    println!("{} {} file(s)", label, paths.len());
    for path in paths {
        println!("  {}", path.display());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let cfg = config::load_config(&cli.config)?;
    let manager = Arc::new(ContextManager::from_config(cfg).await?);

    match cli.command {
        Commands::Serve => {
            server::run_server(manager).await?;
        }
        Commands::Stage { files, store } => {
            let staged = manager.stage(store, &files)?;
            print_paths("Staged", &staged);
        }
        Commands::Unstage { files, store } => {
            let deleted = manager.unstage(store, &files)?;
            print_paths("Deleted", &deleted);
        }
        Commands::Ingest { files } => {
            let report = if files.is_empty() {
                manager.memorize().await?
            } else {
                manager.memorize_files(&files).await?
            };
            println!(
                "Ingested {} chunk(s) from {} file(s)",
                report.chunks,
                report.files.len()
            );
        }
        Commands::Search { query, k } => {
            let results = manager.search(StoreKind::Persistent, &query, k).await?;
            if results.is_empty() {
                println!("No results.");
            }
            for (rank, r) in results.iter().enumerate() {
                let snippet: String = r.chunk.text.chars().take(160).collect();
                println!(
                    "{}. [{:.3}] {} #{}",
                    rank + 1,
                    r.score,
                    r.chunk.source,
                    r.chunk.chunk_index
                );
                println!("   {}", snippet.replace('\n', " "));
            }
        }
        Commands::Status => {
            let status = manager.status().await?;
            println!(
                "ephemeral: {} ({} chunk(s) in memory, dir {})",
                if status.ephemeral.active { "active" } else { "uninitialized" },
                status.ephemeral.chunks,
                status.ephemeral.dir.display()
            );
            match status.persistent {
                Some(p) => println!(
                    "persistent: {} (collection {}, {} vector(s), dir {})",
                    if p.active { "active" } else { "uninitialized" },
                    p.collection,
                    p.vectors,
                    p.dir.display()
                ),
                None => println!("persistent: not configured"),
            }
        }
    }

    Ok(())
}
