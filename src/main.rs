//! # autot CLI
//!
//! ## Usage
//!
//! ```bash
//! autot --config ./autot.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `autot build` | Load or build the Source and Target stores |
//! | `autot translate` | Translate every unprocessed input file |
//! | `autot status` | Show store sizes and ledger progress |
//! | `autot search "<query>"` | Query one store directly |
//!
//! Log verbosity is read from `AUTOT_LOG` (e.g. `AUTOT_LOG=debug`);
//! logs go to stderr, command summaries to stdout.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use autot::{config, search, status, translate};

/// autot: retrieval-augmented translation of Lisp source files.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `autot.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "autot", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./autot.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare the Source and Target stores.
    ///
    /// Loads each store file when it matches the configured embedding
    /// model, and otherwise chunks and embeds the seed documentation and
    /// saves the result.
    Build {
        /// Rebuild from documentation even if a usable store file exists.
        #[arg(long)]
        force: bool,
    },

    /// Translate input files, skipping those already in the ledger.
    Translate {
        /// Directory to search for inputs (overrides `[input].dir`).
        #[arg(long)]
        input_dir: Option<PathBuf>,

        /// Stream generation output to stdout as it arrives.
        #[arg(long)]
        verbose: bool,
    },

    /// Show store record counts and ledger size.
    Status,

    /// Nearest-neighbour search against one store.
    Search {
        /// Text to embed and look up.
        query: String,

        /// Store to search: `source`, `target`, or `project`.
        #[arg(long, default_value = "source")]
        store: String,

        /// Number of results (defaults to the store's configured k).
        #[arg(long)]
        k: Option<i64>,
    },
}

fn init_logging() {
    let default_level = "info";
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("AUTOT_LOG")
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Build { force } => {
            translate::run_build(&cfg, force).await?;
        }
        Commands::Translate { input_dir, verbose } => {
            translate::run_translate(&cfg, input_dir, verbose).await?;
        }
        Commands::Status => {
            status::run_status(&cfg)?;
        }
        Commands::Search { query, store, k } => {
            search::run_search(&cfg, &query, &store, k).await?;
        }
    }

    Ok(())
}
