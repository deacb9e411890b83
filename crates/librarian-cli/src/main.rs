//! Librarian CLI - browse and load a module catalog.
//!
//! Discovers the catalog configured in `.librarian/config.toml` (or the
//! directory given with `--dir`), then lists, shows or loads its entries.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use librarian_config::Config;
use librarian_registry::Library;
use tracing::debug;

mod bridge;
mod commands;
mod theme;

use bridge::Overrides;
use theme::Theme;

/// Librarian - lazily-loaded module catalog
#[derive(Parser)]
#[command(name = "librarian")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Extra configuration file, merged above the workspace config
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Catalog directory to scan (forces local discovery)
    #[arg(short, long, global = true, env = "LIBRARIAN_CLI_DIR")]
    dir: Option<PathBuf>,

    /// Maximum subdirectory depth to scan
    #[arg(long, global = true)]
    depth: Option<u32>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every discovered entry ID
    Available,

    /// Print the config of an entry as JSON
    Show {
        /// Entry ID (e.g. `lib.core.is:0.1.0`)
        id: String,
    },

    /// Load entries and print their exports as JSON
    Load {
        /// Entry IDs
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Print the root namespace
    Tree {
        /// Instantiate every available entry first
        #[arg(short, long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run(Cli::parse()).await {
        eprintln!("{}", Theme::error(&format!("{e:#}")));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let workspace = std::env::current_dir().context("cannot determine working directory")?;
    let resolved = match &cli.config {
        Some(file) => Config::load_with_file(Some(&workspace), file),
        None => Config::load(Some(&workspace)),
    }
    .context("failed to load configuration")?;

    let mut log_config = bridge::to_log_config(&resolved.config);
    if cli.verbose {
        "debug".clone_into(&mut log_config.level);
    }
    if let Err(e) = librarian_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }
    debug!(files = ?resolved.loaded_files, "configuration loaded");

    let overrides = Overrides {
        dir: cli.dir,
        depth: cli.depth,
    };
    let options = bridge::to_library_options(&resolved.config, &workspace, &overrides)?;
    let library = Library::new(options)?;

    match cli.command {
        Commands::Available => commands::available(&library).await,
        Commands::Show { id } => commands::show(&library, &id).await,
        Commands::Load { ids } => commands::load(&library, &ids).await,
        Commands::Tree { all } => commands::tree(&library, all).await,
    }
}
