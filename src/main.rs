//! # Catalog Harvester CLI (`harvest`)
//!
//! ## Usage
//!
//! ```bash
//! harvest --config ./config/harvest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `harvest init` | Create the SQLite database and run schema migrations |
//! | `harvest sources` | List configured sources |
//! | `harvest run` | Harvest sources, rebuild the index and write the report |
//! | `harvest indices` | List index generations under the configured alias |
//! | `harvest retire` | Delete aged index generations the alias does not use |
//!
//! ## Exit codes
//!
//! `harvest run` exits 0 when every source was harvested cleanly, 2 when the
//! run completed but some sources or documents failed, and 1 on a fatal
//! error (configuration, or an index lifecycle failure).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use catalog_harvester::{config, indices, migrate, pipeline, sources, telemetry};

/// Catalog Harvester CLI.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/harvest.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "harvest",
    about = "Harvest code.json catalogs into an aliased search index",
    version,
    long_about = "Catalog Harvester fetches code.json software inventories from configured \
    sources, upgrades legacy catalogs, validates them, scores compliance, and rebuilds a \
    search index behind a stable alias without read downtime."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/harvest.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. Running it
    /// multiple times is safe.
    Init,

    /// List configured sources.
    Sources,

    /// Harvest sources and rebuild the aliased index.
    ///
    /// Writes `report.json` (always) and `releases.json` (when the run
    /// completes) into the output directory.
    Run {
        /// Directory for the report and merged releases. Overrides `[report].output_dir`.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Only harvest these sources (by acronym). Repeatable.
        #[arg(long = "source")]
        sources: Vec<String>,
    },

    /// List index generations under the configured alias.
    Indices,

    /// Delete aged index generations that the alias is not bound to.
    Retire {
        /// Retention window in days. Overrides `[index].retention_days`.
        #[arg(long)]
        days: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let cfg = config::load_config(&cli.config)?;
    telemetry::init(&cfg.logging)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Run {
            output_dir,
            sources,
        } => {
            let selected = cfg.select_sources(&sources)?;
            let output_dir = output_dir.unwrap_or_else(|| cfg.report.output_dir.clone());
            let outcome = pipeline::run_harvest(&cfg, &selected, &output_dir).await?;

            let summary = &outcome.summary;
            println!("harvest {}", cfg.index.alias);
            println!("  sources: {}", summary.sources_total);
            println!("  harvested: {}", summary.sources_harvested);
            println!("  invalid: {}", summary.sources_invalid);
            println!("  failed: {}", summary.sources_failed);
            println!("  releases indexed: {}", summary.releases_indexed);
            println!("  releases rejected: {}", summary.releases_rejected);
            println!("  write failures: {}", summary.write_failures);
            match &outcome.result {
                Ok(finalized) => {
                    println!("  index: {}", finalized.index);
                    println!("  retired: {}", finalized.retired.len());
                    if let Some(e) = &finalized.retirement_error {
                        println!("  retirement error: {}", e);
                    }
                    println!("  report: {}", output_dir.display());
                    println!("{}", if outcome.is_degraded() { "degraded" } else { "ok" });
                }
                Err(e) => {
                    println!("  report: {}", output_dir.display());
                    eprintln!("Error: {}", e);
                }
            }
            return Ok(outcome.exit_code());
        }
        Commands::Indices => {
            indices::list_indices(&cfg).await?;
        }
        Commands::Retire { days } => {
            indices::run_retire(&cfg, days).await?;
        }
    }

    Ok(0)
}
