//! Listing tracker CLI
//!
//! Local execution entry point. For AWS Lambda, use `tracker-lambda`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracker::{
    config,
    error::{AppError, Result},
    models::{Config, SourceKey},
    pipeline,
    storage::{LocalStorage, SnapshotStore},
};

/// Tracker - listing change detection
#[derive(Parser, Debug)]
#[command(
    name = "tracker",
    version,
    about = "Reports what changed in company listings between runs"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "tracker.toml")]
    config: PathBuf,

    /// Snapshot directory (overrides `storage.root`)
    #[arg(short, long)]
    storage_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one cycle from a JSON array of raw records
    Run {
        #[arg(long)]
        source: String,

        #[arg(long)]
        category: String,

        /// JSON file holding the observed records
        #[arg(long)]
        input: PathBuf,
    },

    /// Run every cycle listed in a manifest
    Batch {
        /// JSON file of the form {"cycles": [{"source", "category", "records"}]}
        #[arg(long)]
        manifest: PathBuf,

        /// Only run these categories
        #[arg(long, num_args = 1..)]
        only: Vec<String>,
    },

    /// Print the stored snapshot for a key
    Show {
        #[arg(long)]
        source: String,

        #[arg(long)]
        category: String,
    },

    /// Show stored snapshots and known categories
    Info,

    /// Validate configuration file
    Validate,
}

/// Initialize logging with the given default filter.
fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Print a value as pretty JSON on stdout.
fn emit<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn storage_root(cli: &Cli, config: &Config) -> PathBuf {
    match &cli.storage_dir {
        Some(dir) => dir.clone(),
        None => config.storage_root(cli.config.parent().unwrap_or(Path::new("."))),
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        Config::load(&cli.config)
            .map(|c| c.logging.level)
            .unwrap_or_else(|_| "info".to_string())
    };
    init_logging(&level);

    let config = config::load_config(&cli.config)?;
    let root = storage_root(&cli, &config);
    log::debug!("Snapshot root: {}", root.display());

    let storage = Arc::new(LocalStorage::new(&root));
    let coordinator = config::build_coordinator(&config, storage.clone());

    match cli.command {
        Command::Run {
            source,
            category,
            input,
        } => {
            let key = SourceKey::new(source, category)?;
            let records = config::load_records(&input)?;
            let report = coordinator.run_cycle(&key, &records).await?;
            emit(&report)?;
        }

        Command::Batch { manifest, only } => {
            let mut manifest = config::load_manifest(&manifest)?;
            manifest.retain_categories(&only);
            log::info!("Running {} cycles", manifest.cycles.len());

            let report =
                pipeline::run_batch(&coordinator, manifest.cycles, config.runner.max_concurrent)
                    .await;
            emit(&report)?;
        }

        Command::Show { source, category } => {
            let key = SourceKey::new(source, category)?;
            match storage.load(&key).await? {
                Some(collection) => emit(&collection)?,
                None => {
                    return Err(AppError::storage(
                        key.to_string(),
                        "no snapshot stored for this key",
                    ));
                }
            }
        }

        Command::Info => {
            log::info!("Storage directory: {}", storage.root().display());
            log::info!(
                "Categories: {}",
                coordinator.policies().categories().join(", ")
            );

            let keys = storage.keys().await?;
            if keys.is_empty() {
                log::info!("No snapshot found yet.");
            }
            for key in keys {
                match storage.load(&key).await? {
                    Some(collection) => log::info!("{}: {} entities", key, collection.len()),
                    None => log::warn!("{}: unreadable snapshot", key),
                }
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            config.validate()?;
            log::info!(
                "✓ Config OK ({} categories, guard {})",
                coordinator.policies().categories().len(),
                if config.guard.enabled {
                    "enabled"
                } else {
                    "disabled"
                }
            );
        }
    }

    Ok(())
}
