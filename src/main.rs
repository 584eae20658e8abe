//! Command-line interface for rideshare-geo
//!
//! # Usage Examples
//!
//! ```bash
//! # Generate the dataset for the local four-node cluster
//! rideshare-geo generate --output generated_data
//!
//! # Generate in-process and load, with 10% cross-border rides
//! rideshare-geo load --border-probability 0.1
//!
//! # Reload a spooled dataset from scratch
//! rideshare-geo load --input generated_data --clear
//!
//! # Remove every generated row
//! rideshare-geo load --delete-only
//!
//! # Cloud cluster: endpoints come from <REGION>_HOST / <REGION>_PORT
//! ENVIRONMENT=cloud US_EAST_HOST=... US_EAST_PORT=26257 rideshare-geo load
//! ```

use anyhow::Context;
use clap::Parser;
use geo_core::RegionCatalog;
use rideshare_geo::cli::{load_mode, Cli, Commands};
use rideshare_geo::config::{build_catalog, DatabaseArgs};
use rideshare_geo::coordinator::{dataset_table, memory_sinks, postgres_sinks, RunCoordinator};
use rideshare_geo::spool::{read_spool, write_spool};
use rideshare_load::{LoadMode, PipelineConfig, RegionSink};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}

fn catalog_for(database: &DatabaseArgs) -> anyhow::Result<RegionCatalog> {
    let environment = database.environment();
    info!("Environment: {}", environment);
    build_catalog(database.regions_file.as_deref(), environment, |key| {
        std::env::var(key).ok()
    })
    .context("Failed to build region catalog")
}

fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received interrupt signal (Ctrl+C), finishing in-flight batches");
            token.cancel();
        }
    });
    cancel
}

fn sinks_for(
    catalog: &RegionCatalog,
    database: &DatabaseArgs,
    pool_size: usize,
    dry_run: bool,
) -> Vec<Arc<dyn RegionSink>> {
    if dry_run {
        info!("Dry run: writing to an in-memory database");
        memory_sinks(catalog).1
    } else {
        postgres_sinks(catalog, database, pool_size)
    }
}

async fn run() -> anyhow::Result<i32> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            generation,
            output,
            database,
        } => {
            let catalog = catalog_for(&database)?;
            let config = generation.to_generator_config(database.environment())?;
            let coordinator = RunCoordinator::new(
                catalog,
                PipelineConfig::default(),
                CancellationToken::new(),
                false,
            );

            let dataset = coordinator.generate(config)?;
            write_spool(&output, &dataset)
                .with_context(|| format!("Failed to spool dataset to {}", output.display()))?;
            println!("{}", dataset_table(&dataset));
            Ok(0)
        }

        Commands::Load {
            generation,
            input,
            clear,
            delete_only,
            pipeline,
            dry_run,
            database,
        } => {
            let catalog = catalog_for(&database)?;
            let mode = load_mode(clear, delete_only);
            let config = pipeline.to_config();
            let sinks = sinks_for(&catalog, &database, config.pool_size, dry_run);
            let coordinator = RunCoordinator::new(
                catalog,
                config,
                shutdown_token(),
                !pipeline.skip_region_check,
            );

            let dataset = match (mode, input) {
                (LoadMode::Clear, _) => None,
                (_, Some(dir)) => {
                    let dataset = read_spool(&dir)
                        .with_context(|| format!("Failed to read spool {}", dir.display()))?;
                    Some(coordinator.adopt(dataset)?)
                }
                (_, None) => {
                    let config = generation.to_generator_config(database.environment())?;
                    Some(coordinator.generate(config)?)
                }
            };
            if let Some(dataset) = &dataset {
                println!("{}", dataset_table(dataset));
            }

            let summary = coordinator.execute(mode, dataset, sinks).await?;
            println!("{}", summary.render());
            Ok(summary.exit_code())
        }

        Commands::Verify { database } => {
            let catalog = catalog_for(&database)?;
            let sinks = postgres_sinks(&catalog, &database, 1);
            let coordinator = RunCoordinator::new(
                catalog,
                PipelineConfig::default(),
                CancellationToken::new(),
                false,
            );

            let report = coordinator.verify(&sinks).await?;
            println!("{}", report.render_table());
            if !report.is_clean() {
                warn!("{} rows are not in their home region", report.mismatched());
            }
            Ok(0)
        }
    }
}
