//! Ties generation, spooling and the load pipeline together for one run.

use crate::config::DatabaseArgs;
use anyhow::{bail, Context};
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use geo_core::{Dataset, EntityKind, RegionCatalog};
use rideshare_generator::{DataGenerator, GeneratorConfig};
use rideshare_load::{
    verify_distribution, LoadMode, LoadPipeline, MemoryDatabase, PipelineConfig, PipelineReport,
    PostgresSink, RegionJob, RegionSink, VerificationReport,
};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Exit status when the run was interrupted.
pub const EXIT_CANCELLED: i32 = 130;

/// Outcome of a load, clear or clear-then-load run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub mode: LoadMode,
    pub report: PipelineReport,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.report.is_success()
    }

    /// Zero only when every region's batches all committed.
    pub fn exit_code(&self) -> i32 {
        if self.report.is_success() {
            0
        } else if self.report.was_cancelled() && self.report.failures().next().is_none() {
            EXIT_CANCELLED
        } else {
            1
        }
    }

    pub fn render(&self) -> String {
        format!("\n{} summary:\n{}", self.mode, self.report.render_table())
    }
}

/// One PostgreSQL sink per region, each with its own pool.
pub fn postgres_sinks(
    catalog: &RegionCatalog,
    database: &DatabaseArgs,
    pool_size: usize,
) -> Vec<Arc<dyn RegionSink>> {
    catalog
        .all()
        .iter()
        .map(|region| {
            let settings = database.connection_settings(region);
            info!("Region {} -> {:?}", region.id, settings);
            Arc::new(PostgresSink::new(region.id.clone(), settings, pool_size)) as Arc<dyn RegionSink>
        })
        .collect()
}

/// In-memory sinks sharing one database configured with every catalog
/// region.
pub fn memory_sinks(catalog: &RegionCatalog) -> (MemoryDatabase, Vec<Arc<dyn RegionSink>>) {
    let db = MemoryDatabase::new(catalog.ids());
    let sinks = catalog
        .ids()
        .into_iter()
        .map(|id| Arc::new(db.sink(id)) as Arc<dyn RegionSink>)
        .collect();
    (db, sinks)
}

/// Render per-region entity counts.
pub fn dataset_table(dataset: &Dataset) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    let mut header = vec!["Region".to_string()];
    header.extend(EntityKind::LOAD_ORDER.iter().map(|k| k.table().to_string()));
    table.set_header(header);

    for partition in dataset.partitions() {
        let mut row = vec![Cell::new(partition.region())];
        row.extend(
            EntityKind::LOAD_ORDER
                .into_iter()
                .map(|kind| Cell::new(partition.count(kind))),
        );
        table.add_row(row);
    }

    let mut total = vec![Cell::new("TOTAL").fg(Color::Cyan)];
    total.extend(
        EntityKind::LOAD_ORDER
            .into_iter()
            .map(|kind| Cell::new(dataset.count(kind))),
    );
    table.add_row(total);

    format!("{table}\n")
}

pub struct RunCoordinator {
    catalog: RegionCatalog,
    pipeline: LoadPipeline,
    check_regions: bool,
}

impl RunCoordinator {
    pub fn new(
        catalog: RegionCatalog,
        config: PipelineConfig,
        cancel: CancellationToken,
        check_regions: bool,
    ) -> Self {
        Self {
            catalog,
            pipeline: LoadPipeline::new(config, cancel),
            check_regions,
        }
    }

    pub fn catalog(&self) -> &RegionCatalog {
        &self.catalog
    }

    pub fn generate(&self, config: GeneratorConfig) -> anyhow::Result<Dataset> {
        let started = Instant::now();
        let generator = DataGenerator::new(&self.catalog, config)?;
        let dataset = generator.generate()?;
        info!(
            "Generated {} entities across {} regions in {:.2?}",
            dataset.total(),
            dataset.partitions().len(),
            started.elapsed()
        );
        Ok(dataset)
    }

    /// Accept a dataset produced elsewhere (a spool) if it matches this
    /// run's catalog.
    pub fn adopt(&self, dataset: Dataset) -> anyhow::Result<Dataset> {
        let ids = self.catalog.ids();
        if dataset.meta().regions != ids {
            bail!(
                "Dataset regions [{}] do not match the catalog [{}]",
                dataset.meta().regions.join(", "),
                ids.join(", ")
            );
        }
        dataset
            .validate(&self.catalog)
            .context("Spooled dataset failed validation")?;
        Ok(dataset)
    }

    /// Check every sink and the database's region list before any write.
    pub async fn preflight(&self, sinks: &[Arc<dyn RegionSink>]) -> anyhow::Result<()> {
        self.pipeline
            .preflight(sinks, &self.catalog.ids(), self.check_regions)
            .await
            .context("Pre-flight check failed")
    }

    /// Run `mode` with one sink per catalog region. `dataset` is required
    /// unless only clearing. Loads meet between tiers when the dataset
    /// crosses regions; clears always do.
    pub async fn execute(
        &self,
        mode: LoadMode,
        dataset: Option<Dataset>,
        sinks: Vec<Arc<dyn RegionSink>>,
    ) -> anyhow::Result<RunSummary> {
        if sinks.len() != self.catalog.len() {
            bail!(
                "Expected {} region sinks, got {}",
                self.catalog.len(),
                sinks.len()
            );
        }
        self.preflight(&sinks).await?;

        let (jobs, coordinate) = match (mode, dataset) {
            (LoadMode::Clear, _) => {
                let jobs = sinks.into_iter().map(RegionJob::clear_only).collect();
                (jobs, true)
            }
            (_, Some(dataset)) => {
                let coordinate = dataset.meta().pairing.allows_cross_region()
                    || dataset.has_cross_region_references();
                let mut jobs = Vec::with_capacity(sinks.len());
                for (sink, partition) in sinks.into_iter().zip(dataset.into_partitions()) {
                    if sink.region() != partition.region() {
                        bail!(
                            "Sink for '{}' paired with partition '{}'",
                            sink.region(),
                            partition.region()
                        );
                    }
                    jobs.push(RegionJob::new(sink, partition));
                }
                (jobs, coordinate)
            }
            (_, None) => bail!("{mode} needs a dataset"),
        };

        let report = self.pipeline.run(mode, jobs, coordinate).await;
        Ok(RunSummary { mode, report })
    }

    /// Placement report over one region's sink; every endpoint sees the
    /// whole cluster.
    pub async fn verify(&self, sinks: &[Arc<dyn RegionSink>]) -> anyhow::Result<VerificationReport> {
        let Some(sink) = sinks.first() else {
            bail!("No region sinks to verify through");
        };
        sink.ping().await.context("Cannot reach the cluster")?;
        Ok(verify_distribution(sink.as_ref()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_core::{CatalogFile, Endpoint, PairingPolicy, ScaleCounts};
    use rideshare_load::{FaultKind, RetryPolicy};

    fn catalog() -> RegionCatalog {
        RegionCatalog::from_specs(CatalogFile::default_layout().regions, |spec| {
            Ok(Endpoint::new("localhost", spec.local_port.unwrap_or(26257)))
        })
        .unwrap()
    }

    fn coordinator() -> RunCoordinator {
        let config = PipelineConfig {
            batch_size: 16,
            pool_size: 2,
            retry: RetryPolicy::immediate(2),
        };
        RunCoordinator::new(catalog(), config, CancellationToken::new(), true)
    }

    fn small() -> GeneratorConfig {
        GeneratorConfig {
            scale: ScaleCounts::new(12, 8, 20),
            ..GeneratorConfig::default()
        }
    }

    #[tokio::test]
    async fn test_load_then_delete_only() {
        let coordinator = coordinator();
        let (db, sinks) = memory_sinks(coordinator.catalog());
        let dataset = coordinator.generate(small()).unwrap();
        let total = dataset.total();

        let summary = coordinator
            .execute(LoadMode::Load, Some(dataset), sinks.clone())
            .await
            .unwrap();
        assert_eq!(summary.exit_code(), 0);
        assert_eq!(db.total(), total);

        let summary = coordinator
            .execute(LoadMode::Clear, None, sinks)
            .await
            .unwrap();
        assert!(summary.is_success());
        assert_eq!(db.total(), 0);
    }

    #[tokio::test]
    async fn test_failed_region_exit_code() {
        let coordinator = coordinator();
        let (db, sinks) = memory_sinks(coordinator.catalog());
        db.inject_fault("ap-south", EntityKind::Rider, 0, 1, FaultKind::Permanent);

        let dataset = coordinator.generate(small()).unwrap();
        let summary = coordinator
            .execute(LoadMode::Load, Some(dataset), sinks)
            .await
            .unwrap();
        assert_eq!(summary.exit_code(), 1);
        assert!(summary.render().contains("FAILED"));
    }

    #[tokio::test]
    async fn test_cancelled_exit_code() {
        let cancel = CancellationToken::new();
        let coordinator =
            RunCoordinator::new(catalog(), PipelineConfig::default(), cancel.clone(), true);
        let (_db, sinks) = memory_sinks(coordinator.catalog());
        let dataset = coordinator.generate(small()).unwrap();
        cancel.cancel();

        let summary = coordinator
            .execute(LoadMode::Load, Some(dataset), sinks)
            .await
            .unwrap();
        assert_eq!(summary.exit_code(), EXIT_CANCELLED);
    }

    #[tokio::test]
    async fn test_missing_database_region_aborts() {
        let coordinator = coordinator();
        let db = MemoryDatabase::new(["us-east", "us-west", "eu-central"]);
        let sinks: Vec<Arc<dyn RegionSink>> = coordinator
            .catalog()
            .ids()
            .into_iter()
            .map(|id| Arc::new(db.sink(id)) as Arc<dyn RegionSink>)
            .collect();

        let dataset = coordinator.generate(small()).unwrap();
        let err = coordinator
            .execute(LoadMode::Load, Some(dataset), sinks)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("ap-south"));
        assert_eq!(db.total(), 0);
    }

    #[test]
    fn test_adopt_rejects_other_catalog() {
        let coordinator = coordinator();
        let dataset = coordinator.generate(small()).unwrap();

        let two_regions = RegionCatalog::from_specs(
            CatalogFile::default_layout().regions.into_iter().take(2).collect(),
            |spec| Ok(Endpoint::new("localhost", spec.local_port.unwrap_or(26257))),
        )
        .unwrap();
        let other = RunCoordinator::new(
            two_regions,
            PipelineConfig::default(),
            CancellationToken::new(),
            true,
        );
        assert!(other.adopt(dataset.clone()).is_err());
        assert!(coordinator.adopt(dataset).is_ok());
    }

    #[tokio::test]
    async fn test_border_dataset_round_trip() {
        let coordinator = coordinator();
        let (db, sinks) = memory_sinks(coordinator.catalog());
        let config = GeneratorConfig {
            pairing: PairingPolicy::new(0.4).unwrap(),
            ..small()
        };
        let dataset = coordinator.generate(config).unwrap();
        let total = dataset.total();

        let summary = coordinator
            .execute(LoadMode::Load, Some(dataset), sinks.clone())
            .await
            .unwrap();
        assert!(summary.is_success());
        assert_eq!(db.total(), total);

        let report = coordinator.verify(&sinks).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.count(EntityKind::Region), 4);

        let summary = coordinator
            .execute(LoadMode::Clear, None, sinks)
            .await
            .unwrap();
        assert!(summary.is_success());
        assert_eq!(db.total(), 0);
    }

    #[test]
    fn test_dataset_table() {
        let dataset = coordinator().generate(small()).unwrap();
        let table = dataset_table(&dataset);
        assert!(table.contains("eu-central"));
        assert!(table.contains("vehicles"));
        assert!(table.contains("TOTAL"));
    }
}
