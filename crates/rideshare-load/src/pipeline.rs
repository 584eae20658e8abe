//! Per-region load and clear workers.
//!
//! One task per region, serial across kinds and bounded-parallel within a
//! kind. On every clear, and on loads of datasets with cross-region
//! references, the workers meet at a barrier between the independent and
//! dependent tiers, so every referenced
//! row exists (on load) or is no longer referenced (on clear) before the
//! other tier starts.

use crate::error::LoadError;
use crate::report::{BatchFailure, PipelineReport, RegionOutcome};
use crate::retry::RetryPolicy;
use crate::sink::RegionSink;
use crate::sql::{max_batch_rows, DEFAULT_BATCH_SIZE};
use futures::stream::{self, StreamExt};
use geo_core::{Entity, EntityKind, RegionPartition, RegionalEntity, Tier};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Barrier;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const DEFAULT_POOL_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    Load,
    Clear,
    ClearThenLoad,
}

impl std::fmt::Display for LoadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadMode::Load => write!(f, "load"),
            LoadMode::Clear => write!(f, "clear"),
            LoadMode::ClearThenLoad => write!(f, "clear-then-load"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Rows per batch, clamped per kind to what fits in one statement.
    pub batch_size: usize,
    /// Batches in flight per region.
    pub pool_size: usize,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            pool_size: DEFAULT_POOL_SIZE,
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    fn batch_size_for(&self, kind: EntityKind) -> usize {
        self.batch_size.clamp(1, max_batch_rows(kind))
    }
}

/// A region's sink and the rows it owns. Clear-only jobs carry an empty
/// partition.
pub struct RegionJob {
    pub sink: Arc<dyn RegionSink>,
    pub partition: RegionPartition,
}

impl RegionJob {
    pub fn new(sink: Arc<dyn RegionSink>, partition: RegionPartition) -> Self {
        Self { sink, partition }
    }

    pub fn clear_only(sink: Arc<dyn RegionSink>) -> Self {
        let partition = RegionPartition::new(sink.region(), Vec::new());
        Self { sink, partition }
    }

    pub fn region(&self) -> &str {
        self.partition.region()
    }
}

/// Runs region workers against their sinks.
pub struct LoadPipeline {
    config: PipelineConfig,
    cancel: CancellationToken,
}

impl LoadPipeline {
    pub fn new(config: PipelineConfig, cancel: CancellationToken) -> Self {
        Self { config, cancel }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Check every sink is reachable and, when `check_regions` is set, that
    /// the database knows every catalog region.
    pub async fn preflight(
        &self,
        sinks: &[Arc<dyn RegionSink>],
        catalog_regions: &[&str],
        check_regions: bool,
    ) -> Result<(), LoadError> {
        for sink in sinks {
            sink.ping().await.map_err(|e| {
                LoadError::Configuration(format!(
                    "Cannot reach endpoint for region '{}': {}",
                    sink.region(),
                    e
                ))
            })?;
        }

        if !check_regions {
            warn!("Skipping database region check");
            return Ok(());
        }

        let Some(sink) = sinks.first() else {
            return Ok(());
        };
        let configured = sink.database_regions().await?;
        let missing: Vec<&str> = catalog_regions
            .iter()
            .copied()
            .filter(|region| !configured.iter().any(|c| c == region))
            .collect();
        if !missing.is_empty() {
            return Err(LoadError::Configuration(format!(
                "Database is missing regions [{}] (configured: [{}])",
                missing.join(", "),
                configured.join(", ")
            )));
        }

        info!("Pre-flight passed for {} regions", catalog_regions.len());
        Ok(())
    }

    /// Run `mode` over every job. `coordinate_tiers` makes the workers meet
    /// between tiers while loading; it is needed whenever rows reference
    /// other regions. Clearing always coordinates, since rows already in
    /// the database may reference any region.
    pub async fn run(
        &self,
        mode: LoadMode,
        jobs: Vec<RegionJob>,
        coordinate_tiers: bool,
    ) -> PipelineReport {
        let jobs: Vec<Arc<RegionJob>> = jobs.into_iter().map(Arc::new).collect();
        match mode {
            LoadMode::Load => self.run_phase(mode, &jobs, coordinate_tiers).await,
            LoadMode::Clear => self.run_phase(mode, &jobs, true).await,
            LoadMode::ClearThenLoad => {
                let mut report = self.run_phase(LoadMode::Clear, &jobs, true).await;
                if !report.is_success() {
                    warn!("Clear phase did not complete, skipping load");
                    return report;
                }
                let load = self.run_phase(LoadMode::Load, &jobs, coordinate_tiers).await;
                report.merge(load);
                report
            }
        }
    }

    async fn run_phase(
        &self,
        mode: LoadMode,
        jobs: &[Arc<RegionJob>],
        coordinate_tiers: bool,
    ) -> PipelineReport {
        let started = Instant::now();
        let barrier = (coordinate_tiers && jobs.len() > 1).then(|| Arc::new(Barrier::new(jobs.len())));

        info!(
            "Starting {} across {} regions (batch size {}, {} in flight per region{})",
            mode,
            jobs.len(),
            self.config.batch_size,
            self.config.pool_size,
            if barrier.is_some() { ", tier-coordinated" } else { "" }
        );

        let mut tasks = JoinSet::new();
        let mut task_regions = HashMap::new();
        for job in jobs {
            let worker = RegionWorker {
                job: Arc::clone(job),
                config: self.config,
                cancel: self.cancel.clone(),
                barrier: barrier.clone(),
            };
            let handle = tasks.spawn(worker.run(mode));
            task_regions.insert(handle.id(), job.region().to_string());
        }

        let mut finished: HashMap<String, RegionOutcome> = HashMap::new();
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, outcome)) => {
                    finished.insert(outcome.region.clone(), outcome);
                }
                Err(e) => {
                    let region = task_regions.get(&e.id()).cloned().unwrap_or_default();
                    error!("Worker for region '{}' died: {}", region, e);
                    let mut outcome = RegionOutcome::new(region.clone());
                    outcome.worker_error = Some(e.to_string());
                    finished.insert(region, outcome);
                }
            }
        }

        let outcomes = jobs
            .iter()
            .map(|job| {
                finished.remove(job.region()).unwrap_or_else(|| {
                    let mut outcome = RegionOutcome::new(job.region());
                    outcome.worker_error = Some("worker produced no outcome".to_string());
                    outcome
                })
            })
            .collect();

        PipelineReport {
            outcomes,
            wall_clock: started.elapsed(),
        }
    }
}

enum BatchResult {
    Committed(u64),
    Failed(BatchFailure),
    NotStarted,
}

struct RegionWorker {
    job: Arc<RegionJob>,
    config: PipelineConfig,
    cancel: CancellationToken,
    barrier: Option<Arc<Barrier>>,
}

impl RegionWorker {
    async fn run(self, mode: LoadMode) -> RegionOutcome {
        let started = Instant::now();
        let mut outcome = RegionOutcome::new(self.job.region());

        match mode {
            LoadMode::Clear => {
                self.clear_tier(Tier::Dependent, &mut outcome).await;
                self.wait_for_tier().await;
                self.clear_tier(Tier::Independent, &mut outcome).await;
            }
            _ => {
                self.load_tier(Tier::Independent, &mut outcome).await;
                self.wait_for_tier().await;
                self.load_tier(Tier::Dependent, &mut outcome).await;
            }
        }

        outcome.duration = started.elapsed();
        if outcome.is_complete() {
            info!(
                "Region {} finished {}: {} written, {} deleted in {:.2?}",
                outcome.region, mode, outcome.rows_written, outcome.rows_deleted, outcome.duration
            );
        } else {
            warn!(
                "Region {} stopped {}: {} failures, {} batches not started{}",
                outcome.region,
                mode,
                outcome.failures.len(),
                outcome.batches_not_started,
                if outcome.cancelled { ", cancelled" } else { "" }
            );
        }
        outcome
    }

    /// Every worker reaches this exactly once per phase, whatever happened
    /// in the first tier.
    async fn wait_for_tier(&self) {
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
    }

    fn halted(&self, outcome: &RegionOutcome) -> bool {
        !outcome.failures.is_empty() || self.cancel.is_cancelled()
    }

    async fn load_tier(&self, tier: Tier, outcome: &mut RegionOutcome) {
        for kind in EntityKind::LOAD_ORDER.into_iter().filter(|k| k.tier() == tier) {
            let rows = self.job.partition.of_kind(kind);
            if rows.is_empty() {
                continue;
            }
            let chunks: Vec<&[Entity]> = rows.chunks(self.config.batch_size_for(kind)).collect();

            if self.halted(outcome) {
                outcome.batches_not_started += chunks.len() as u64;
                outcome.cancelled |= self.cancel.is_cancelled();
                continue;
            }

            let stop = AtomicBool::new(false);
            let pending: Vec<_> = chunks
                .into_iter()
                .enumerate()
                .map(|(batch_index, chunk)| self.load_batch(kind, batch_index, chunk, &stop))
                .collect();
            let results: Vec<BatchResult> = stream::iter(pending)
                .buffer_unordered(self.config.pool_size.max(1))
                .collect()
                .await;

            for result in results {
                match result {
                    BatchResult::Committed(written) => {
                        outcome.rows_written += written;
                        outcome.batches_committed += 1;
                    }
                    BatchResult::Failed(failure) => outcome.failures.push(failure),
                    BatchResult::NotStarted => outcome.batches_not_started += 1,
                }
            }
            outcome.cancelled |= self.cancel.is_cancelled();
            outcome.failures.sort_by_key(|f| (f.kind.load_position(), f.batch_index));
        }
    }

    async fn load_batch(
        &self,
        kind: EntityKind,
        batch_index: usize,
        chunk: &[Entity],
        stop: &AtomicBool,
    ) -> BatchResult {
        if stop.load(Ordering::SeqCst) || self.cancel.is_cancelled() {
            return BatchResult::NotStarted;
        }

        let sink = self.job.sink.as_ref();
        let label = format!("{} {} batch {}", self.job.region(), kind, batch_index);
        match self
            .config
            .retry
            .run(&label, || sink.upsert_batch(kind, chunk))
            .await
        {
            Ok(written) => BatchResult::Committed(written),
            Err(e) => {
                stop.store(true, Ordering::SeqCst);
                error!("Failed {}: {}", label, e);
                BatchResult::Failed(BatchFailure {
                    region: self.job.region().to_string(),
                    kind,
                    batch_index,
                    entity_ids: chunk.iter().map(|e| e.identifier()).collect(),
                    error: e,
                })
            }
        }
    }

    async fn clear_tier(&self, tier: Tier, outcome: &mut RegionOutcome) {
        let sink = self.job.sink.as_ref();
        let region = self.job.region();

        for kind in EntityKind::LOAD_ORDER.into_iter().rev().filter(|k| k.tier() == tier) {
            let limit = self.config.batch_size_for(kind);
            let mut batch_index = 0;
            loop {
                if self.halted(outcome) {
                    outcome.cancelled |= self.cancel.is_cancelled();
                    break;
                }
                let label = format!("{region} {kind} clear batch {batch_index}");
                match self
                    .config
                    .retry
                    .run(&label, || sink.clear_batch(kind, region, limit))
                    .await
                {
                    Ok(0) => break,
                    Ok(deleted) => {
                        outcome.rows_deleted += deleted;
                        outcome.batches_committed += 1;
                        batch_index += 1;
                    }
                    Err(e) => {
                        error!("Failed {}: {}", label, e);
                        outcome.failures.push(BatchFailure {
                            region: region.to_string(),
                            kind,
                            batch_index,
                            entity_ids: Vec::new(),
                            error: e,
                        });
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{FaultKind, MemoryDatabase};
    use geo_core::{CatalogFile, Dataset, Endpoint, PairingPolicy, RegionCatalog, ScaleCounts};
    use rideshare_generator::{DataGenerator, GeneratorConfig};

    fn catalog() -> RegionCatalog {
        RegionCatalog::from_specs(CatalogFile::default_layout().regions, |spec| {
            Ok(Endpoint::new("localhost", spec.local_port.unwrap_or(26257)))
        })
        .unwrap()
    }

    fn dataset(catalog: &RegionCatalog, border: f64) -> Dataset {
        let config = GeneratorConfig {
            scale: ScaleCounts::new(30, 20, 50),
            pairing: PairingPolicy::new(border).unwrap(),
            ..GeneratorConfig::default()
        };
        DataGenerator::new(catalog, config)
            .unwrap()
            .generate()
            .unwrap()
    }

    fn jobs(db: &MemoryDatabase, dataset: &Dataset) -> Vec<RegionJob> {
        dataset
            .partitions()
            .iter()
            .map(|p| RegionJob::new(Arc::new(db.sink(p.region())), p.clone()))
            .collect()
    }

    fn clear_jobs(db: &MemoryDatabase, catalog: &RegionCatalog) -> Vec<RegionJob> {
        catalog
            .ids()
            .into_iter()
            .map(|id| RegionJob::clear_only(Arc::new(db.sink(id))))
            .collect()
    }

    fn pipeline(batch_size: usize) -> LoadPipeline {
        LoadPipeline::new(
            PipelineConfig {
                batch_size,
                pool_size: 3,
                retry: RetryPolicy::immediate(3),
            },
            CancellationToken::new(),
        )
    }

    fn assert_counts_match(db: &MemoryDatabase, dataset: &Dataset) {
        for kind in EntityKind::LOAD_ORDER {
            assert_eq!(db.count(kind), dataset.count(kind), "{kind}");
            for partition in dataset.partitions() {
                assert_eq!(
                    db.count_in(kind, partition.region()),
                    partition.count(kind),
                    "{kind} in {}",
                    partition.region()
                );
            }
        }
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let catalog = catalog();
        let dataset = dataset(&catalog, 0.0);
        let db = MemoryDatabase::new(catalog.ids());

        let first = pipeline(7).run(LoadMode::Load, jobs(&db, &dataset), false).await;
        assert!(first.is_success());
        assert_eq!(first.total_written(), dataset.total() as u64);
        assert_counts_match(&db, &dataset);

        let second = pipeline(7).run(LoadMode::Load, jobs(&db, &dataset), false).await;
        assert!(second.is_success());
        assert_counts_match(&db, &dataset);
    }

    #[tokio::test]
    async fn test_cross_region_load_and_clear_with_barrier() {
        let catalog = catalog();
        let dataset = dataset(&catalog, 0.5);
        assert!(dataset.has_cross_region_references());
        let db = MemoryDatabase::new(catalog.ids());

        let report = pipeline(5).run(LoadMode::Load, jobs(&db, &dataset), true).await;
        assert!(report.is_success(), "{}", report.render_table());
        assert_counts_match(&db, &dataset);

        let report = pipeline(5).run(LoadMode::Clear, clear_jobs(&db, &catalog), true).await;
        assert!(report.is_success(), "{}", report.render_table());
        assert_eq!(report.total_deleted(), dataset.total() as u64);
        assert_eq!(db.total(), 0);
    }

    #[tokio::test]
    async fn test_clear_always_meets_between_tiers() {
        let catalog = catalog();
        let dataset = dataset(&catalog, 0.5);
        let db = MemoryDatabase::new(catalog.ids());
        let report = pipeline(5).run(LoadMode::Load, jobs(&db, &dataset), true).await;
        assert!(report.is_success(), "{}", report.render_table());

        let report = pipeline(5).run(LoadMode::Clear, clear_jobs(&db, &catalog), false).await;
        assert!(report.is_success(), "{}", report.render_table());
        assert_eq!(db.total(), 0);

        // Reloading a same-region dataset over border rows also clears cleanly
        pipeline(5).run(LoadMode::Load, jobs(&db, &dataset), true).await;
        let local = self::dataset(&catalog, 0.0);
        let report = pipeline(5)
            .run(LoadMode::ClearThenLoad, jobs(&db, &local), false)
            .await;
        assert!(report.is_success(), "{}", report.render_table());
        assert_eq!(report.total_deleted(), dataset.total() as u64);
        assert_counts_match(&db, &local);
    }

    #[tokio::test]
    async fn test_clear_empty_is_noop() {
        let catalog = catalog();
        let db = MemoryDatabase::new(catalog.ids());

        let report = pipeline(10).run(LoadMode::Clear, clear_jobs(&db, &catalog), false).await;
        assert!(report.is_success());
        assert_eq!(report.total_deleted(), 0);
        assert_eq!(report.outcomes.len(), 4);
    }

    #[tokio::test]
    async fn test_clear_then_load() {
        let catalog = catalog();
        let dataset = dataset(&catalog, 0.0);
        let db = MemoryDatabase::new(catalog.ids());
        pipeline(10).run(LoadMode::Load, jobs(&db, &dataset), false).await;

        let report = pipeline(10)
            .run(LoadMode::ClearThenLoad, jobs(&db, &dataset), false)
            .await;
        assert!(report.is_success());
        assert_eq!(report.total_deleted(), dataset.total() as u64);
        assert_eq!(report.total_written(), dataset.total() as u64);
        assert_counts_match(&db, &dataset);
    }

    #[tokio::test]
    async fn test_transient_fault_is_retried() {
        let catalog = catalog();
        let dataset = dataset(&catalog, 0.0);
        let db = MemoryDatabase::new(catalog.ids());
        db.inject_fault("us-east", EntityKind::Ride, 0, 2, FaultKind::Transient);

        let report = pipeline(10).run(LoadMode::Load, jobs(&db, &dataset), false).await;
        assert!(report.is_success());
        assert_counts_match(&db, &dataset);
    }

    #[tokio::test]
    async fn test_permanent_fault_stops_region_only() {
        let catalog = catalog();
        let dataset = dataset(&catalog, 0.0);
        let db = MemoryDatabase::new(catalog.ids());
        db.inject_fault("eu-central", EntityKind::Driver, 0, 1, FaultKind::Permanent);

        let report = pipeline(4).run(LoadMode::Load, jobs(&db, &dataset), false).await;
        assert!(!report.is_success());

        let failed = report.outcome("eu-central").unwrap();
        assert_eq!(failed.failures.len(), 1);
        assert_eq!(failed.failures[0].kind, EntityKind::Driver);
        assert!(!failed.failures[0].entity_ids.is_empty());
        assert!(failed.batches_not_started > 0);
        assert_eq!(db.count_in(EntityKind::Ride, "eu-central"), 0);

        for region in ["us-east", "us-west", "ap-south"] {
            assert!(report.outcome(region).unwrap().is_complete(), "{region}");
        }

        // Re-running heals the failed region without duplicating the others
        let report = pipeline(4).run(LoadMode::Load, jobs(&db, &dataset), false).await;
        assert!(report.is_success());
        assert_counts_match(&db, &dataset);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let catalog = catalog();
        let dataset = dataset(&catalog, 0.0);
        let db = MemoryDatabase::new(catalog.ids());
        let pipeline = pipeline(10);
        pipeline.cancel_token().cancel();

        let report = pipeline.run(LoadMode::Load, jobs(&db, &dataset), false).await;
        assert!(!report.is_success());
        assert!(report.was_cancelled());
        assert_eq!(report.total_written(), 0);
        assert!(report.outcomes.iter().all(|o| o.batches_not_started > 0));
        assert_eq!(db.total(), 0);
    }

    #[tokio::test]
    async fn test_preflight_region_check() {
        let catalog = catalog();
        let db = MemoryDatabase::new(["us-east", "us-west"]);
        let sinks: Vec<Arc<dyn RegionSink>> = catalog
            .ids()
            .into_iter()
            .map(|id| Arc::new(db.sink(id)) as Arc<dyn RegionSink>)
            .collect();

        let err = pipeline(10)
            .preflight(&sinks, &catalog.ids(), true)
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("eu-central"));

        assert!(pipeline(10)
            .preflight(&sinks, &catalog.ids(), false)
            .await
            .is_ok());
    }
}
