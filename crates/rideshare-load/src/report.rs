//! Per-region outcomes and the run summary table.

use crate::error::LoadError;
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use geo_core::{EntityId, EntityKind};
use std::time::Duration;

/// A batch that exhausted its retries or failed permanently.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub region: String,
    pub kind: EntityKind,
    /// Zero-based batch index within the kind. Clear batches count from 0
    /// per kind as well.
    pub batch_index: usize,
    /// Rows in the failed batch. Empty for clear batches.
    pub entity_ids: Vec<EntityId>,
    pub error: LoadError,
}

impl std::fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} batch {} ({} rows): {}",
            self.region,
            self.kind,
            self.batch_index,
            self.entity_ids.len(),
            self.error
        )
    }
}

/// What happened in one region during a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionOutcome {
    pub region: String,
    pub rows_written: u64,
    pub rows_deleted: u64,
    pub batches_committed: u64,
    /// Batches skipped because of a failure or cancellation.
    pub batches_not_started: u64,
    pub failures: Vec<BatchFailure>,
    pub cancelled: bool,
    /// Set when the region's worker task itself died.
    pub worker_error: Option<String>,
    pub duration: Duration,
}

impl RegionOutcome {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            ..Self::default()
        }
    }

    /// All of the region's batches committed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
            && self.worker_error.is_none()
            && !self.cancelled
            && self.batches_not_started == 0
    }

    pub fn rows_per_second(&self) -> Option<f64> {
        rate(self.rows_written + self.rows_deleted, self.duration)
    }

    /// Fold a later phase's outcome for the same region into this one.
    pub fn merge(&mut self, other: RegionOutcome) {
        self.rows_written += other.rows_written;
        self.rows_deleted += other.rows_deleted;
        self.batches_committed += other.batches_committed;
        self.batches_not_started += other.batches_not_started;
        self.failures.extend(other.failures);
        self.cancelled |= other.cancelled;
        if other.worker_error.is_some() {
            self.worker_error = other.worker_error;
        }
        self.duration += other.duration;
    }
}

fn rate(rows: u64, duration: Duration) -> Option<f64> {
    let secs = duration.as_secs_f64();
    if secs > 0.0 {
        Some(rows as f64 / secs)
    } else {
        None
    }
}

/// Outcome of a whole pipeline run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineReport {
    pub outcomes: Vec<RegionOutcome>,
    pub wall_clock: Duration,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(RegionOutcome::is_complete)
    }

    pub fn was_cancelled(&self) -> bool {
        self.outcomes.iter().any(|o| o.cancelled)
    }

    pub fn outcome(&self, region: &str) -> Option<&RegionOutcome> {
        self.outcomes.iter().find(|o| o.region == region)
    }

    pub fn total_written(&self) -> u64 {
        self.outcomes.iter().map(|o| o.rows_written).sum()
    }

    pub fn total_deleted(&self) -> u64 {
        self.outcomes.iter().map(|o| o.rows_deleted).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &BatchFailure> {
        self.outcomes.iter().flat_map(|o| o.failures.iter())
    }

    /// Aggregate throughput over the wall clock.
    pub fn rows_per_second(&self) -> Option<f64> {
        rate(self.total_written() + self.total_deleted(), self.wall_clock)
    }

    /// Merge a later phase into this report, region by region.
    pub fn merge(&mut self, other: PipelineReport) {
        for outcome in other.outcomes {
            match self.outcomes.iter_mut().find(|o| o.region == outcome.region) {
                Some(existing) => existing.merge(outcome),
                None => self.outcomes.push(outcome),
            }
        }
        self.wall_clock += other.wall_clock;
    }

    pub fn render_table(&self) -> String {
        let mut output = String::new();

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec![
            "Region", "Written", "Deleted", "Batches", "Skipped", "Duration", "Rows/sec", "Status",
        ]);

        for outcome in &self.outcomes {
            let status_cell = if outcome.is_complete() {
                Cell::new("OK").fg(Color::Green)
            } else if outcome.cancelled
                && outcome.failures.is_empty()
                && outcome.worker_error.is_none()
            {
                Cell::new("CANCELLED").fg(Color::Yellow)
            } else {
                Cell::new("FAILED").fg(Color::Red)
            };

            table.add_row(vec![
                Cell::new(&outcome.region),
                Cell::new(format_number(outcome.rows_written)),
                Cell::new(format_number(outcome.rows_deleted)),
                Cell::new(format_number(outcome.batches_committed)),
                Cell::new(format_number(outcome.batches_not_started)),
                Cell::new(format_duration(outcome.duration.as_secs_f64())),
                Cell::new(
                    outcome
                        .rows_per_second()
                        .map(|r| format!("{r:.1}"))
                        .unwrap_or_else(|| "-".to_string()),
                ),
                status_cell,
            ]);
        }

        let complete = self.outcomes.iter().filter(|o| o.is_complete()).count();
        table.add_row(vec![
            Cell::new("TOTAL").fg(Color::Cyan),
            Cell::new(format_number(self.total_written())),
            Cell::new(format_number(self.total_deleted())),
            Cell::new(format_number(
                self.outcomes.iter().map(|o| o.batches_committed).sum(),
            )),
            Cell::new(format_number(
                self.outcomes.iter().map(|o| o.batches_not_started).sum(),
            )),
            Cell::new(format!("{}*", format_duration(self.wall_clock.as_secs_f64()))),
            Cell::new(
                self.rows_per_second()
                    .map(|r| format!("{r:.1}"))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(format!("{}/{}", complete, self.outcomes.len())),
        ]);

        output.push_str(&table.to_string());
        output.push_str("\n* Wall clock (regions run in parallel)\n");

        for outcome in &self.outcomes {
            if let Some(error) = &outcome.worker_error {
                output.push_str(&format!("\n{} worker failed: {}\n", outcome.region, error));
            }
        }

        let failures: Vec<&BatchFailure> = self.failures().collect();
        if !failures.is_empty() {
            output.push_str("\nFailed batches:\n");
            for failure in failures {
                output.push_str(&format!("  {failure}\n"));
            }
        }

        output
    }
}

pub(crate) fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        format!("{secs:.1}s")
    } else if secs < 3600.0 {
        let mins = (secs / 60.0).floor();
        format!("{}m {:02.0}s", mins as u64, secs - mins * 60.0)
    } else {
        let hours = (secs / 3600.0).floor();
        let mins = ((secs - hours * 3600.0) / 60.0).floor();
        format!("{}h {:02.0}m", hours as u64, mins)
    }
}

/// Thousands separators.
pub(crate) fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut result = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}
