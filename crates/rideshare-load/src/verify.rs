//! Post-load distribution check.
//!
//! Counts rows per table and region, and flags rows the database placed in
//! a different region than their region column says.

use crate::error::LoadError;
use crate::report::format_number;
use crate::sink::{PlacementCount, RegionSink};
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use geo_core::EntityKind;
use std::collections::BTreeMap;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerificationReport {
    tables: BTreeMap<EntityKind, Vec<PlacementCount>>,
}

impl VerificationReport {
    pub fn from_counts(tables: BTreeMap<EntityKind, Vec<PlacementCount>>) -> Self {
        Self { tables }
    }

    pub fn count(&self, kind: EntityKind) -> u64 {
        self.tables
            .get(&kind)
            .map_or(0, |counts| counts.iter().map(|c| c.rows).sum())
    }

    pub fn count_in(&self, kind: EntityKind, region: &str) -> u64 {
        self.tables.get(&kind).map_or(0, |counts| {
            counts
                .iter()
                .filter(|c| c.region == region)
                .map(|c| c.rows)
                .sum()
        })
    }

    /// Rows whose placement differs from their region column.
    pub fn mismatched(&self) -> u64 {
        self.tables
            .values()
            .flatten()
            .filter(|c| c.region != c.placement)
            .map(|c| c.rows)
            .sum()
    }

    pub fn is_clean(&self) -> bool {
        self.mismatched() == 0
    }

    pub fn render_table(&self) -> String {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Table", "Region", "Rows", "Misplaced", "Status"]);

        for (kind, counts) in &self.tables {
            let mut by_region: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
            for count in counts {
                let entry = by_region.entry(count.region.as_str()).or_default();
                entry.0 += count.rows;
                if count.region != count.placement {
                    entry.1 += count.rows;
                }
            }

            if by_region.is_empty() {
                table.add_row(vec![
                    Cell::new(kind.table()),
                    Cell::new("-"),
                    Cell::new("0"),
                    Cell::new("0"),
                    Cell::new("EMPTY").fg(Color::Yellow),
                ]);
            }

            for (region, (rows, misplaced)) in by_region {
                let status = if misplaced == 0 {
                    Cell::new("OK").fg(Color::Green)
                } else {
                    Cell::new("MISPLACED").fg(Color::Red)
                };
                table.add_row(vec![
                    Cell::new(kind.table()),
                    Cell::new(region),
                    Cell::new(format_number(rows)),
                    Cell::new(format_number(misplaced)),
                    status,
                ]);
            }
        }

        format!("{table}\n")
    }
}

/// Collect placement counts for every table through `sink`.
pub async fn verify_distribution(sink: &dyn RegionSink) -> Result<VerificationReport, LoadError> {
    let mut tables = BTreeMap::new();
    for kind in EntityKind::LOAD_ORDER {
        let counts = sink.placement_counts(kind).await?;
        tables.insert(kind, counts);
    }

    let report = VerificationReport::from_counts(tables);
    if report.is_clean() {
        info!("All rows placed in their home region");
    } else {
        warn!("{} rows placed outside their home region", report.mismatched());
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDatabase;

    fn count(region: &str, placement: &str, rows: u64) -> PlacementCount {
        PlacementCount {
            region: region.to_string(),
            placement: placement.to_string(),
            rows,
        }
    }

    #[test]
    fn test_counts_and_mismatches() {
        let mut tables = BTreeMap::new();
        tables.insert(
            EntityKind::Rider,
            vec![count("us-east", "us-east", 90), count("us-east", "us-west", 10)],
        );
        tables.insert(EntityKind::Driver, vec![count("us-west", "us-west", 40)]);
        let report = VerificationReport::from_counts(tables);

        assert_eq!(report.count(EntityKind::Rider), 100);
        assert_eq!(report.count_in(EntityKind::Rider, "us-east"), 100);
        assert_eq!(report.count_in(EntityKind::Driver, "us-east"), 0);
        assert_eq!(report.mismatched(), 10);
        assert!(!report.is_clean());

        let rendered = report.render_table();
        assert!(rendered.contains("MISPLACED"));
        assert!(rendered.contains("drivers"));
    }

    #[tokio::test]
    async fn test_verify_empty_database() {
        let db = MemoryDatabase::new(["us-east"]);
        let report = verify_distribution(&db.sink("us-east")).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.count(EntityKind::Ride), 0);
        assert!(report.render_table().contains("EMPTY"));
    }
}
