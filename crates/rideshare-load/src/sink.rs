//! The per-region sink seam.
//!
//! A sink writes one region's rows to that region's endpoint. The pipeline
//! only talks to sinks through [`RegionSink`], so tests and dry runs can
//! swap the PostgreSQL implementation for an in-memory one.

use crate::error::LoadError;
use async_trait::async_trait;
use geo_core::{Entity, EntityKind};

/// Rows of one table grouped by stored region and physical placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementCount {
    /// Value of the row's region column.
    pub region: String,
    /// Region the database placed the row in.
    pub placement: String,
    pub rows: u64,
}

#[async_trait]
pub trait RegionSink: Send + Sync {
    /// Region this sink writes to.
    fn region(&self) -> &str;

    /// Check the endpoint is reachable.
    async fn ping(&self) -> Result<(), LoadError>;

    /// Regions configured in the database.
    async fn database_regions(&self) -> Result<Vec<String>, LoadError>;

    /// Upsert one batch of `kind` rows as a single transaction. Returns the
    /// number of rows written.
    async fn upsert_batch(&self, kind: EntityKind, rows: &[Entity]) -> Result<u64, LoadError>;

    /// Delete up to `limit` rows of `kind` whose region is `region`. Returns
    /// the number of rows deleted; zero means none remain.
    async fn clear_batch(
        &self,
        kind: EntityKind,
        region: &str,
        limit: usize,
    ) -> Result<u64, LoadError>;

    /// Row counts of `kind` per stored region and placement.
    async fn placement_counts(&self, kind: EntityKind) -> Result<Vec<PlacementCount>, LoadError>;
}
