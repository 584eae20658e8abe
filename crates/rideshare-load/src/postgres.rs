//! PostgreSQL-wire sink for one region's endpoint.

use crate::error::LoadError;
use crate::pool::{ConnectionPool, ConnectionSettings};
use crate::sink::{PlacementCount, RegionSink};
use crate::sql::{
    batch_params, clear_statement, placement_statement, show_regions_statement, upsert_statement,
};
use async_trait::async_trait;
use geo_core::{Entity, EntityKind};
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;
use tracing::debug;

/// Writes a region's rows to that region's endpoint over a connection pool.
pub struct PostgresSink {
    region: String,
    pool: ConnectionPool,
}

impl PostgresSink {
    pub fn new(region: impl Into<String>, settings: ConnectionSettings, pool_size: usize) -> Self {
        Self {
            region: region.into(),
            pool: ConnectionPool::new(settings, pool_size),
        }
    }

    pub fn settings(&self) -> &ConnectionSettings {
        self.pool.settings()
    }
}

fn column<'a, T>(row: &'a Row, idx: usize) -> Result<T, LoadError>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get(idx)
        .map_err(|e| LoadError::Database(format!("Unexpected result column {idx}: {e}")))
}

#[async_trait]
impl RegionSink for PostgresSink {
    fn region(&self) -> &str {
        &self.region
    }

    async fn ping(&self) -> Result<(), LoadError> {
        let lease = self.pool.acquire().await?;
        let result = lease.client.simple_query("SELECT 1").await;
        self.pool.release(lease);
        result?;
        Ok(())
    }

    async fn database_regions(&self) -> Result<Vec<String>, LoadError> {
        let sql = show_regions_statement(&self.settings().database);
        let lease = self.pool.acquire().await?;
        let result = lease.client.query(&sql, &[]).await;
        self.pool.release(lease);

        result?
            .iter()
            .map(|row| {
                row.try_get::<_, String>("region")
                    .map_err(|e| LoadError::Database(format!("Unexpected SHOW REGIONS result: {e}")))
            })
            .collect()
    }

    async fn upsert_batch(&self, kind: EntityKind, rows: &[Entity]) -> Result<u64, LoadError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let sql = upsert_statement(kind, rows.len());
        let params = batch_params(rows);
        let param_refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let mut lease = self.pool.acquire().await?;
        let result = async {
            let tx = lease.client.transaction().await?;
            tx.execute(&sql, &param_refs).await?;
            tx.commit().await
        }
        .await;
        self.pool.release(lease);
        result?;

        debug!("Upserted {} {} rows in {}", rows.len(), kind, self.region);
        Ok(rows.len() as u64)
    }

    async fn clear_batch(
        &self,
        kind: EntityKind,
        region: &str,
        limit: usize,
    ) -> Result<u64, LoadError> {
        let sql = clear_statement(kind);
        let limit = limit as i64;

        let lease = self.pool.acquire().await?;
        let result = lease.client.execute(&sql, &[&region, &limit]).await;
        self.pool.release(lease);
        Ok(result?)
    }

    async fn placement_counts(&self, kind: EntityKind) -> Result<Vec<PlacementCount>, LoadError> {
        let sql = placement_statement(kind);
        let lease = self.pool.acquire().await?;
        let result = lease.client.query(&sql, &[]).await;
        self.pool.release(lease);

        result?
            .iter()
            .map(|row| {
                Ok(PlacementCount {
                    region: column(row, 0)?,
                    placement: column(row, 1)?,
                    rows: column::<i64>(row, 2)? as u64,
                })
            })
            .collect()
    }
}
