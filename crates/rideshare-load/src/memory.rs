//! In-memory database and sink.
//!
//! Behaves like the multi-region cluster as far as the pipeline can
//! observe: one shared store, upserts keyed on the primary key, foreign key
//! enforcement on insert and delete, region values checked against the
//! database's region list. Faults can be injected per region and kind to
//! exercise retry and partial-failure paths. Used by tests and `--dry-run`.

use crate::error::LoadError;
use crate::sink::{PlacementCount, RegionSink};
use async_trait::async_trait;
use geo_core::{Entity, EntityId, EntityKind, RegionalEntity};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// Error returned by an injected fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Serialization failure, retried by the pipeline.
    Transient,
    /// Constraint violation, never retried.
    Permanent,
}

#[derive(Debug, Clone)]
struct Fault {
    region: String,
    kind: EntityKind,
    /// Batches that succeed before the fault starts firing.
    skip: u32,
    remaining: u32,
    fault: FaultKind,
}

#[derive(Debug, Default)]
struct State {
    database_regions: Vec<String>,
    tables: HashMap<EntityKind, BTreeMap<EntityId, Entity>>,
    /// How many stored rows reference each id.
    referrers: HashMap<EntityId, usize>,
    faults: Vec<Fault>,
    upsert_calls: u64,
}

impl State {
    fn contains(&self, kind: EntityKind, id: &EntityId) -> bool {
        self.tables
            .get(&kind)
            .is_some_and(|table| table.contains_key(id))
    }

    /// Take the next firing fault for (region, kind), if any.
    fn trip_fault(&mut self, region: &str, kind: EntityKind) -> Option<FaultKind> {
        let fault = self
            .faults
            .iter_mut()
            .find(|f| f.region == region && f.kind == kind && f.remaining > 0)?;
        if fault.skip > 0 {
            fault.skip -= 1;
            return None;
        }
        fault.remaining -= 1;
        Some(fault.fault)
    }

    fn unlink(&mut self, entity: &Entity) {
        for reference in entity.references() {
            if let Some(count) = self.referrers.get_mut(&reference.id) {
                *count -= 1;
                if *count == 0 {
                    self.referrers.remove(&reference.id);
                }
            }
        }
    }

    fn link(&mut self, entity: &Entity) {
        for reference in entity.references() {
            *self.referrers.entry(reference.id).or_default() += 1;
        }
    }
}

/// Shared in-memory store standing in for the whole cluster.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<State>>,
}

impl MemoryDatabase {
    /// A database configured with `regions`.
    pub fn new<I, S>(regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let db = Self::default();
        db.lock().database_regions = regions.into_iter().map(Into::into).collect();
        db
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// A sink writing to this database on behalf of `region`.
    pub fn sink(&self, region: impl Into<String>) -> MemorySink {
        MemorySink {
            region: region.into(),
            db: self.clone(),
        }
    }

    /// Fail `count` upsert batches of `kind` in `region`, after letting
    /// `skip` matching batches through.
    pub fn inject_fault(
        &self,
        region: impl Into<String>,
        kind: EntityKind,
        skip: u32,
        count: u32,
        fault: FaultKind,
    ) {
        self.lock().faults.push(Fault {
            region: region.into(),
            kind,
            skip,
            remaining: count,
            fault,
        });
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.lock().tables.get(&kind).map_or(0, |t| t.len())
    }

    pub fn count_in(&self, kind: EntityKind, region: &str) -> usize {
        self.lock().tables.get(&kind).map_or(0, |t| {
            t.values().filter(|e| e.region_of() == region).count()
        })
    }

    pub fn total(&self) -> usize {
        self.lock().tables.values().map(|t| t.len()).sum()
    }

    pub fn get(&self, kind: EntityKind, id: &EntityId) -> Option<Entity> {
        self.lock().tables.get(&kind).and_then(|t| t.get(id).cloned())
    }

    /// Number of upsert batches attempted, including failed ones.
    pub fn upsert_calls(&self) -> u64 {
        self.lock().upsert_calls
    }

    fn upsert(&self, region: &str, kind: EntityKind, rows: &[Entity]) -> Result<u64, LoadError> {
        let mut state = self.lock();
        state.upsert_calls += 1;

        match state.trip_fault(region, kind) {
            Some(FaultKind::Transient) => {
                return Err(LoadError::from_sqlstate(
                    "40001",
                    "restart transaction: injected serialization failure",
                ))
            }
            Some(FaultKind::Permanent) => {
                return Err(LoadError::from_sqlstate(
                    "23514",
                    "injected check constraint violation",
                ))
            }
            None => {}
        }

        // Validate the whole batch before applying any of it
        for row in rows {
            if row.kind() != kind {
                return Err(LoadError::Database(format!(
                    "{} row {} in a {} batch",
                    row.kind(),
                    row.identifier(),
                    kind
                )));
            }
            if !state.database_regions.iter().any(|r| r == row.region_of()) {
                return Err(LoadError::from_sqlstate(
                    "22P02",
                    format!("invalid region value '{}'", row.region_of()),
                ));
            }
            for reference in row.references() {
                if !state.contains(reference.kind, &reference.id) {
                    return Err(LoadError::from_sqlstate(
                        "23503",
                        format!(
                            "insert on {} violates foreign key: {} {} does not exist",
                            kind, reference.kind, reference.id
                        ),
                    ));
                }
            }
            // regions.region_code is UNIQUE
            if kind == EntityKind::Region {
                let taken = state.tables.get(&kind).and_then(|table| {
                    table.values().find(|stored| {
                        stored.region_of() == row.region_of()
                            && stored.identifier() != row.identifier()
                    })
                });
                if let Some(stored) = taken {
                    return Err(LoadError::from_sqlstate(
                        "23505",
                        format!(
                            "duplicate key value violates unique constraint: region_code '{}' already exists as {}",
                            row.region_of(),
                            stored.identifier()
                        ),
                    ));
                }
            }
        }

        for row in rows {
            let previous = state
                .tables
                .entry(kind)
                .or_default()
                .insert(row.identifier(), row.clone());
            if let Some(previous) = previous {
                state.unlink(&previous);
            }
            state.link(row);
        }

        Ok(rows.len() as u64)
    }

    fn clear(&self, kind: EntityKind, region: &str, limit: usize) -> Result<u64, LoadError> {
        let mut state = self.lock();

        let ids: Vec<EntityId> = match state.tables.get(&kind) {
            Some(table) => table
                .values()
                .filter(|e| e.region_of() == region)
                .take(limit)
                .map(|e| e.identifier())
                .collect(),
            None => return Ok(0),
        };

        if let Some(id) = ids.iter().find(|id| state.referrers.contains_key(id)) {
            return Err(LoadError::from_sqlstate(
                "23503",
                format!("delete on {kind} violates foreign key: {id} is still referenced"),
            ));
        }

        for id in &ids {
            let removed = state.tables.get_mut(&kind).and_then(|t| t.remove(id));
            if let Some(entity) = removed {
                state.unlink(&entity);
            }
        }

        Ok(ids.len() as u64)
    }

    fn placement(&self, kind: EntityKind) -> Vec<PlacementCount> {
        let state = self.lock();
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        if let Some(table) = state.tables.get(&kind) {
            for entity in table.values() {
                *counts.entry(entity.region_of().to_string()).or_default() += 1;
            }
        }
        counts
            .into_iter()
            .map(|(region, rows)| PlacementCount {
                placement: region.clone(),
                region,
                rows,
            })
            .collect()
    }
}

/// [`RegionSink`] over a [`MemoryDatabase`].
#[derive(Debug, Clone)]
pub struct MemorySink {
    region: String,
    db: MemoryDatabase,
}

#[async_trait]
impl RegionSink for MemorySink {
    fn region(&self) -> &str {
        &self.region
    }

    async fn ping(&self) -> Result<(), LoadError> {
        Ok(())
    }

    async fn database_regions(&self) -> Result<Vec<String>, LoadError> {
        Ok(self.db.lock().database_regions.clone())
    }

    async fn upsert_batch(&self, kind: EntityKind, rows: &[Entity]) -> Result<u64, LoadError> {
        self.db.upsert(&self.region, kind, rows)
    }

    async fn clear_batch(
        &self,
        kind: EntityKind,
        region: &str,
        limit: usize,
    ) -> Result<u64, LoadError> {
        self.db.clear(kind, region, limit)
    }

    async fn placement_counts(&self, kind: EntityKind) -> Result<Vec<PlacementCount>, LoadError> {
        Ok(self.db.placement(kind))
    }
}
