//! The generated dataset, partitioned by home region.

use crate::assignment::PairingPolicy;
use crate::catalog::RegionCatalog;
use crate::entity::{Entity, EntityId, EntityKind, RegionalEntity, Tier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-region entity counts requested from the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleCounts {
    pub riders: u64,
    pub drivers: u64,
    pub rides: u64,
}

impl ScaleCounts {
    pub fn new(riders: u64, drivers: u64, rides: u64) -> Self {
        Self {
            riders,
            drivers,
            rides,
        }
    }
}

/// Everything needed to regenerate a dataset byte for byte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMeta {
    pub seed: u64,
    pub scale: ScaleCounts,
    pub pairing: PairingPolicy,
    pub as_of: DateTime<Utc>,
    /// Region ids in catalog order.
    pub regions: Vec<String>,
}

/// A broken generator invariant. Always fatal.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("Generation invariant violated: entity {id} has unknown home region '{region}'")]
    UnknownRegion { id: EntityId, region: String },

    #[error("Generation invariant violated: entity {id} of region '{region}' is in partition '{partition}'")]
    MisplacedEntity {
        id: EntityId,
        region: String,
        partition: String,
    },

    #[error("Generation invariant violated: identifier {0} is not tagged with its region and kind")]
    MistaggedIdentifier(EntityId),

    #[error("Generation invariant violated: duplicate identifier {0}")]
    DuplicateIdentifier(EntityId),

    #[error("Generation invariant violated: partition '{0}' is not in dependency order")]
    OutOfOrder(String),

    #[error("Generation invariant violated: {from} references missing {kind} {to}")]
    DanglingReference {
        from: EntityId,
        kind: EntityKind,
        to: EntityId,
    },

    #[error("Generation invariant violated: {from} (region '{region}') references {to} in non-adjacent region '{other}'")]
    RegionMismatch {
        from: EntityId,
        region: String,
        to: EntityId,
        other: String,
    },

    #[error("Generation invariant violated: ride {ride} uses vehicle {vehicle} not owned by its driver")]
    VehicleDriverMismatch { ride: EntityId, vehicle: EntityId },

    #[error("Generation invariant violated: partition list does not match the catalog")]
    PartitionLayout,
}

/// Entities of one home region, in generation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionPartition {
    region: String,
    entities: Vec<Entity>,
}

impl RegionPartition {
    pub fn new(region: impl Into<String>, entities: Vec<Entity>) -> Self {
        Self {
            region: region.into(),
            entities,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Whether kinds appear in load order. Required by [`Self::of_kind`].
    pub fn is_dependency_ordered(&self) -> bool {
        self.entities
            .windows(2)
            .all(|w| w[0].kind().load_position() <= w[1].kind().load_position())
    }

    /// Contiguous run of entities of `kind`.
    pub fn of_kind(&self, kind: EntityKind) -> &[Entity] {
        let position = kind.load_position();
        let start = self
            .entities
            .partition_point(|e| e.kind().load_position() < position);
        let end = self
            .entities
            .partition_point(|e| e.kind().load_position() <= position);
        &self.entities[start..end]
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.of_kind(kind).len()
    }
}

/// A complete generated dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    meta: DatasetMeta,
    partitions: Vec<RegionPartition>,
}

impl Dataset {
    pub fn new(meta: DatasetMeta, partitions: Vec<RegionPartition>) -> Self {
        Self { meta, partitions }
    }

    pub fn meta(&self) -> &DatasetMeta {
        &self.meta
    }

    pub fn partitions(&self) -> &[RegionPartition] {
        &self.partitions
    }

    pub fn into_partitions(self) -> Vec<RegionPartition> {
        self.partitions
    }

    pub fn partition(&self, region: &str) -> Option<&RegionPartition> {
        self.partitions.iter().find(|p| p.region == region)
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.partitions.iter().map(|p| p.count(kind)).sum()
    }

    pub fn total(&self) -> usize {
        self.partitions.iter().map(|p| p.len()).sum()
    }

    /// Whether any ride references a driver outside its own region.
    pub fn has_cross_region_references(&self) -> bool {
        let driver_regions: HashMap<EntityId, &str> = self
            .partitions
            .iter()
            .flat_map(|p| p.of_kind(EntityKind::Driver))
            .map(|e| (e.identifier(), e.region_of()))
            .collect();

        self.partitions
            .iter()
            .flat_map(|p| p.of_kind(EntityKind::Ride))
            .flat_map(|ride| {
                ride.references()
                    .into_iter()
                    .filter(|r| r.kind == EntityKind::Driver)
                    .map(move |r| (ride.region_of(), r.id))
            })
            .any(|(region, driver)| driver_regions.get(&driver).is_some_and(|d| *d != region))
    }

    /// Check every structural invariant of a generated dataset.
    ///
    /// Entities are visited in generation order: every region's independent
    /// tier first, then every region's dependent tier. A reference must
    /// point at an entity already visited.
    pub fn validate(&self, catalog: &RegionCatalog) -> Result<(), InvariantViolation> {
        let ids = catalog.ids();
        if self.partitions.len() != ids.len()
            || self
                .partitions
                .iter()
                .zip(&ids)
                .any(|(p, id)| p.region != *id)
        {
            return Err(InvariantViolation::PartitionLayout);
        }

        for partition in &self.partitions {
            if !partition.is_dependency_ordered() {
                return Err(InvariantViolation::OutOfOrder(partition.region.clone()));
            }
        }

        // id -> (kind, region)
        let mut seen: HashMap<EntityId, (EntityKind, &str)> = HashMap::new();
        // vehicle -> owning driver
        let mut vehicle_owner: HashMap<EntityId, EntityId> = HashMap::new();

        for tier in [Tier::Independent, Tier::Dependent] {
            for partition in &self.partitions {
                for entity in partition
                    .entities
                    .iter()
                    .filter(|e| e.kind().tier() == tier)
                {
                    self.check_entity(catalog, partition, entity, &seen, &vehicle_owner)?;

                    if let Entity::Vehicle(v) = entity {
                        vehicle_owner.insert(v.vehicle_id, v.driver_id);
                    }
                    let id = entity.identifier();
                    if seen
                        .insert(id, (entity.kind(), entity.region_of()))
                        .is_some()
                    {
                        return Err(InvariantViolation::DuplicateIdentifier(id));
                    }
                }
            }
        }

        Ok(())
    }

    fn check_entity(
        &self,
        catalog: &RegionCatalog,
        partition: &RegionPartition,
        entity: &Entity,
        seen: &HashMap<EntityId, (EntityKind, &str)>,
        vehicle_owner: &HashMap<EntityId, EntityId>,
    ) -> Result<(), InvariantViolation> {
        let id = entity.identifier();
        let region = entity.region_of();

        let ordinal = catalog
            .ordinal(region)
            .map_err(|_| InvariantViolation::UnknownRegion {
                id,
                region: region.to_string(),
            })?;
        if region != partition.region {
            return Err(InvariantViolation::MisplacedEntity {
                id,
                region: region.to_string(),
                partition: partition.region.clone(),
            });
        }
        if id.region_ordinal() as usize != ordinal || id.kind_tag() != entity.kind().tag() {
            return Err(InvariantViolation::MistaggedIdentifier(id));
        }

        for reference in entity.references() {
            let (kind, other_region) = match seen.get(&reference.id) {
                Some(found) if found.0 == reference.kind => *found,
                _ => {
                    return Err(InvariantViolation::DanglingReference {
                        from: id,
                        kind: reference.kind,
                        to: reference.id,
                    })
                }
            };

            let crosses_allowed = kind != EntityKind::Rider
                && entity.kind() == EntityKind::Ride
                && self.meta.pairing.allows_cross_region()
                && catalog.are_adjacent(region, other_region);
            if other_region != region && !crosses_allowed {
                return Err(InvariantViolation::RegionMismatch {
                    from: id,
                    region: region.to_string(),
                    to: reference.id,
                    other: other_region.to_string(),
                });
            }
        }

        if let Entity::Ride(ride) = entity {
            if let Some(vehicle) = ride.vehicle_id {
                if vehicle_owner.get(&vehicle) != ride.driver_id.as_ref() {
                    return Err(InvariantViolation::VehicleDriverMismatch {
                        ride: id,
                        vehicle,
                    });
                }
            }
        }

        Ok(())
    }
}
