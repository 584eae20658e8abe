//! Main data generator producing a region-partitioned dataset.

use crate::generators::id::generate_entity_id;
use crate::generators::numeric::{generate_int_range, generate_rating};
use crate::generators::person::{generate_email, generate_name, generate_phone};
use crate::generators::timestamp::{default_as_of, generate_timestamp_before};
use crate::generators::trip::{generate_route, generate_status, trip_metrics};
use crate::generators::vehicle::{generate_license_plate, generate_vehicle_attributes};
use crate::scale::ScalePreset;
use chrono::{DateTime, Duration, Utc};
use geo_core::geohash::{self, DEFAULT_PRECISION};
use geo_core::{
    AssignmentError, Availability, CatalogError, Coordinate, Dataset, DatasetMeta, Driver,
    Entity, EntityId, EntityKind, InvariantViolation, PairingPolicy, Region, RegionAssigner,
    RegionCatalog, RegionPartition, RegionRecord, Ride, RideStatus, Rider, ScaleCounts, Vehicle,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

/// Nodes per region in the default cluster layout.
const NODES_PER_REGION: i64 = 3;

/// Window for account creation timestamps.
const ACCOUNT_AGE_DAYS: i64 = 365;

/// Window for ride request timestamps.
const RIDE_WINDOW_DAYS: i64 = 30;

/// Stream for region records, riders, drivers and vehicles.
const PHASE_INDEPENDENT: u64 = 0;

/// Stream for rides.
const PHASE_RIDES: u64 = 1;

/// Error type for generator operations.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    /// Requested counts cannot produce a consistent dataset
    #[error("Invalid scale: {0}")]
    InvalidScale(String),

    /// Region ordinals must fit the identifier's region byte
    #[error("Catalog has {0} regions; at most 256 are supported")]
    TooManyRegions(usize),

    #[error(transparent)]
    InvariantViolation(#[from] InvariantViolation),

    #[error("Generation invariant violated: {0}")]
    Assignment(#[from] AssignmentError),

    #[error("Generation invariant violated: sampled ({lat}, {lon}) for '{expected}' assigned to '{actual}'")]
    MisassignedCoordinate {
        expected: String,
        actual: String,
        lat: f64,
        lon: f64,
    },

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl GeneratorError {
    /// Whether the error is a broken generation invariant (as opposed to bad
    /// input).
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            GeneratorError::InvariantViolation(_)
                | GeneratorError::Assignment(_)
                | GeneratorError::MisassignedCoordinate { .. }
        )
    }
}

/// Inputs that fully determine a generated dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    pub seed: u64,
    pub scale: ScaleCounts,
    pub pairing: PairingPolicy,
    /// Reference instant all timestamps are relative to
    pub as_of: DateTime<Utc>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            scale: ScalePreset::Local.counts(),
            pairing: PairingPolicy::default(),
            as_of: default_as_of(),
        }
    }
}

/// Riders and drivers of one region, kept for ride generation.
#[derive(Debug, Default)]
struct RegionPool {
    riders: Vec<(EntityId, Coordinate)>,
    /// (driver, vehicle)
    drivers: Vec<(EntityId, EntityId)>,
}

/// Data generator that produces a deterministic, referentially consistent
/// dataset for every region in a catalog.
///
/// Each region draws from its own RNG streams, derived from the seed, the
/// region's ordinal and the generation phase, so a region's output does not
/// depend on how much randomness other regions consumed.
pub struct DataGenerator<'a> {
    catalog: &'a RegionCatalog,
    config: GeneratorConfig,
}

impl<'a> DataGenerator<'a> {
    /// Create a new data generator over `catalog`.
    pub fn new(catalog: &'a RegionCatalog, config: GeneratorConfig) -> Result<Self, GeneratorError> {
        if catalog.len() > usize::from(u8::MAX) + 1 {
            return Err(GeneratorError::TooManyRegions(catalog.len()));
        }
        if config.scale.riders == 0 && config.scale.rides > 0 {
            return Err(GeneratorError::InvalidScale(
                "rides require at least one rider per region".to_string(),
            ));
        }
        Ok(Self { catalog, config })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Compute the RNG seed for a region's phase stream.
    fn compute_stream_seed(&self, ordinal: usize, phase: u64) -> u64 {
        let stream = (((ordinal as u64) << 8) | phase).wrapping_add(1);
        self.config
            .seed
            .wrapping_add(stream.wrapping_mul(0x9E3779B97F4A7C15))
    }

    fn stream_rng(&self, ordinal: usize, phase: u64) -> StdRng {
        StdRng::seed_from_u64(self.compute_stream_seed(ordinal, phase))
    }

    /// Generate the full dataset and validate its invariants.
    pub fn generate(&self) -> Result<Dataset, GeneratorError> {
        let regions = self.catalog.all();
        let assigner = RegionAssigner::new(self.catalog);

        let mut partitions: Vec<Vec<Entity>> = Vec::with_capacity(regions.len());
        let mut pools: Vec<RegionPool> = Vec::with_capacity(regions.len());

        for (ordinal, region) in regions.iter().enumerate() {
            let mut rng = self.stream_rng(ordinal, PHASE_INDEPENDENT);
            let (entities, pool) =
                self.generate_independent(&assigner, region, ordinal as u8, &mut rng)?;
            debug!(
                "Generated {} independent entities for region {}",
                entities.len(),
                region.id
            );
            partitions.push(entities);
            pools.push(pool);
        }

        for (ordinal, region) in regions.iter().enumerate() {
            let mut rng = self.stream_rng(ordinal, PHASE_RIDES);
            let rides = self.generate_rides(&assigner, region, ordinal, &pools, &mut rng)?;
            info!(
                "Generated region {}: {} riders, {} drivers, {} rides",
                region.id,
                pools[ordinal].riders.len(),
                pools[ordinal].drivers.len(),
                rides.len()
            );
            partitions[ordinal].extend(rides);
        }

        let meta = DatasetMeta {
            seed: self.config.seed,
            scale: self.config.scale,
            pairing: self.config.pairing,
            as_of: self.config.as_of,
            regions: regions.iter().map(|r| r.id.clone()).collect(),
        };
        let partitions = regions
            .iter()
            .zip(partitions)
            .map(|(region, entities)| RegionPartition::new(region.id.clone(), entities))
            .collect();

        let dataset = Dataset::new(meta, partitions);
        dataset.validate(self.catalog)?;
        Ok(dataset)
    }

    fn generate_independent(
        &self,
        assigner: &RegionAssigner<'_>,
        region: &Region,
        ordinal: u8,
        rng: &mut StdRng,
    ) -> Result<(Vec<Entity>, RegionPool), GeneratorError> {
        let scale = &self.config.scale;
        let capacity = 1 + scale.riders as usize + 2 * scale.drivers as usize + scale.rides as usize;
        let mut entities = Vec::with_capacity(capacity);
        let mut pool = RegionPool::default();

        entities.push(Entity::Region(RegionRecord {
            region_id: EntityId::for_region(ordinal),
            region_code: region.id.clone(),
            name: region.name.clone(),
            lat_min: region.bounds.lat_min,
            lat_max: region.bounds.lat_max,
            lon_min: region.bounds.lon_min,
            lon_max: region.bounds.lon_max,
            node_count: NODES_PER_REGION,
            primary_node: region.primary_node(),
            created_at: self.config.as_of,
        }));

        for index in 0..scale.riders as usize {
            let rider = self.generate_rider(assigner, region, ordinal, index, rng)?;
            pool.riders
                .push((rider.user_id, Coordinate::new(rider.latitude, rider.longitude)));
            entities.push(Entity::Rider(rider));
        }

        let mut drivers = Vec::with_capacity(scale.drivers as usize);
        for index in 0..scale.drivers as usize {
            drivers.push(self.generate_driver(assigner, region, ordinal, index, rng)?);
        }

        let vehicles: Vec<Vehicle> = drivers
            .iter()
            .map(|driver| self.generate_vehicle(region, ordinal, driver.driver_id, rng))
            .collect();

        pool.drivers = drivers
            .iter()
            .zip(&vehicles)
            .map(|(d, v)| (d.driver_id, v.vehicle_id))
            .collect();
        entities.extend(drivers.into_iter().map(Entity::Driver));
        entities.extend(vehicles.into_iter().map(Entity::Vehicle));

        Ok((entities, pool))
    }

    /// Sample a home location and confirm it assigns back to `region`.
    fn sample_home(
        &self,
        assigner: &RegionAssigner<'_>,
        region: &Region,
        rng: &mut StdRng,
    ) -> Result<Coordinate, GeneratorError> {
        let point = assigner.sample_in(region, rng);
        let assigned = assigner.assign(point)?;
        if assigned.id != region.id {
            return Err(GeneratorError::MisassignedCoordinate {
                expected: region.id.clone(),
                actual: assigned.id.clone(),
                lat: point.lat,
                lon: point.lon,
            });
        }
        Ok(point)
    }

    fn generate_rider(
        &self,
        assigner: &RegionAssigner<'_>,
        region: &Region,
        ordinal: u8,
        index: usize,
        rng: &mut StdRng,
    ) -> Result<Rider, GeneratorError> {
        let user_id = generate_entity_id(rng, ordinal, EntityKind::Rider);
        let home = self.sample_home(assigner, region, rng)?;
        let name = generate_name(rng);
        let email = generate_email(rng, &name, "rider", &region.id, index);

        Ok(Rider {
            user_id,
            email,
            phone: generate_phone(rng, &region.id),
            name,
            latitude: home.lat,
            longitude: home.lon,
            region: region.id.clone(),
            rating: generate_rating(rng, 3.5, 5.0),
            total_rides: generate_int_range(rng, 0, 100),
            created_at: generate_timestamp_before(
                rng,
                self.config.as_of,
                Duration::days(ACCOUNT_AGE_DAYS),
            ),
        })
    }

    fn generate_driver(
        &self,
        assigner: &RegionAssigner<'_>,
        region: &Region,
        ordinal: u8,
        index: usize,
        rng: &mut StdRng,
    ) -> Result<Driver, GeneratorError> {
        let driver_id = generate_entity_id(rng, ordinal, EntityKind::Driver);
        let home = self.sample_home(assigner, region, rng)?;
        let name = generate_name(rng);
        let email = generate_email(rng, &name, "driver", &region.id, index);

        Ok(Driver {
            driver_id,
            email,
            phone: generate_phone(rng, &region.id),
            name,
            latitude: home.lat,
            longitude: home.lon,
            region: region.id.clone(),
            geohash: geohash::encode(home, DEFAULT_PRECISION),
            availability: Availability::ALL[rng.gen_range(0..Availability::ALL.len())],
            rating: generate_rating(rng, 4.0, 5.0),
            total_rides: generate_int_range(rng, 0, 500),
            created_at: generate_timestamp_before(
                rng,
                self.config.as_of,
                Duration::days(ACCOUNT_AGE_DAYS),
            ),
        })
    }

    fn generate_vehicle(
        &self,
        region: &Region,
        ordinal: u8,
        driver_id: EntityId,
        rng: &mut StdRng,
    ) -> Vehicle {
        let vehicle_id = generate_entity_id(rng, ordinal, EntityKind::Vehicle);
        let attrs = generate_vehicle_attributes(rng);

        Vehicle {
            vehicle_id,
            driver_id,
            region: region.id.clone(),
            vehicle_type: attrs.vehicle_type,
            brand: attrs.brand,
            color: attrs.color,
            license_plate: generate_license_plate(rng, &region.id),
            created_at: generate_timestamp_before(
                rng,
                self.config.as_of,
                Duration::days(ACCOUNT_AGE_DAYS),
            ),
        }
    }

    fn generate_rides(
        &self,
        assigner: &RegionAssigner<'a>,
        region: &'a Region,
        ordinal: usize,
        pools: &[RegionPool],
        rng: &mut StdRng,
    ) -> Result<Vec<Entity>, GeneratorError> {
        let home = &pools[ordinal];
        let count = self.config.scale.rides as usize;
        let mut rides = Vec::with_capacity(count);

        for _ in 0..count {
            let ride_id = generate_entity_id(rng, ordinal as u8, EntityKind::Ride);
            let (user_id, origin) = home.riders[rng.gen_range(0..home.riders.len())];

            let paired = assigner.pair_region(region, &self.config.pairing, rng);
            let paired_pool = &pools[self.catalog.ordinal(&paired.id)?];
            let driver_pool = if paired_pool.drivers.is_empty() {
                &home.drivers
            } else {
                &paired_pool.drivers
            };
            let candidate = if driver_pool.is_empty() {
                None
            } else {
                Some(driver_pool[rng.gen_range(0..driver_pool.len())])
            };

            let (pickup, dropoff) = generate_route(rng, origin, &region.bounds);
            let status = match candidate {
                Some(_) => generate_status(rng),
                None => RideStatus::Requested,
            };
            let assignment = candidate.filter(|_| status != RideStatus::Requested);
            let metrics = trip_metrics(pickup, dropoff, rng.gen_range(5..=15), status);

            rides.push(Entity::Ride(Ride {
                ride_id,
                user_id,
                driver_id: assignment.map(|(driver, _)| driver),
                vehicle_id: assignment.map(|(_, vehicle)| vehicle),
                pickup_lat: pickup.lat,
                pickup_lon: pickup.lon,
                dropoff_lat: dropoff.lat,
                dropoff_lon: dropoff.lon,
                region: region.id.clone(),
                pickup_geohash: geohash::encode(pickup, DEFAULT_PRECISION),
                status,
                price: metrics.price,
                distance_km: metrics.distance_km,
                duration_minutes: metrics.duration_minutes,
                requested_at: generate_timestamp_before(
                    rng,
                    self.config.as_of,
                    Duration::days(RIDE_WINDOW_DAYS),
                ),
            }));
        }

        Ok(rides)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_core::{CatalogFile, Endpoint, RegionalEntity};
    use std::collections::HashSet;

    fn catalog() -> RegionCatalog {
        RegionCatalog::from_specs(CatalogFile::default_layout().regions, |spec| {
            Ok(Endpoint::new("localhost", spec.local_port.unwrap_or(26257)))
        })
        .unwrap()
    }

    fn small_config(seed: u64) -> GeneratorConfig {
        GeneratorConfig {
            seed,
            scale: ScaleCounts::new(20, 10, 30),
            ..GeneratorConfig::default()
        }
    }

    #[test]
    fn test_local_scale_counts() {
        let catalog = catalog();
        let generator = DataGenerator::new(&catalog, GeneratorConfig::default()).unwrap();
        let dataset = generator.generate().unwrap();

        assert_eq!(dataset.count(EntityKind::Region), 4);
        assert_eq!(dataset.count(EntityKind::Rider), 400);
        assert_eq!(dataset.count(EntityKind::Driver), 400);
        assert_eq!(dataset.count(EntityKind::Vehicle), 400);
        assert_eq!(dataset.count(EntityKind::Ride), 600);

        for partition in dataset.partitions() {
            assert!(partition.is_dependency_ordered());
            assert_eq!(partition.count(EntityKind::Ride), 150);
            for entity in partition.entities() {
                assert_eq!(entity.region_of(), partition.region());
            }
        }
    }

    #[test]
    fn test_deterministic_generation() {
        let catalog = catalog();

        let first = DataGenerator::new(&catalog, small_config(42))
            .unwrap()
            .generate()
            .unwrap();
        let second = DataGenerator::new(&catalog, small_config(42))
            .unwrap()
            .generate()
            .unwrap();

        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_different_seeds_have_disjoint_ids() {
        let catalog = catalog();
        let ids = |seed| -> HashSet<EntityId> {
            DataGenerator::new(&catalog, small_config(seed))
                .unwrap()
                .generate()
                .unwrap()
                .partitions()
                .iter()
                .flat_map(|p| p.entities().iter().map(|e| e.identifier()))
                .collect()
        };

        let a = ids(42);
        let b = ids(43);
        let shared: HashSet<EntityId> = a.intersection(&b).copied().collect();
        let region_ids: HashSet<EntityId> = (0..4).map(EntityId::for_region).collect();
        assert_eq!(shared, region_ids);
    }

    #[test]
    fn test_ride_invariants() {
        let catalog = catalog();
        let dataset = DataGenerator::new(&catalog, GeneratorConfig::default())
            .unwrap()
            .generate()
            .unwrap();

        for partition in dataset.partitions() {
            let region = catalog.resolve(partition.region()).unwrap();
            for entity in partition.of_kind(EntityKind::Ride) {
                let Entity::Ride(ride) = entity else {
                    panic!("Expected ride, got {entity:?}");
                };
                assert_eq!(ride.driver_id.is_none(), ride.status == RideStatus::Requested);
                assert_eq!(ride.driver_id.is_none(), ride.vehicle_id.is_none());
                if ride.status != RideStatus::Completed {
                    assert_eq!(ride.price, 0.0);
                }
                assert!(region
                    .bounds
                    .contains(&Coordinate::new(ride.pickup_lat, ride.pickup_lon)));
                assert_eq!(ride.pickup_geohash.len(), DEFAULT_PRECISION);
                assert!(ride.requested_at <= dataset.meta().as_of);
            }
        }
        assert!(!dataset.has_cross_region_references());
    }

    #[test]
    fn test_border_pairing_produces_cross_region_rides() {
        let catalog = catalog();
        let config = GeneratorConfig {
            pairing: PairingPolicy::new(0.5).unwrap(),
            ..small_config(42)
        };
        let dataset = DataGenerator::new(&catalog, config).unwrap().generate().unwrap();

        assert!(dataset.has_cross_region_references());
        dataset.validate(&catalog).unwrap();
    }

    #[test]
    fn test_regions_are_independent_streams() {
        let catalog = catalog();
        let full = DataGenerator::new(&catalog, small_config(42))
            .unwrap()
            .generate()
            .unwrap();

        // Dropping a later region does not change earlier regions' output
        let mut file = CatalogFile::default_layout();
        file.regions.truncate(2);
        let smaller = RegionCatalog::from_specs(file.regions, |spec| {
            Ok(Endpoint::new("localhost", spec.local_port.unwrap_or(26257)))
        })
        .unwrap();
        let partial = DataGenerator::new(&smaller, small_config(42))
            .unwrap()
            .generate()
            .unwrap();

        assert_eq!(
            full.partition("us-east").unwrap().of_kind(EntityKind::Rider),
            partial.partition("us-east").unwrap().of_kind(EntityKind::Rider)
        );
    }

    #[test]
    fn test_no_drivers_means_requested_rides() {
        let catalog = catalog();
        let config = GeneratorConfig {
            scale: ScaleCounts::new(5, 0, 10),
            ..GeneratorConfig::default()
        };
        let dataset = DataGenerator::new(&catalog, config).unwrap().generate().unwrap();

        assert_eq!(dataset.count(EntityKind::Vehicle), 0);
        for partition in dataset.partitions() {
            for entity in partition.of_kind(EntityKind::Ride) {
                if let Entity::Ride(ride) = entity {
                    assert_eq!(ride.status, RideStatus::Requested);
                }
            }
        }
    }

    #[test]
    fn test_invalid_scale() {
        let catalog = catalog();
        let config = GeneratorConfig {
            scale: ScaleCounts::new(0, 10, 10),
            ..GeneratorConfig::default()
        };
        assert!(matches!(
            DataGenerator::new(&catalog, config),
            Err(GeneratorError::InvalidScale(_))
        ));
    }

    #[test]
    fn test_emails_unique() {
        let catalog = catalog();
        let dataset = DataGenerator::new(&catalog, GeneratorConfig::default())
            .unwrap()
            .generate()
            .unwrap();

        let mut seen = HashSet::new();
        for partition in dataset.partitions() {
            for entity in partition.entities() {
                let email = match entity {
                    Entity::Rider(r) => &r.email,
                    Entity::Driver(d) => &d.email,
                    _ => continue,
                };
                assert!(seen.insert(email.clone()), "duplicate email {email}");
            }
        }
    }
}
