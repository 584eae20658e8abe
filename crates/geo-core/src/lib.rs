//! Core types for the rideshare-geo loader.
//!
//! This crate provides the geographic and entity model shared by the
//! generator, the load pipeline and the CLI:
//!
//! - [`RegionCatalog`] - Validated, ordered set of regions with endpoints
//! - [`RegionAssigner`] - Point-in-box assignment and cross-region pairing
//! - [`geohash`] - Geohash cells for driver search and ride pickups
//! - [`Entity`] - The closed set of generated entity variants
//! - [`Dataset`] - A generated dataset partitioned by home region
//!
//! # Architecture
//!
//! ```text
//! geo-core (this crate)
//!    │
//!    ├─── rideshare-generator  (seeded generation of a Dataset)
//!    │
//!    ├─── rideshare-load       (per-region upsert/clear workers)
//!    │
//!    └─── rideshare-geo        (CLI, config, spool, run coordinator)
//! ```

pub mod assignment;
pub mod catalog;
pub mod dataset;
pub mod entity;
pub mod geohash;
pub mod region;

pub use assignment::{round_coordinate, AssignmentError, PairingPolicy, RegionAssigner};
pub use catalog::{CatalogError, CatalogFile, RegionCatalog};
pub use dataset::{Dataset, DatasetMeta, InvariantViolation, RegionPartition, ScaleCounts};
pub use entity::{
    Availability, ColumnValue, Driver, Entity, EntityId, EntityKind, Reference, RegionRecord,
    RegionalEntity, Ride, RideStatus, Rider, Tier, Vehicle,
};
pub use region::{BoundingBox, City, Coordinate, Endpoint, Region, RegionSpec};
