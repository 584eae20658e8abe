//! Data generator for the rideshare-geo loader.
//!
//! This crate provides the `DataGenerator` which produces a deterministic,
//! region-partitioned ride-sharing dataset from a [`RegionCatalog`]. Every
//! region draws from its own seeded RNG streams, so the same seed, scale,
//! catalog, pairing policy and reference instant always produce the same
//! dataset.
//!
//! # Architecture
//!
//! ```text
//! RegionCatalog + GeneratorConfig
//!        │
//!        ▼
//! ┌──────────────────────────┐
//! │      DataGenerator       │
//! │                          │
//! │  phase 0, per region:    │
//! │    region, riders,       │
//! │    drivers, vehicles     │
//! │  phase 1, per region:    │
//! │    rides (pairing policy)│
//! └────────────┬─────────────┘
//!              │  validate()
//!              ▼
//!    Dataset { meta, partitions[region] }
//! ```
//!
//! # Example
//!
//! ```rust
//! use geo_core::{CatalogFile, Endpoint, EntityKind, RegionCatalog};
//! use rideshare_generator::{DataGenerator, GeneratorConfig};
//!
//! let catalog = RegionCatalog::from_specs(CatalogFile::default_layout().regions, |spec| {
//!     Ok(Endpoint::new("localhost", spec.local_port.unwrap_or(26257)))
//! })
//! .unwrap();
//!
//! let generator = DataGenerator::new(&catalog, GeneratorConfig::default()).unwrap();
//! let dataset = generator.generate().unwrap();
//! assert_eq!(dataset.count(EntityKind::Ride), 600);
//! ```
//!
//! [`RegionCatalog`]: geo_core::RegionCatalog

pub mod generator;
pub mod generators;
pub mod scale;

// Re-exports for convenience
pub use generator::{DataGenerator, GeneratorConfig, GeneratorError};
pub use generators::timestamp::{default_as_of, parse_timestamp};
pub use scale::ScalePreset;
