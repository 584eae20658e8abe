//! rideshare-geo
//!
//! Generates a deterministic ride-sharing dataset partitioned by geographic
//! region and loads it into a multi-region database, each region's rows
//! written to that region's own endpoint.
//!
//! # Crates
//!
//! - `geo_core` - region catalog, point-to-region assignment, entity types
//!   and dataset invariants
//! - `rideshare_generator` - seeded, per-region data generation
//! - `rideshare_load` - batched upsert/clear pipeline, sinks, verification
//!
//! # CLI Usage
//!
//! ```bash
//! # Generate and spool the local-scale dataset
//! rideshare-geo generate --output generated_data
//!
//! # Load it into the cluster, clearing previous rows first
//! rideshare-geo load --input generated_data --clear
//!
//! # Check row distribution per region
//! rideshare-geo verify
//! ```

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod spool;

pub use config::{build_catalog, DatabaseArgs, Environment};
pub use coordinator::{dataset_table, memory_sinks, postgres_sinks, RunCoordinator, RunSummary};
pub use spool::{read_spool, write_spool, SpoolManifest};
