//! Per-region batched load and clear pipeline for the rideshare-geo loader.
//!
//! Each region gets a worker that writes its partition to the region's own
//! endpoint through a [`RegionSink`]. Rows are upserted in batches, one
//! transaction per batch, so loads are idempotent and a failed run is healed
//! by running it again.
//!
//! ```text
//!              LoadPipeline
//!                   │ one task per region (JoinSet)
//!     ┌─────────────┼──────────────┐
//!     ▼             ▼              ▼
//!  worker        worker  ...    worker
//!  regions,users,drivers,vehicles    (independent tier)
//!     ├ ─ ─ ─ ─ barrier (border pairing only) ─ ─ ─ ┤
//!  rides                              (dependent tier)
//!     │             │              │
//!     ▼             ▼              ▼
//!  PostgresSink  PostgresSink   PostgresSink   (or MemorySink)
//! ```
//!
//! Transient errors (serialization conflicts, lost connections) are retried
//! with exponential backoff. Anything else stops the region and is reported
//! as a [`BatchFailure`] in the [`PipelineReport`].

pub mod args;
pub mod error;
pub mod memory;
pub mod pipeline;
pub mod pool;
pub mod postgres;
pub mod report;
pub mod retry;
pub mod sink;
pub mod sql;
pub mod verify;

pub use args::PipelineArgs;
pub use error::LoadError;
pub use memory::{FaultKind, MemoryDatabase, MemorySink};
pub use pipeline::{LoadMode, LoadPipeline, PipelineConfig, RegionJob, DEFAULT_POOL_SIZE};
pub use pool::{ConnectionPool, ConnectionSettings};
pub use postgres::PostgresSink;
pub use report::{BatchFailure, PipelineReport, RegionOutcome};
pub use retry::RetryPolicy;
pub use sink::{PlacementCount, RegionSink};
pub use sql::DEFAULT_BATCH_SIZE;
pub use verify::{verify_distribution, VerificationReport};
