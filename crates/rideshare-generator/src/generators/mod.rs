//! Individual value generators used to build entities.
//!
//! Every generator draws from a caller-supplied RNG so that the whole
//! dataset is a pure function of the seed.

pub mod id;
pub mod numeric;
pub mod person;
pub mod timestamp;
pub mod trip;
pub mod vehicle;
