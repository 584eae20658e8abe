//! Numeric value generators.

use rand::Rng;

/// Generate a random integer in the given range (inclusive).
pub fn generate_int_range<R: Rng>(rng: &mut R, min: i64, max: i64) -> i64 {
    rng.gen_range(min..=max)
}

/// Generate a random float in the given range (inclusive), rounded to 2
/// decimal places.
pub fn generate_rating<R: Rng>(rng: &mut R, min: f64, max: f64) -> f64 {
    round2(rng.gen_range(min..=max))
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
