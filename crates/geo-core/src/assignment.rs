//! Region assignment: mapping coordinates to regions and pairing regions
//! for rides.

use crate::catalog::RegionCatalog;
use crate::region::{Coordinate, Region};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Jitter applied around an anchor city, in degrees.
pub const CITY_JITTER_DEG: f64 = 0.1;

/// Coordinates are stored with 6 decimal places.
const COORDINATE_SCALE: f64 = 1_000_000.0;

/// Keeps sampled points strictly below the exclusive upper box edges.
const EDGE_MARGIN_DEG: f64 = 1e-6;

/// Error type for region assignment.
#[derive(Debug, thiserror::Error)]
pub enum AssignmentError {
    /// The coordinate lies outside every region's bounding box
    #[error("No region for coordinate ({lat}, {lon})")]
    NoRegionForCoordinate { lat: f64, lon: f64 },

    /// Border-traffic probability outside [0, 1]
    #[error("Configuration error: border probability must be within [0, 1], got {0}")]
    InvalidProbability(f64),
}

/// Cross-region ride pairing policy.
///
/// With probability `border_probability` a ride's driver is drawn from a
/// region adjacent to the rider's; otherwise from the rider's own region.
/// The default is same-region only.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PairingPolicy {
    border_probability: f64,
}

impl PairingPolicy {
    pub fn new(border_probability: f64) -> Result<Self, AssignmentError> {
        if !(0.0..=1.0).contains(&border_probability) {
            return Err(AssignmentError::InvalidProbability(border_probability));
        }
        Ok(Self { border_probability })
    }

    pub fn same_region_only() -> Self {
        Self::default()
    }

    pub fn border_probability(&self) -> f64 {
        self.border_probability
    }

    pub fn allows_cross_region(&self) -> bool {
        self.border_probability > 0.0
    }
}

/// Deterministic point-in-box assignment over a catalog.
#[derive(Debug, Clone, Copy)]
pub struct RegionAssigner<'a> {
    catalog: &'a RegionCatalog,
}

impl<'a> RegionAssigner<'a> {
    pub fn new(catalog: &'a RegionCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &'a RegionCatalog {
        self.catalog
    }

    /// Return the region whose box contains `point`. Boxes are disjoint, so
    /// the first match in catalog order is the only match.
    pub fn assign(&self, point: Coordinate) -> Result<&'a Region, AssignmentError> {
        self.catalog
            .all()
            .iter()
            .find(|region| region.bounds.contains(&point))
            .ok_or(AssignmentError::NoRegionForCoordinate {
                lat: point.lat,
                lon: point.lon,
            })
    }

    /// Sample a coordinate inside `region`.
    ///
    /// Regions with anchor cities cluster points around a randomly chosen
    /// city; others sample uniformly over the box. The result is rounded to
    /// 6 decimals and always lies inside the region's box.
    pub fn sample_in<R: Rng>(&self, region: &Region, rng: &mut R) -> Coordinate {
        let bounds = &region.bounds;
        let raw = if region.cities.is_empty() {
            Coordinate::new(
                rng.gen_range(bounds.lat_min..bounds.lat_max),
                rng.gen_range(bounds.lon_min..bounds.lon_max),
            )
        } else {
            let city = &region.cities[rng.gen_range(0..region.cities.len())];
            Coordinate::new(
                city.lat + rng.gen_range(-CITY_JITTER_DEG..=CITY_JITTER_DEG),
                city.lon + rng.gen_range(-CITY_JITTER_DEG..=CITY_JITTER_DEG),
            )
        };

        let rounded = Coordinate::new(round_coordinate(raw.lat), round_coordinate(raw.lon));
        bounds.clamp(rounded, EDGE_MARGIN_DEG)
    }

    /// Pick the region a ride's driver comes from, given the rider's region.
    ///
    /// Always draws exactly one value from `rng` for the border decision so
    /// the stream stays aligned regardless of the policy.
    pub fn pair_region<R: Rng>(
        &self,
        home: &'a Region,
        policy: &PairingPolicy,
        rng: &mut R,
    ) -> &'a Region {
        let crosses = rng.gen_bool(policy.border_probability());
        if !crosses {
            return home;
        }

        match self.catalog.adjacent(&home.id) {
            Ok(neighbours) if !neighbours.is_empty() => {
                neighbours[rng.gen_range(0..neighbours.len())]
            }
            _ => home,
        }
    }
}

pub fn round_coordinate(value: f64) -> f64 {
    (value * COORDINATE_SCALE).round() / COORDINATE_SCALE
}
