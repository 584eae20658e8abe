//! Regions and their geographic definitions.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometres, used for great-circle distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance to `other` in kilometres (haversine).
    pub fn distance_km(&self, other: &Coordinate) -> f64 {
        let (lat1, lon1) = (self.lat.to_radians(), self.lon.to_radians());
        let (lat2, lon2) = (other.lat.to_radians(), other.lon.to_radians());
        let dlat = lat2 - lat1;
        let dlon = lon2 - lon1;

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_KM * c
    }
}

/// Half-open bounding box: `[lat_min, lat_max) x [lon_min, lon_max)`.
///
/// Boxes that merely share an edge do not overlap, so adjacent regions can
/// be laid out edge to edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl BoundingBox {
    pub fn new(lat_min: f64, lat_max: f64, lon_min: f64, lon_max: f64) -> Self {
        Self {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
        }
    }

    /// Whether the box is non-empty and lies within valid degree ranges.
    pub fn is_well_formed(&self) -> bool {
        let finite = [self.lat_min, self.lat_max, self.lon_min, self.lon_max]
            .iter()
            .all(|v| v.is_finite());

        finite
            && self.lat_min < self.lat_max
            && self.lon_min < self.lon_max
            && self.lat_min >= -90.0
            && self.lat_max <= 90.0
            && self.lon_min >= -180.0
            && self.lon_max <= 180.0
    }

    pub fn contains(&self, point: &Coordinate) -> bool {
        point.lat >= self.lat_min
            && point.lat < self.lat_max
            && point.lon >= self.lon_min
            && point.lon < self.lon_max
    }

    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        self.lat_min < other.lat_max
            && other.lat_min < self.lat_max
            && self.lon_min < other.lon_max
            && other.lon_min < self.lon_max
    }

    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.lat_min + self.lat_max) / 2.0,
            (self.lon_min + self.lon_max) / 2.0,
        )
    }

    /// Clamp a point into the box, keeping it strictly below the exclusive
    /// upper edges by `margin` degrees.
    pub fn clamp(&self, point: Coordinate, margin: f64) -> Coordinate {
        Coordinate::new(
            point.lat.clamp(self.lat_min, self.lat_max - margin),
            point.lon.clamp(self.lon_min, self.lon_max - margin),
        )
    }
}

/// Database endpoint for a region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.host.trim().is_empty() || self.port == 0
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Anchor city used to cluster synthetic coordinates inside a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl City {
    pub fn new(name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            name: name.into(),
            lat,
            lon,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lon)
    }
}

/// Geometry-only region definition, as read from a catalog file.
///
/// Endpoints are resolved separately (usually from the environment) and
/// attached with [`RegionSpec::with_endpoint`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSpec {
    /// Region identifier; must match the database's region name.
    pub id: String,

    /// Human readable name
    pub name: String,

    pub bounds: BoundingBox,

    /// Explicit neighbours for border-traffic pairing.
    #[serde(default)]
    pub adjacent: Vec<String>,

    #[serde(default)]
    pub cities: Vec<City>,

    /// Port of the region's node in a local cluster.
    #[serde(default)]
    pub local_port: Option<u16>,

    /// Fixed endpoint, overriding environment resolution.
    #[serde(default)]
    pub endpoint: Option<Endpoint>,
}

impl RegionSpec {
    pub fn with_endpoint(self, endpoint: Endpoint) -> Region {
        Region {
            id: self.id,
            name: self.name,
            bounds: self.bounds,
            adjacent: self.adjacent,
            cities: self.cities,
            endpoint,
        }
    }
}

/// A fully configured region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    pub name: String,
    pub bounds: BoundingBox,
    pub adjacent: Vec<String>,
    pub cities: Vec<City>,
    pub endpoint: Endpoint,
}

impl Region {
    /// Name of the node acting as primary in the region's cluster.
    pub fn primary_node(&self) -> String {
        format!("{}-primary", self.id)
    }
}
