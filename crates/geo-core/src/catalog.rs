//! The region catalog.
//!
//! A [`RegionCatalog`] is built once at process start and is immutable for
//! the rest of the run. Construction validates everything the rest of the
//! pipeline relies on:
//!
//! - at least one region, with unique non-empty identifiers
//! - well formed, pairwise disjoint bounding boxes (so point assignment is
//!   unambiguous)
//! - a non-empty endpoint for every region
//! - adjacency lists that only name known regions
//!
//! Regions without an explicit adjacency list are paired with the region
//! whose box centre is nearest.

use crate::region::{BoundingBox, City, Endpoint, Region, RegionSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Error type for catalog construction and lookup.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The catalog has no regions
    #[error("Configuration error: region catalog is empty")]
    Empty,

    /// A region has an empty identifier
    #[error("Configuration error: region at position {0} has an empty id")]
    EmptyId(usize),

    /// Two regions share an identifier
    #[error("Configuration error: duplicate region id '{0}'")]
    DuplicateRegion(String),

    /// A bounding box is empty or out of range
    #[error("Configuration error: region '{0}' has an invalid bounding box")]
    InvalidBounds(String),

    /// Two bounding boxes overlap
    #[error("Configuration error: bounding boxes of '{first}' and '{second}' overlap")]
    OverlappingRegions { first: String, second: String },

    /// A region has no usable endpoint
    #[error("Configuration error: region '{0}' has no database endpoint")]
    MissingEndpoint(String),

    /// An endpoint value could not be parsed
    #[error("Configuration error: region '{region}' has an invalid endpoint: {reason}")]
    InvalidEndpoint { region: String, reason: String },

    /// An adjacency list names a region that is not in the catalog
    #[error("Configuration error: region '{region}' lists unknown neighbour '{neighbour}'")]
    UnknownNeighbour { region: String, neighbour: String },

    /// Lookup of a region id that is not in the catalog
    #[error("Unknown region: {0}")]
    UnknownRegion(String),

    /// Error reading a catalog file
    #[error("Failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    /// Error parsing a catalog file
    #[error("Failed to parse catalog YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CatalogError {
    /// Whether this error is a pre-flight configuration error.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, CatalogError::UnknownRegion(_))
    }
}

/// Region definitions as stored in a YAML catalog file.
///
/// ```yaml
/// regions:
///   - id: us-east
///     name: US East Coast
///     bounds: { lat_min: 25.0, lat_max: 45.0, lon_min: -80.0, lon_max: -65.0 }
///     local_port: 26201
///     adjacent: [us-west]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogFile {
    pub regions: Vec<RegionSpec>,
}

impl CatalogFile {
    pub fn from_yaml(yaml: &str) -> Result<Self, CatalogError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// The four-region layout of the ride-sharing cluster.
    pub fn default_layout() -> Self {
        Self {
            regions: vec![
                spec(
                    "us-east",
                    "US East Coast",
                    BoundingBox::new(25.0, 45.0, -80.0, -65.0),
                    26201,
                    vec![
                        City::new("New York", 40.7128, -74.0060),
                        City::new("Boston", 42.3601, -71.0589),
                        City::new("Miami", 25.7617, -80.1918),
                        City::new("Philadelphia", 39.9526, -75.1652),
                        City::new("Washington DC", 38.9072, -77.0369),
                    ],
                ),
                spec(
                    "us-west",
                    "US West Coast",
                    BoundingBox::new(30.0, 50.0, -125.0, -110.0),
                    26204,
                    vec![
                        City::new("Los Angeles", 34.0522, -118.2437),
                        City::new("San Francisco", 37.7749, -122.4194),
                        City::new("Seattle", 47.6062, -122.3321),
                        City::new("San Diego", 32.7157, -117.1611),
                        City::new("Portland", 45.5152, -122.6784),
                    ],
                ),
                spec(
                    "eu-central",
                    "Central Europe",
                    BoundingBox::new(45.0, 55.0, 5.0, 15.0),
                    26207,
                    vec![
                        City::new("Berlin", 52.5200, 13.4050),
                        City::new("Munich", 48.1351, 11.5820),
                        City::new("Frankfurt", 50.1109, 8.6821),
                        City::new("Zurich", 47.3769, 8.5417),
                        City::new("Vienna", 48.2082, 16.3738),
                    ],
                ),
                spec(
                    "ap-south",
                    "South Asia",
                    BoundingBox::new(10.0, 25.0, 70.0, 90.0),
                    26210,
                    vec![
                        City::new("Mumbai", 19.0760, 72.8777),
                        City::new("Delhi", 28.6139, 77.2090),
                        City::new("Bangalore", 12.9716, 77.5946),
                        City::new("Chennai", 13.0827, 80.2707),
                        City::new("Kolkata", 22.5726, 88.3639),
                    ],
                ),
            ],
        }
    }
}

fn spec(id: &str, name: &str, bounds: BoundingBox, port: u16, cities: Vec<City>) -> RegionSpec {
    RegionSpec {
        id: id.to_string(),
        name: name.to_string(),
        bounds,
        adjacent: Vec::new(),
        cities,
        local_port: Some(port),
        endpoint: None,
    }
}

/// Immutable, validated set of regions in configured order.
#[derive(Debug, Clone)]
pub struct RegionCatalog {
    regions: Vec<Region>,
    index: HashMap<String, usize>,
    adjacency: Vec<Vec<usize>>,
}

impl RegionCatalog {
    /// Validate and build a catalog.
    pub fn new(regions: Vec<Region>) -> Result<Self, CatalogError> {
        if regions.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut index = HashMap::with_capacity(regions.len());
        for (i, region) in regions.iter().enumerate() {
            if region.id.trim().is_empty() {
                return Err(CatalogError::EmptyId(i));
            }
            if index.insert(region.id.clone(), i).is_some() {
                return Err(CatalogError::DuplicateRegion(region.id.clone()));
            }
            if !region.bounds.is_well_formed() {
                return Err(CatalogError::InvalidBounds(region.id.clone()));
            }
            if region.endpoint.is_empty() {
                return Err(CatalogError::MissingEndpoint(region.id.clone()));
            }
        }

        for (i, first) in regions.iter().enumerate() {
            for second in &regions[i + 1..] {
                if first.bounds.overlaps(&second.bounds) {
                    return Err(CatalogError::OverlappingRegions {
                        first: first.id.clone(),
                        second: second.id.clone(),
                    });
                }
            }
        }

        let adjacency = build_adjacency(&regions, &index)?;
        for (region, neighbours) in regions.iter().zip(&adjacency) {
            tracing::debug!(
                "Region {} at {} adjacent to {:?}",
                region.id,
                region.endpoint,
                neighbours.iter().map(|&n| regions[n].id.as_str()).collect::<Vec<_>>()
            );
        }

        Ok(Self {
            regions,
            index,
            adjacency,
        })
    }

    /// Build a catalog from geometry specs, resolving each endpoint with
    /// `endpoint_for`.
    pub fn from_specs<F>(specs: Vec<RegionSpec>, mut endpoint_for: F) -> Result<Self, CatalogError>
    where
        F: FnMut(&RegionSpec) -> Result<Endpoint, CatalogError>,
    {
        let regions = specs
            .into_iter()
            .map(|spec| {
                let endpoint = endpoint_for(&spec)?;
                Ok(spec.with_endpoint(endpoint))
            })
            .collect::<Result<Vec<_>, CatalogError>>()?;
        Self::new(regions)
    }

    pub fn resolve(&self, region_id: &str) -> Result<&Region, CatalogError> {
        self.index
            .get(region_id)
            .map(|&i| &self.regions[i])
            .ok_or_else(|| CatalogError::UnknownRegion(region_id.to_string()))
    }

    /// All regions in configured order.
    pub fn all(&self) -> &[Region] {
        &self.regions
    }

    pub fn ids(&self) -> Vec<&str> {
        self.regions.iter().map(|r| r.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn contains(&self, region_id: &str) -> bool {
        self.index.contains_key(region_id)
    }

    /// Position of a region in catalog order.
    pub fn ordinal(&self, region_id: &str) -> Result<usize, CatalogError> {
        self.index
            .get(region_id)
            .copied()
            .ok_or_else(|| CatalogError::UnknownRegion(region_id.to_string()))
    }

    /// Regions adjacent to `region_id` for border-traffic pairing.
    pub fn adjacent(&self, region_id: &str) -> Result<Vec<&Region>, CatalogError> {
        let i = self.ordinal(region_id)?;
        Ok(self.adjacency[i].iter().map(|&j| &self.regions[j]).collect())
    }

    pub fn are_adjacent(&self, a: &str, b: &str) -> bool {
        match (self.index.get(a), self.index.get(b)) {
            (Some(&i), Some(&j)) => self.adjacency[i].contains(&j),
            _ => false,
        }
    }
}

fn build_adjacency(
    regions: &[Region],
    index: &HashMap<String, usize>,
) -> Result<Vec<Vec<usize>>, CatalogError> {
    let mut adjacency = Vec::with_capacity(regions.len());

    for (i, region) in regions.iter().enumerate() {
        let neighbours = if region.adjacent.is_empty() {
            nearest_region(regions, i).into_iter().collect()
        } else {
            region
                .adjacent
                .iter()
                .filter(|n| *n != &region.id)
                .map(|n| {
                    index
                        .get(n)
                        .copied()
                        .ok_or_else(|| CatalogError::UnknownNeighbour {
                            region: region.id.clone(),
                            neighbour: n.clone(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?
        };
        adjacency.push(neighbours);
    }

    Ok(adjacency)
}

fn nearest_region(regions: &[Region], i: usize) -> Option<usize> {
    let center = regions[i].bounds.center();
    regions
        .iter()
        .enumerate()
        .filter(|(j, _)| *j != i)
        .map(|(j, r)| (j, center.distance_km(&r.bounds.center())))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(j, _)| j)
}
