//! Entity variants of the ride-sharing dataset.
//!
//! The set of variants is closed: [`Entity`] is a tagged enum over fixed
//! field records. Anything that needs to treat "all entities" uniformly
//! (the load pipeline, validation, the spool) goes through the
//! [`RegionalEntity`] capability trait.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Globally unique, partition-sortable entity identifier.
///
/// Layout (UUID version 8):
///
/// ```text
/// byte 0      region ordinal in the catalog
/// byte 1      entity kind tag
/// bytes 2..   seeded random bits (version/variant bits overwritten)
/// ```
///
/// Sorting ids groups rows by home region and then by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    pub fn from_parts(region_ordinal: u8, kind: EntityKind, random: [u8; 14]) -> Self {
        let mut buf = [0u8; 16];
        buf[0] = region_ordinal;
        buf[1] = kind.tag();
        buf[2..].copy_from_slice(&random);
        Self(Uuid::new_v8(buf))
    }

    /// Identifier of a region's own record. Depends only on the region, so
    /// every seed upserts the same `regions` row.
    pub fn for_region(region_ordinal: u8) -> Self {
        Self::from_parts(region_ordinal, EntityKind::Region, [0u8; 14])
    }

    pub fn region_ordinal(&self) -> u8 {
        self.0.as_bytes()[0]
    }

    pub fn kind_tag(&self) -> u8 {
        self.0.as_bytes()[1]
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for EntityId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Load tier. Independent kinds are loaded before dependent ones and
/// cleared after them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    Independent,
    Dependent,
}

/// Entity variant discriminant, one per database table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Region,
    Rider,
    Driver,
    Vehicle,
    Ride,
}

impl EntityKind {
    /// Insertion order. Clearing walks this in reverse.
    pub const LOAD_ORDER: [EntityKind; 5] = [
        EntityKind::Region,
        EntityKind::Rider,
        EntityKind::Driver,
        EntityKind::Vehicle,
        EntityKind::Ride,
    ];

    pub fn tag(&self) -> u8 {
        match self {
            EntityKind::Region => 0,
            EntityKind::Rider => 1,
            EntityKind::Driver => 2,
            EntityKind::Vehicle => 3,
            EntityKind::Ride => 4,
        }
    }

    /// Position in [`EntityKind::LOAD_ORDER`].
    pub fn load_position(&self) -> usize {
        self.tag() as usize
    }

    pub fn tier(&self) -> Tier {
        match self {
            EntityKind::Ride => Tier::Dependent,
            _ => Tier::Independent,
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Region => "regions",
            EntityKind::Rider => "users",
            EntityKind::Driver => "drivers",
            EntityKind::Vehicle => "vehicles",
            EntityKind::Ride => "rides",
        }
    }

    pub fn id_column(&self) -> &'static str {
        self.columns()[0]
    }

    /// Column holding the home region.
    pub fn region_column(&self) -> &'static str {
        match self {
            EntityKind::Region => "region_code",
            _ => "region",
        }
    }

    /// Whether the table is placed row by row from its region column
    /// (as opposed to a global table).
    pub fn is_regional_by_row(&self) -> bool {
        !matches!(self, EntityKind::Region)
    }

    /// Table columns, primary key first, in [`RegionalEntity::row_values`]
    /// order.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Region => &[
                "region_id",
                "region_code",
                "name",
                "lat_min",
                "lat_max",
                "lon_min",
                "lon_max",
                "node_count",
                "primary_node",
                "created_at",
            ],
            EntityKind::Rider => &[
                "user_id",
                "name",
                "email",
                "phone",
                "latitude",
                "longitude",
                "region",
                "rating",
                "total_rides",
                "created_at",
            ],
            EntityKind::Driver => &[
                "driver_id",
                "name",
                "email",
                "phone",
                "latitude",
                "longitude",
                "region",
                "geohash",
                "availability",
                "rating",
                "total_rides",
                "created_at",
            ],
            EntityKind::Vehicle => &[
                "vehicle_id",
                "driver_id",
                "region",
                "vehicle_type",
                "brand",
                "color",
                "license_plate",
                "created_at",
            ],
            EntityKind::Ride => &[
                "ride_id",
                "user_id",
                "driver_id",
                "vehicle_id",
                "pickup_lat",
                "pickup_lon",
                "dropoff_lat",
                "dropoff_lon",
                "region",
                "pickup_geohash",
                "status",
                "price",
                "distance_km",
                "duration_minutes",
                "timestamp",
            ],
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table())
    }
}

/// A single column value, typed for the database's column types.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Uuid(Uuid),
    NullableUuid(Option<Uuid>),
    Text(String),
    Float(f64),
    Int(i64),
    Timestamp(NaiveDateTime),
}

/// A foreign reference from one entity to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub kind: EntityKind,
    pub id: EntityId,
}

impl Reference {
    pub fn new(kind: EntityKind, id: EntityId) -> Self {
        Self { kind, id }
    }
}

/// Capability interface shared by every entity variant.
pub trait RegionalEntity {
    fn kind(&self) -> EntityKind;

    fn identifier(&self) -> EntityId;

    /// Home region id.
    fn region_of(&self) -> &str;

    /// Foreign references to other entities.
    fn references(&self) -> Vec<Reference>;

    /// Column values in [`EntityKind::columns`] order.
    fn row_values(&self) -> Vec<ColumnValue>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Online,
    Offline,
    OnRide,
}

impl Availability {
    pub const ALL: [Availability; 3] = [
        Availability::Online,
        Availability::Offline,
        Availability::OnRide,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::Online => "online",
            Availability::Offline => "offline",
            Availability::OnRide => "on_ride",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Requested,
    InProgress,
    Completed,
    Cancelled,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Requested => "requested",
            RideStatus::InProgress => "in_progress",
            RideStatus::Completed => "completed",
            RideStatus::Cancelled => "cancelled",
        }
    }
}

/// Row of the `regions` table; its home region is itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRecord {
    pub region_id: EntityId,
    pub region_code: String,
    pub name: String,
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
    pub node_count: i64,
    pub primary_node: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rider {
    pub user_id: EntityId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub latitude: f64,
    pub longitude: f64,
    pub region: String,
    pub rating: f64,
    pub total_rides: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub driver_id: EntityId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub latitude: f64,
    pub longitude: f64,
    pub region: String,
    pub geohash: String,
    pub availability: Availability,
    pub rating: f64,
    pub total_rides: i64,
    pub created_at: DateTime<Utc>,
}

/// A driver's vehicle; lives in its driver's region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub vehicle_id: EntityId,
    pub driver_id: EntityId,
    pub region: String,
    pub vehicle_type: String,
    pub brand: String,
    pub color: String,
    pub license_plate: String,
    pub created_at: DateTime<Utc>,
}

/// A ride; lives in its rider's region. `driver_id` and `vehicle_id` are
/// absent while the ride is still `requested`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ride {
    pub ride_id: EntityId,
    pub user_id: EntityId,
    pub driver_id: Option<EntityId>,
    pub vehicle_id: Option<EntityId>,
    pub pickup_lat: f64,
    pub pickup_lon: f64,
    pub dropoff_lat: f64,
    pub dropoff_lon: f64,
    pub region: String,
    pub pickup_geohash: String,
    pub status: RideStatus,
    pub price: f64,
    pub distance_km: f64,
    pub duration_minutes: i64,
    pub requested_at: DateTime<Utc>,
}

fn text(s: &str) -> ColumnValue {
    ColumnValue::Text(s.to_string())
}

fn timestamp(dt: &DateTime<Utc>) -> ColumnValue {
    ColumnValue::Timestamp(dt.naive_utc())
}

impl RegionalEntity for RegionRecord {
    fn kind(&self) -> EntityKind {
        EntityKind::Region
    }

    fn identifier(&self) -> EntityId {
        self.region_id
    }

    fn region_of(&self) -> &str {
        &self.region_code
    }

    fn references(&self) -> Vec<Reference> {
        Vec::new()
    }

    fn row_values(&self) -> Vec<ColumnValue> {
        vec![
            ColumnValue::Uuid(self.region_id.as_uuid()),
            text(&self.region_code),
            text(&self.name),
            ColumnValue::Float(self.lat_min),
            ColumnValue::Float(self.lat_max),
            ColumnValue::Float(self.lon_min),
            ColumnValue::Float(self.lon_max),
            ColumnValue::Int(self.node_count),
            text(&self.primary_node),
            timestamp(&self.created_at),
        ]
    }
}

impl RegionalEntity for Rider {
    fn kind(&self) -> EntityKind {
        EntityKind::Rider
    }

    fn identifier(&self) -> EntityId {
        self.user_id
    }

    fn region_of(&self) -> &str {
        &self.region
    }

    fn references(&self) -> Vec<Reference> {
        Vec::new()
    }

    fn row_values(&self) -> Vec<ColumnValue> {
        vec![
            ColumnValue::Uuid(self.user_id.as_uuid()),
            text(&self.name),
            text(&self.email),
            text(&self.phone),
            ColumnValue::Float(self.latitude),
            ColumnValue::Float(self.longitude),
            text(&self.region),
            ColumnValue::Float(self.rating),
            ColumnValue::Int(self.total_rides),
            timestamp(&self.created_at),
        ]
    }
}

impl RegionalEntity for Driver {
    fn kind(&self) -> EntityKind {
        EntityKind::Driver
    }

    fn identifier(&self) -> EntityId {
        self.driver_id
    }

    fn region_of(&self) -> &str {
        &self.region
    }

    fn references(&self) -> Vec<Reference> {
        Vec::new()
    }

    fn row_values(&self) -> Vec<ColumnValue> {
        vec![
            ColumnValue::Uuid(self.driver_id.as_uuid()),
            text(&self.name),
            text(&self.email),
            text(&self.phone),
            ColumnValue::Float(self.latitude),
            ColumnValue::Float(self.longitude),
            text(&self.region),
            text(&self.geohash),
            text(self.availability.as_str()),
            ColumnValue::Float(self.rating),
            ColumnValue::Int(self.total_rides),
            timestamp(&self.created_at),
        ]
    }
}

impl RegionalEntity for Vehicle {
    fn kind(&self) -> EntityKind {
        EntityKind::Vehicle
    }

    fn identifier(&self) -> EntityId {
        self.vehicle_id
    }

    fn region_of(&self) -> &str {
        &self.region
    }

    fn references(&self) -> Vec<Reference> {
        vec![Reference::new(EntityKind::Driver, self.driver_id)]
    }

    fn row_values(&self) -> Vec<ColumnValue> {
        vec![
            ColumnValue::Uuid(self.vehicle_id.as_uuid()),
            ColumnValue::Uuid(self.driver_id.as_uuid()),
            text(&self.region),
            text(&self.vehicle_type),
            text(&self.brand),
            text(&self.color),
            text(&self.license_plate),
            timestamp(&self.created_at),
        ]
    }
}

impl RegionalEntity for Ride {
    fn kind(&self) -> EntityKind {
        EntityKind::Ride
    }

    fn identifier(&self) -> EntityId {
        self.ride_id
    }

    fn region_of(&self) -> &str {
        &self.region
    }

    fn references(&self) -> Vec<Reference> {
        let mut refs = vec![Reference::new(EntityKind::Rider, self.user_id)];
        if let Some(driver_id) = self.driver_id {
            refs.push(Reference::new(EntityKind::Driver, driver_id));
        }
        if let Some(vehicle_id) = self.vehicle_id {
            refs.push(Reference::new(EntityKind::Vehicle, vehicle_id));
        }
        refs
    }

    fn row_values(&self) -> Vec<ColumnValue> {
        vec![
            ColumnValue::Uuid(self.ride_id.as_uuid()),
            ColumnValue::Uuid(self.user_id.as_uuid()),
            ColumnValue::NullableUuid(self.driver_id.map(|id| id.as_uuid())),
            ColumnValue::NullableUuid(self.vehicle_id.map(|id| id.as_uuid())),
            ColumnValue::Float(self.pickup_lat),
            ColumnValue::Float(self.pickup_lon),
            ColumnValue::Float(self.dropoff_lat),
            ColumnValue::Float(self.dropoff_lon),
            text(&self.region),
            text(&self.pickup_geohash),
            text(self.status.as_str()),
            ColumnValue::Float(self.price),
            ColumnValue::Float(self.distance_km),
            ColumnValue::Int(self.duration_minutes),
            timestamp(&self.requested_at),
        ]
    }
}

/// Any generated entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Region(RegionRecord),
    Rider(Rider),
    Driver(Driver),
    Vehicle(Vehicle),
    Ride(Ride),
}

impl Entity {
    fn inner(&self) -> &dyn RegionalEntity {
        match self {
            Entity::Region(e) => e,
            Entity::Rider(e) => e,
            Entity::Driver(e) => e,
            Entity::Vehicle(e) => e,
            Entity::Ride(e) => e,
        }
    }
}

impl RegionalEntity for Entity {
    fn kind(&self) -> EntityKind {
        self.inner().kind()
    }

    fn identifier(&self) -> EntityId {
        self.inner().identifier()
    }

    fn region_of(&self) -> &str {
        self.inner().region_of()
    }

    fn references(&self) -> Vec<Reference> {
        self.inner().references()
    }

    fn row_values(&self) -> Vec<ColumnValue> {
        self.inner().row_values()
    }
}
