//! Vehicle attribute generators.

use rand::Rng;

pub const VEHICLE_TYPES: &[&str] = &["Sedan", "SUV", "Hatchback", "Minivan", "Compact"];

pub const VEHICLE_BRANDS: &[&str] = &[
    "Toyota",
    "Honda",
    "Ford",
    "BMW",
    "Mercedes",
    "Hyundai",
    "Volkswagen",
];

pub const VEHICLE_COLORS: &[&str] = &["Black", "White", "Silver", "Blue", "Red", "Gray"];

/// Type, brand and color of a vehicle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleAttributes {
    pub vehicle_type: String,
    pub brand: String,
    pub color: String,
}

pub fn generate_vehicle_attributes<R: Rng>(rng: &mut R) -> VehicleAttributes {
    let color = VEHICLE_COLORS[rng.gen_range(0..VEHICLE_COLORS.len())];
    let brand = VEHICLE_BRANDS[rng.gen_range(0..VEHICLE_BRANDS.len())];
    let vehicle_type = VEHICLE_TYPES[rng.gen_range(0..VEHICLE_TYPES.len())];
    VehicleAttributes {
        vehicle_type: vehicle_type.to_string(),
        brand: brand.to_string(),
        color: color.to_string(),
    }
}

fn letter<R: Rng>(rng: &mut R) -> char {
    char::from(rng.gen_range(b'A'..=b'Z'))
}

/// Generate a license plate in the region's format:
///
/// - `us-*`: `ABC-1234`
/// - `eu-*`: `A-BC 123`
/// - otherwise: `MH12AB1234`
pub fn generate_license_plate<R: Rng>(rng: &mut R, region_id: &str) -> String {
    if region_id.starts_with("us-") {
        format!(
            "{}{}{}-{}",
            letter(rng),
            letter(rng),
            letter(rng),
            rng.gen_range(1000..=9999)
        )
    } else if region_id.starts_with("eu-") {
        format!(
            "{}-{}{} {}",
            letter(rng),
            letter(rng),
            letter(rng),
            rng.gen_range(100..=9999)
        )
    } else {
        format!(
            "MH{}{}{}{}",
            rng.gen_range(10..=99),
            letter(rng),
            letter(rng),
            rng.gen_range(1000..=9999)
        )
    }
}
