//! Ride trip generators: route offsets, status and fare metrics.

use super::numeric::round2;
use geo_core::{round_coordinate, BoundingBox, Coordinate, RideStatus};
use rand::Rng;

/// Status distribution in percent. Sums to 100.
pub const STATUS_WEIGHTS: [(RideStatus, u32); 4] = [
    (RideStatus::Completed, 80),
    (RideStatus::Cancelled, 10),
    (RideStatus::InProgress, 5),
    (RideStatus::Requested, 5),
];

/// Pickup offset from the rider's location, in degrees.
pub const PICKUP_OFFSET_DEG: f64 = 0.01;

/// Dropoff offset from the rider's location, in degrees.
pub const DROPOFF_OFFSET_DEG: f64 = 0.05;

const BASE_FARE: f64 = 2.5;
const PER_KM: f64 = 1.5;
const PER_MINUTE: f64 = 0.2;

const EDGE_MARGIN_DEG: f64 = 1e-6;

/// Draw a ride status according to [`STATUS_WEIGHTS`].
pub fn generate_status<R: Rng>(rng: &mut R) -> RideStatus {
    let roll = rng.gen_range(0..100u32);
    let mut cumulative = 0;
    for (status, weight) in STATUS_WEIGHTS {
        cumulative += weight;
        if roll < cumulative {
            return status;
        }
    }
    RideStatus::Completed
}

/// Pickup and dropoff around `origin`, kept inside `bounds`.
pub fn generate_route<R: Rng>(
    rng: &mut R,
    origin: Coordinate,
    bounds: &BoundingBox,
) -> (Coordinate, Coordinate) {
    let mut offset = |max: f64| {
        let point = Coordinate::new(
            origin.lat + rng.gen_range(-max..=max),
            origin.lon + rng.gen_range(-max..=max),
        );
        bounds.clamp(
            Coordinate::new(round_coordinate(point.lat), round_coordinate(point.lon)),
            EDGE_MARGIN_DEG,
        )
    };
    let pickup = offset(PICKUP_OFFSET_DEG);
    let dropoff = offset(DROPOFF_OFFSET_DEG);
    (pickup, dropoff)
}

/// Distance, duration and price of a trip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TripMetrics {
    pub distance_km: f64,
    pub duration_minutes: i64,
    pub price: f64,
}

/// Compute trip metrics. `extra_minutes` is the pickup/traffic overhead;
/// only completed rides are charged.
pub fn trip_metrics(
    pickup: Coordinate,
    dropoff: Coordinate,
    extra_minutes: i64,
    status: RideStatus,
) -> TripMetrics {
    let distance = pickup.distance_km(&dropoff);
    let duration_minutes = (distance * 3.0) as i64 + extra_minutes;
    let price = if status == RideStatus::Completed {
        round2(BASE_FARE + distance * PER_KM + duration_minutes as f64 * PER_MINUTE)
    } else {
        0.0
    };
    TripMetrics {
        distance_km: round2(distance),
        duration_minutes,
        price,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_weights_sum_to_100() {
        let total: u32 = STATUS_WEIGHTS.iter().map(|(_, w)| w).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn test_status_distribution() {
        let mut rng = StdRng::seed_from_u64(42);
        let n = 10_000;
        let completed = (0..n)
            .filter(|_| generate_status(&mut rng) == RideStatus::Completed)
            .count();
        let ratio = completed as f64 / n as f64;
        assert!((0.77..0.83).contains(&ratio), "completed ratio {ratio}");
    }

    #[test]
    fn test_route_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        let bounds = BoundingBox::new(25.0, 45.0, -80.0, -65.0);
        // Miami sits close to the western edge
        let origin = Coordinate::new(25.7617, -79.99);

        for _ in 0..200 {
            let (pickup, dropoff) = generate_route(&mut rng, origin, &bounds);
            assert!(bounds.contains(&pickup));
            assert!(bounds.contains(&dropoff));
            assert!((pickup.lat - origin.lat).abs() <= PICKUP_OFFSET_DEG + 1e-6);
        }
    }

    #[test]
    fn test_trip_metrics() {
        let pickup = Coordinate::new(40.7128, -74.0060);
        let dropoff = Coordinate::new(40.7580, -73.9855);

        let completed = trip_metrics(pickup, dropoff, 10, RideStatus::Completed);
        let distance = pickup.distance_km(&dropoff);
        assert_eq!(completed.distance_km, round2(distance));
        assert_eq!(completed.duration_minutes, (distance * 3.0) as i64 + 10);
        assert_eq!(
            completed.price,
            round2(2.5 + distance * 1.5 + completed.duration_minutes as f64 * 0.2)
        );

        let cancelled = trip_metrics(pickup, dropoff, 10, RideStatus::Cancelled);
        assert_eq!(cancelled.price, 0.0);
        assert_eq!(cancelled.duration_minutes, completed.duration_minutes);
    }
}
