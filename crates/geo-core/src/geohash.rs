//! Geohash encoding.
//!
//! Nearby points share common prefixes; longer hashes are more precise.
//! Precision 6 (about 1.2 km) is used for driver search cells and ride
//! pickup cells.

use crate::region::Coordinate;

const BASE32_ALPHABET: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Precision used for driver and pickup geohashes.
pub const DEFAULT_PRECISION: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeohashError {
    #[error("Invalid geohash character '{0}'")]
    InvalidCharacter(char),

    #[error("Empty geohash")]
    Empty,
}

/// Encode a coordinate into a geohash of `precision` characters.
pub fn encode(point: Coordinate, precision: usize) -> String {
    let mut lat_range = (-90.0_f64, 90.0_f64);
    let mut lon_range = (-180.0_f64, 180.0_f64);

    let mut hash = String::with_capacity(precision);
    let mut bits = 0;
    let mut current = 0usize;
    let mut is_lon = true;

    while hash.len() < precision {
        let (range, value) = if is_lon {
            (&mut lon_range, point.lon)
        } else {
            (&mut lat_range, point.lat)
        };

        let mid = (range.0 + range.1) / 2.0;
        if value >= mid {
            current = (current << 1) | 1;
            range.0 = mid;
        } else {
            current <<= 1;
            range.1 = mid;
        }

        is_lon = !is_lon;
        bits += 1;

        if bits == 5 {
            hash.push(BASE32_ALPHABET[current] as char);
            bits = 0;
            current = 0;
        }
    }

    hash
}

/// Decode a geohash to the centre of its cell.
pub fn decode(hash: &str) -> Result<Coordinate, GeohashError> {
    if hash.is_empty() {
        return Err(GeohashError::Empty);
    }

    let mut lat_range = (-90.0_f64, 90.0_f64);
    let mut lon_range = (-180.0_f64, 180.0_f64);
    let mut is_lon = true;

    for c in hash.chars() {
        let value = BASE32_ALPHABET
            .iter()
            .position(|&b| b as char == c)
            .ok_or(GeohashError::InvalidCharacter(c))?;

        for shift in (0..5).rev() {
            let bit = (value >> shift) & 1;
            let range = if is_lon {
                &mut lon_range
            } else {
                &mut lat_range
            };
            let mid = (range.0 + range.1) / 2.0;
            if bit == 1 {
                range.0 = mid;
            } else {
                range.1 = mid;
            }
            is_lon = !is_lon;
        }
    }

    Ok(Coordinate::new(
        (lat_range.0 + lat_range.1) / 2.0,
        (lon_range.0 + lon_range.1) / 2.0,
    ))
}

/// The eight cells surrounding a geohash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighbours {
    pub n: String,
    pub s: String,
    pub e: String,
    pub w: String,
    pub ne: String,
    pub nw: String,
    pub se: String,
    pub sw: String,
}

impl Neighbours {
    pub fn all(&self) -> [&str; 8] {
        [
            &self.n, &self.s, &self.e, &self.w, &self.ne, &self.nw, &self.se, &self.sw,
        ]
    }
}

pub fn neighbours(hash: &str) -> Result<Neighbours, GeohashError> {
    let center = decode(hash)?;
    let precision = hash.len();

    let total_bits = (precision * 5) as i32;
    let lon_bits = (total_bits + 1) / 2;
    let lat_bits = total_bits / 2;
    let lat_delta = 180.0 / 2f64.powi(lat_bits);
    let lon_delta = 360.0 / 2f64.powi(lon_bits);

    let at = |dlat: f64, dlon: f64| {
        encode(
            Coordinate::new(center.lat + dlat, wrap_lon(center.lon + dlon)),
            precision,
        )
    };

    Ok(Neighbours {
        n: at(lat_delta, 0.0),
        s: at(-lat_delta, 0.0),
        e: at(0.0, lon_delta),
        w: at(0.0, -lon_delta),
        ne: at(lat_delta, lon_delta),
        nw: at(lat_delta, -lon_delta),
        se: at(-lat_delta, lon_delta),
        sw: at(-lat_delta, -lon_delta),
    })
}

fn wrap_lon(lon: f64) -> f64 {
    if lon >= 180.0 {
        lon - 360.0
    } else if lon < -180.0 {
        lon + 360.0
    } else {
        lon
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_known_points() {
        assert_eq!(encode(Coordinate::new(40.7128, -74.0060), 6), "dr5reg");
        assert_eq!(encode(Coordinate::new(52.5200, 13.4050), 6), "u33dc0");
        assert_eq!(encode(Coordinate::new(57.64911, 10.40744), 11), "u4pruydqqvj");
    }

    #[test]
    fn test_decode_is_within_cell() {
        let point = Coordinate::new(19.0760, 72.8777);
        let hash = encode(point, 8);
        let center = decode(&hash).unwrap();
        assert!((center.lat - point.lat).abs() < 0.001);
        assert!((center.lon - point.lon).abs() < 0.001);
        assert_eq!(encode(center, 8), hash);
    }

    #[test]
    fn test_decode_invalid() {
        assert_eq!(decode("dr5a"), Err(GeohashError::InvalidCharacter('a')));
        assert_eq!(decode(""), Err(GeohashError::Empty));
    }

    #[test]
    fn test_neighbours_share_prefix() {
        let hash = encode(Coordinate::new(40.7128, -74.0060), 6);
        let n = neighbours(&hash).unwrap();
        for cell in n.all() {
            assert_eq!(cell.len(), 6);
            assert_ne!(cell, hash);
            assert_eq!(&cell[..3], &hash[..3]);
        }
        assert_ne!(n.n, n.s);
        assert_ne!(n.e, n.w);
    }
}
