//! Timestamp value generators.
//!
//! All timestamps are relative to a fixed `as_of` instant, never the wall
//! clock, so generation stays reproducible.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

/// `2025-01-01T00:00:00Z`
const DEFAULT_AS_OF_SECS: i64 = 1_735_689_600;

/// Default reference instant for generated timestamps.
pub fn default_as_of() -> DateTime<Utc> {
    DateTime::from_timestamp(DEFAULT_AS_OF_SECS, 0).unwrap_or_default()
}

/// Generate a random timestamp in `[as_of - window, as_of]`, with whole
/// second precision.
pub fn generate_timestamp_before<R: Rng>(
    rng: &mut R,
    as_of: DateTime<Utc>,
    window: Duration,
) -> DateTime<Utc> {
    let span = window.num_seconds().max(0);
    let offset = rng.gen_range(0..=span);
    as_of - Duration::seconds(offset)
}

/// Parse a timestamp string in various formats.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC 3339 / ISO 8601
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    // Try common date-only format
    if let Ok(date) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }

    None
}
