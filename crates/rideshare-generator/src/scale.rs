//! Scale presets for per-region entity counts.

use geo_core::ScaleCounts;
use std::fmt;
use std::str::FromStr;

/// Named per-region dataset sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScalePreset {
    /// Laptop-sized dataset for a local cluster.
    #[default]
    Local,
    /// Production-sized dataset for a cloud cluster.
    Cloud,
}

impl ScalePreset {
    pub fn counts(&self) -> ScaleCounts {
        match self {
            ScalePreset::Local => ScaleCounts::new(100, 100, 150),
            ScalePreset::Cloud => ScaleCounts::new(100_000, 50_000, 200_000),
        }
    }

    /// Resolve the `ENVIRONMENT` setting. Anything other than `cloud`
    /// selects the local preset.
    pub fn from_environment(value: &str) -> Self {
        value.parse().unwrap_or(ScalePreset::Local)
    }

    /// Preset counts with individual overrides applied.
    pub fn with_overrides(
        &self,
        riders: Option<u64>,
        drivers: Option<u64>,
        rides: Option<u64>,
    ) -> ScaleCounts {
        let base = self.counts();
        ScaleCounts {
            riders: riders.unwrap_or(base.riders),
            drivers: drivers.unwrap_or(base.drivers),
            rides: rides.unwrap_or(base.rides),
        }
    }
}

impl fmt::Display for ScalePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalePreset::Local => write!(f, "local"),
            ScalePreset::Cloud => write!(f, "cloud"),
        }
    }
}

impl FromStr for ScalePreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(ScalePreset::Local),
            "cloud" => Ok(ScalePreset::Cloud),
            _ => Err(format!("Unknown environment: {s}. Valid options: local, cloud")),
        }
    }
}
