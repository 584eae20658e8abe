//! Command-line definitions.

use crate::config::{DatabaseArgs, Environment};
use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use geo_core::PairingPolicy;
use rideshare_generator::{default_as_of, parse_timestamp, GeneratorConfig, ScalePreset};
use rideshare_load::{LoadMode, PipelineArgs};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rideshare-geo")]
#[command(about = "Generate and load a multi-region ride-sharing dataset")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate the dataset and spool it to a directory
    Generate {
        #[command(flatten)]
        generation: GenerationArgs,

        /// Output directory for the spooled dataset
        #[arg(long, default_value = "generated_data")]
        output: PathBuf,

        #[command(flatten)]
        database: DatabaseArgs,
    },

    /// Load the dataset into every region's endpoint
    Load {
        #[command(flatten)]
        generation: GenerationArgs,

        /// Load a spooled dataset instead of generating one
        #[arg(long)]
        input: Option<PathBuf>,

        /// Clear generated rows of every region before loading
        #[arg(long, conflicts_with = "delete_only")]
        clear: bool,

        /// Clear generated rows of every region and stop
        #[arg(long)]
        delete_only: bool,

        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Run against an in-memory database instead of the cluster
        #[arg(long)]
        dry_run: bool,

        #[command(flatten)]
        database: DatabaseArgs,
    },

    /// Print per-region row distribution and placement mismatches
    Verify {
        #[command(flatten)]
        database: DatabaseArgs,
    },
}

/// Inputs that determine the generated dataset.
#[derive(Args, Clone, Debug)]
pub struct GenerationArgs {
    /// Random seed for deterministic generation (same seed = same data)
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Riders per region (overrides the environment's scale)
    #[arg(long)]
    pub riders: Option<u64>,

    /// Drivers per region (overrides the environment's scale)
    #[arg(long)]
    pub drivers: Option<u64>,

    /// Rides per region (overrides the environment's scale)
    #[arg(long)]
    pub rides: Option<u64>,

    /// Probability that a ride is matched with a driver from an adjacent region
    #[arg(long, env = "BORDER_PROBABILITY", default_value = "0.0")]
    pub border_probability: f64,

    /// Reference instant for generated timestamps (RFC 3339 or YYYY-MM-DD)
    #[arg(long, value_parser = parse_as_of)]
    pub as_of: Option<DateTime<Utc>>,
}

fn parse_as_of(value: &str) -> Result<DateTime<Utc>, String> {
    parse_timestamp(value).ok_or_else(|| format!("invalid timestamp '{value}'"))
}

impl GenerationArgs {
    pub fn pairing(&self) -> anyhow::Result<PairingPolicy> {
        PairingPolicy::new(self.border_probability).context("Invalid --border-probability")
    }

    pub fn to_generator_config(&self, environment: Environment) -> anyhow::Result<GeneratorConfig> {
        let preset = ScalePreset::from_environment(&environment.to_string());
        Ok(GeneratorConfig {
            seed: self.seed,
            scale: preset.with_overrides(self.riders, self.drivers, self.rides),
            pairing: self.pairing()?,
            as_of: self.as_of.unwrap_or_else(default_as_of),
        })
    }
}

/// Pipeline mode selected by `load`'s flags.
pub fn load_mode(clear: bool, delete_only: bool) -> LoadMode {
    match (clear, delete_only) {
        (_, true) => LoadMode::Clear,
        (true, false) => LoadMode::ClearThenLoad,
        (false, false) => LoadMode::Load,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_core::ScaleCounts;

    fn generation(args: &[&str]) -> GenerationArgs {
        let mut argv = vec!["rideshare-geo", "generate"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Generate { generation, .. } => generation,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_generation_defaults() {
        let config = generation(&[])
            .to_generator_config(Environment::Local)
            .unwrap();
        assert_eq!(config, GeneratorConfig::default());
    }

    #[test]
    fn test_generation_overrides() {
        let args = generation(&[
            "--seed",
            "7",
            "--rides",
            "10",
            "--border-probability",
            "0.25",
            "--as-of",
            "2024-06-01",
        ]);
        let config = args.to_generator_config(Environment::Cloud).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.scale, ScaleCounts::new(100_000, 50_000, 10));
        assert_eq!(config.pairing.border_probability(), 0.25);
        assert_eq!(config.as_of.to_rfc3339(), "2024-06-01T00:00:00+00:00");
    }

    #[test]
    fn test_invalid_border_probability() {
        let args = generation(&["--border-probability", "1.5"]);
        assert!(args.to_generator_config(Environment::Local).is_err());
    }

    #[test]
    fn test_invalid_as_of() {
        assert!(Cli::try_parse_from(["rideshare-geo", "generate", "--as-of", "yesterday"]).is_err());
    }

    #[test]
    fn test_load_flags() {
        assert!(Cli::try_parse_from(["rideshare-geo", "load", "--clear", "--delete-only"]).is_err());
        assert_eq!(load_mode(false, false), LoadMode::Load);
        assert_eq!(load_mode(true, false), LoadMode::ClearThenLoad);
        assert_eq!(load_mode(false, true), LoadMode::Clear);
    }

    #[test]
    fn test_verify_reads_the_cluster() {
        assert!(Cli::try_parse_from(["rideshare-geo", "verify"]).is_ok());
        assert!(Cli::try_parse_from(["rideshare-geo", "verify", "--dry-run"]).is_err());
    }
}
