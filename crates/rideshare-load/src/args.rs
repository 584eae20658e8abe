//! CLI arguments for the load/clear pipeline.

use crate::pipeline::PipelineConfig;
use crate::retry::RetryPolicy;
use clap::Args;

/// Pipeline tuning shared by `load` and `verify`.
#[derive(Args, Clone, Debug)]
pub struct PipelineArgs {
    /// Rows per upsert batch (each batch is one transaction)
    #[arg(long, env = "BATCH_SIZE", default_value = "1000")]
    pub batch_size: usize,

    /// Connections per region, and batches in flight per region
    #[arg(long, env = "POOL_SIZE", default_value = "4")]
    pub pool_size: usize,

    /// Retries for transient errors before a batch is reported as failed
    #[arg(long, env = "MAX_RETRIES", default_value = "5")]
    pub max_retries: u32,

    /// Skip checking that the database has every catalog region
    #[arg(long)]
    pub skip_region_check: bool,
}

impl PipelineArgs {
    pub fn to_config(&self) -> PipelineConfig {
        PipelineConfig {
            batch_size: self.batch_size.max(1),
            pool_size: self.pool_size.max(1),
            retry: RetryPolicy::new(self.max_retries),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        pipeline: PipelineArgs,
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["rideshare-geo"]);
        let config = cli.pipeline.to_config();
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.retry.max_retries, 5);
        assert!(!cli.pipeline.skip_region_check);
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::parse_from([
            "rideshare-geo",
            "--batch-size",
            "0",
            "--pool-size",
            "8",
            "--max-retries",
            "1",
            "--skip-region-check",
        ]);
        let config = cli.pipeline.to_config();
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.pool_size, 8);
        assert_eq!(config.retry.max_retries, 1);
        assert!(cli.pipeline.skip_region_check);
    }
}
