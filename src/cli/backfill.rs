//! Backfill command implementation
//!
//! Thin wiring from parsed arguments to the orchestrator: builds the
//! configuration, the storage handle for the requested location, and the
//! HTTP client with its rate limiter, then maps `run()` to the exit status.

use crate::backfill::config::{
    DEFAULT_BASE_DELAY_MS, DEFAULT_CHECKPOINT_FREQUENCY, DEFAULT_MAX_RETRIES,
};
use crate::backfill::{BackfillConfig, BackfillOrchestrator};
use crate::cli::CliError;
use crate::client::{HttpStatsClient, RateLimiter};
use crate::metrics;
use crate::shutdown::SharedShutdown;
use crate::storage::DurableStorage;
use clap::Args;
use std::net::SocketAddr;
use tracing::info;

/// Arguments for the `backfill` subcommand.
#[derive(Debug, Args)]
pub struct BackfillArgs {
    /// Season/period to backfill, e.g. "2023-24"
    #[arg(long)]
    pub period: String,

    /// Storage location: a local directory or s3://bucket/root
    #[arg(long, default_value = "./backfill-data")]
    pub storage_location: String,

    /// Object-key prefix for output files and checkpoints
    #[arg(long, default_value = "boxscores")]
    pub prefix: String,

    /// Statistics API base URL
    #[arg(long, default_value = "https://stats.example.com")]
    pub api_base_url: String,

    /// Base inter-request delay in milliseconds
    #[arg(long, default_value_t = DEFAULT_BASE_DELAY_MS)]
    pub rate_limit_base_delay_ms: u64,

    /// Failed passes before an item is terminally failed
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Processed items between checkpoint writes
    #[arg(long, default_value_t = DEFAULT_CHECKPOINT_FREQUENCY)]
    pub checkpoint_frequency: u32,

    /// Fetch but skip all storage and checkpoint writes
    #[arg(long)]
    pub dry_run: bool,

    /// Bind address for a Prometheus scrape endpoint (e.g. 0.0.0.0:9090)
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

impl BackfillArgs {
    /// Execute the backfill. Returns the orchestrator's drained/aborted
    /// boolean for exit-code mapping.
    pub async fn execute(&self, shutdown: SharedShutdown) -> Result<bool, CliError> {
        if self.period.trim().is_empty() {
            return Err(CliError::InvalidArgument("period cannot be empty".into()));
        }

        if let Some(addr) = self.metrics_addr {
            metrics::init_metrics(addr).map_err(|e| CliError::Metrics(e.to_string()))?;
        }

        let config = BackfillConfig {
            period: self.period.clone(),
            storage_location: self.storage_location.clone(),
            rate_limit_base_delay_ms: self.rate_limit_base_delay_ms,
            max_retries: self.max_retries,
            checkpoint_frequency: self.checkpoint_frequency,
            dry_run: self.dry_run,
        };

        let storage = build_storage(&self.storage_location, &self.prefix)?;
        let limiter = RateLimiter::new(config.rate_limit_base_delay());
        let client = HttpStatsClient::new(&self.api_base_url, limiter);

        info!(
            period = %config.period,
            storage = %config.storage_location,
            prefix = %self.prefix,
            "Backfill configured"
        );

        let mut orchestrator = BackfillOrchestrator::new(config, Box::new(client), storage)
            .with_shutdown(shutdown);
        Ok(orchestrator.run().await)
    }
}

/// Build a storage handle for a location string.
///
/// `s3://bucket/root` selects the S3 backend (region from `AWS_REGION`,
/// default `us-east-1`); anything else is treated as a local directory and
/// created if missing.
fn build_storage(location: &str, prefix: &str) -> Result<DurableStorage, CliError> {
    if let Some(rest) = location.strip_prefix("s3://") {
        let (bucket, root) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(CliError::InvalidArgument(format!(
                "invalid S3 location: {location}"
            )));
        }
        let region = std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());
        let root = format!("/{root}");
        Ok(DurableStorage::s3(bucket, &region, &root, prefix, None)?)
    } else {
        std::fs::create_dir_all(location).map_err(|e| {
            CliError::InvalidArgument(format!("cannot create storage directory {location}: {e}"))
        })?;
        let absolute = std::fs::canonicalize(location).map_err(|e| {
            CliError::InvalidArgument(format!("cannot resolve storage directory {location}: {e}"))
        })?;
        Ok(DurableStorage::local(
            &absolute.to_string_lossy(),
            prefix,
        )?)
    }
}
