//! Backfill configuration and retry constants

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Total attempts per API call (1 initial + 2 retries).
/// Transient-only: retrying a 404 or a schema violation cannot help, so
/// those surface immediately.
pub const MAX_FETCH_ATTEMPTS: u32 = 3;

/// Initial retry backoff in milliseconds.
/// 1 second is long enough for a rate-limit window to move but short enough
/// to not dominate a healthy item's processing time.
pub const INITIAL_BACKOFF_MS: u64 = 1000;

/// Maximum retry backoff in milliseconds.
/// 60 seconds caps the worst case so one stuck call can only stall the
/// single-threaded loop for a bounded time.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Consecutive per-item failures that abort the run.
/// 10 distinct items failing in a row reads as a systemic outage, not bad
/// luck; continuing would burn API quota for nothing.
pub const CIRCUIT_BREAKER_THRESHOLD: u32 = 10;

/// Default inter-request base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 600;

/// Default failed-pass ceiling before an item is terminally failed.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default processed-item count between checkpoint writes.
pub const DEFAULT_CHECKPOINT_FREQUENCY: u32 = 10;

/// Name recorded as the `source` of every stored payload.
pub const DATA_SOURCE: &str = "stats-api";

/// Calculate exponential retry backoff for a failed attempt (1-indexed).
pub fn calculate_backoff(attempt: u32) -> Duration {
    let delay_ms = INITIAL_BACKOFF_MS * 2u64.pow(attempt.saturating_sub(1).min(16));
    Duration::from_millis(delay_ms.min(MAX_BACKOFF_MS))
}

/// Immutable run configuration, owned by the caller and snapshotted into
/// every checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackfillConfig {
    /// Period (season) to backfill, e.g. "2023-24"
    pub period: String,
    /// Storage location: a local directory or an `s3://bucket/root` URL
    pub storage_location: String,
    /// Base inter-request delay for the adaptive rate limiter, milliseconds
    pub rate_limit_base_delay_ms: u64,
    /// Failed passes after which an item is terminally failed
    pub max_retries: u32,
    /// Processed items between checkpoint writes
    pub checkpoint_frequency: u32,
    /// Fetch but skip all storage and checkpoint writes
    pub dry_run: bool,
}

impl BackfillConfig {
    /// Configuration with defaults for everything but period and location.
    pub fn new(period: impl Into<String>, storage_location: impl Into<String>) -> Self {
        Self {
            period: period.into(),
            storage_location: storage_location.into(),
            rate_limit_base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            checkpoint_frequency: DEFAULT_CHECKPOINT_FREQUENCY,
            dry_run: false,
        }
    }

    /// Base rate-limiter delay as a [`Duration`].
    pub fn rate_limit_base_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_base_delay_ms)
    }
}
