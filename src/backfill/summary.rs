//! End-of-run summary
//!
//! The structured summary is the run's sole user-visible surface besides the
//! `run()` boolean: duration, throughput, per-status counts, and a bounded
//! sample of failed items.

use crate::client::ClientStats;
use crate::progress::{ProgressStateStore, ProgressStats};
use crate::storage::StorageStats;
use std::time::Duration;
use tracing::{info, warn};

/// Failed items reported by id in the summary; the rest are counted only,
/// keeping log volume bounded on catastrophic runs.
const MAX_REPORTED_FAILURES: usize = 10;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every item reached a terminal state
    Drained,
    /// The consecutive-failure circuit breaker tripped
    BreakerTripped,
    /// An operator interrupt stopped the run; state is resumable
    Interrupted,
    /// Discovery failed; no work could be scheduled
    DiscoveryFailed,
}

/// Structured summary of one backfill run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Run identifier
    pub run_id: String,
    /// How the run ended
    pub outcome: RunOutcome,
    /// Wall-clock duration
    pub duration: Duration,
    /// Final aggregate progress counters
    pub progress: ProgressStats,
    /// First few failed item ids (bounded sample), in id order
    pub failed_sample: Vec<String>,
    /// Client-side request statistics
    pub client: ClientStats,
    /// Storage-side upload statistics
    pub storage: StorageStats,
}

impl RunSummary {
    /// Assemble a summary from the run's final state.
    pub fn build(
        outcome: RunOutcome,
        duration: Duration,
        progress: &ProgressStateStore,
        client: ClientStats,
        storage: StorageStats,
    ) -> Self {
        let failed_sample = progress
            .failed_items()
            .iter()
            .take(MAX_REPORTED_FAILURES)
            .map(|item| item.id.clone())
            .collect();
        Self {
            run_id: progress.run_id().to_string(),
            outcome,
            duration,
            progress: progress.stats().clone(),
            failed_sample,
            client,
            storage,
        }
    }

    /// Whether the run fully drained its work without tripping the breaker
    /// or being interrupted. This is the value `run()` returns.
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Drained
    }

    /// Emit the summary as structured log lines.
    pub fn log(&self) {
        info!(
            run_id = %self.run_id,
            outcome = ?self.outcome,
            duration = %format_duration(self.duration),
            completed = self.progress.completed,
            failed = self.progress.failed,
            pending = self.progress.pending,
            total_discovered = self.progress.total_discovered,
            items_per_hour = %format!("{:.1}", self.progress.processing_rate_per_hour),
            api_calls = self.progress.total_api_calls,
            files_stored = self.progress.total_files_stored,
            bytes_stored = self.progress.total_bytes_stored,
            "Backfill run finished"
        );

        info!(
            requests = self.client.total_requests,
            successes = self.client.successes,
            failures = self.client.failures,
            rate_limited = self.client.rate_limited,
            avg_latency_ms = self.client.average_latency().as_millis() as u64,
            upload_failures = self.storage.failures,
            upload_time_ms = self.storage.cumulative_upload_time.as_millis() as u64,
            "Transfer statistics"
        );

        if !self.failed_sample.is_empty() {
            warn!(
                failed_total = self.progress.failed,
                reported = self.failed_sample.len(),
                items = ?self.failed_sample,
                "Items terminally failed"
            );
        }
    }
}

/// Human-readable duration for log lines.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
