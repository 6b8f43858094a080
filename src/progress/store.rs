//! Per-item progress state machine and aggregate statistics
//!
//! Work items move `Pending → Completed` or `Pending → Failed` (after retry
//! exhaustion) and never leave a terminal state; the item map doubles as the
//! permanent audit record inside every checkpoint. Aggregate counters are
//! cached alongside the map and must reconcile against it after every
//! mutation — [`validate_integrity`](ProgressStateStore::validate_integrity)
//! checks exactly that after a resume.

use crate::backfill::BackfillConfig;
use crate::progress::checkpoint::{CheckpointDocument, CheckpointMetadata, SCHEMA_VERSION};
use crate::{DiscoveredItem, SubResourceKind};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Lifecycle state of one work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkStatus {
    /// Not yet successfully processed; eligible for scheduling
    Pending,
    /// Terminal: at least one sub-resource stored
    Completed,
    /// Terminal: retries exhausted
    Failed,
}

impl WorkStatus {
    /// Whether the status admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkStatus::Completed | WorkStatus::Failed)
    }
}

impl std::fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkStatus::Pending => "pending",
            WorkStatus::Completed => "completed",
            WorkStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// One unit of backfill work (a single historical game).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Upstream game identifier
    pub id: String,
    /// Calendar date of the game
    pub date: NaiveDate,
    /// Lifecycle state
    pub status: WorkStatus,
    /// Number of failed processing passes so far; only ever increases
    pub retry_count: u32,
    /// When this item was last attempted
    pub last_attempt: Option<DateTime<Utc>>,
    /// Most recent failure message, cleared on completion
    pub error_message: Option<String>,
    /// Sub-resource kinds that were successfully stored
    pub completed_sub_resources: BTreeSet<SubResourceKind>,
}

impl WorkItem {
    fn discovered(item: &DiscoveredItem) -> Self {
        Self {
            id: item.game_id.clone(),
            date: item.game_date,
            status: WorkStatus::Pending,
            retry_count: 0,
            last_attempt: None,
            error_message: None,
            completed_sub_resources: BTreeSet::new(),
        }
    }
}

/// Aggregate counters cached alongside the item map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressStats {
    /// When the run (or the original run, across resumes) started
    pub start_time: DateTime<Utc>,
    /// Last mutation time
    pub last_update: DateTime<Utc>,
    /// Items ever discovered
    pub total_discovered: u64,
    /// Items in terminal Completed state
    pub completed: u64,
    /// Items in terminal Failed state
    pub failed: u64,
    /// Items still eligible for scheduling
    pub pending: u64,
    /// HTTP requests issued on behalf of this run
    pub total_api_calls: u64,
    /// Output files written
    pub total_files_stored: u64,
    /// Output bytes written
    pub total_bytes_stored: u64,
    /// Completions per hour since `start_time`
    pub processing_rate_per_hour: f64,
    /// Projected drain time at the current rate, if computable
    pub estimated_completion: Option<DateTime<Utc>>,
}

impl ProgressStats {
    /// Fresh statistics anchored at the current time.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            start_time: now,
            last_update: now,
            total_discovered: 0,
            completed: 0,
            failed: 0,
            pending: 0,
            total_api_calls: 0,
            total_files_stored: 0,
            total_bytes_stored: 0,
            processing_rate_per_hour: 0.0,
            estimated_completion: None,
        }
    }
}

impl Default for ProgressStats {
    fn default() -> Self {
        Self::new()
    }
}

/// One mismatch between cached counters and the item map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discrepancy {
    /// Which counter disagreed
    pub field: &'static str,
    /// Value cached in [`ProgressStats`]
    pub cached: u64,
    /// Value recomputed from the item map
    pub recomputed: u64,
}

impl std::fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: cached {} != recomputed {}",
            self.field, self.cached, self.recomputed
        )
    }
}

/// Authoritative per-item status, retry tracking, and aggregate statistics.
///
/// Mutated only by the orchestrator's single task; no internal locking.
#[derive(Debug, Clone)]
pub struct ProgressStateStore {
    run_id: String,
    items: BTreeMap<String, WorkItem>,
    stats: ProgressStats,
    max_retries: u32,
    checkpoint_frequency: u32,
    processed_since_checkpoint: u32,
}

impl ProgressStateStore {
    /// Create an empty store for a new run.
    pub fn new(max_retries: u32, checkpoint_frequency: u32) -> Self {
        Self {
            run_id: format!("run-{}", Utc::now().format("%Y%m%dT%H%M%S%3fZ")),
            items: BTreeMap::new(),
            stats: ProgressStats::new(),
            max_retries,
            checkpoint_frequency,
            processed_since_checkpoint: 0,
        }
    }

    /// Identifier of the run that created (or last resumed) this state.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Aggregate counters.
    pub fn stats(&self) -> &ProgressStats {
        &self.stats
    }

    /// The full item map.
    pub fn items(&self) -> &BTreeMap<String, WorkItem> {
        &self.items
    }

    /// Look up one item.
    pub fn item(&self, id: &str) -> Option<&WorkItem> {
        self.items.get(id)
    }

    /// Whether any items remain schedulable.
    pub fn has_pending(&self) -> bool {
        self.stats.pending > 0
    }

    /// Terminally failed items, in id order.
    pub fn failed_items(&self) -> Vec<&WorkItem> {
        self.items
            .values()
            .filter(|i| i.status == WorkStatus::Failed)
            .collect()
    }

    /// Seed the store from a discovery listing.
    ///
    /// Idempotent by id: re-adding a known id is a no-op, so replaying
    /// discovery after a lost checkpoint can never duplicate work. Returns
    /// the number of genuinely new items.
    pub fn add_discovered_items(&mut self, discovered: &[DiscoveredItem]) -> usize {
        let mut added = 0usize;
        for item in discovered {
            if self.items.contains_key(&item.game_id) {
                continue;
            }
            self.items
                .insert(item.game_id.clone(), WorkItem::discovered(item));
            added += 1;
        }

        if added > 0 {
            self.stats.total_discovered += added as u64;
            self.stats.pending += added as u64;
        }
        self.refresh_derived();

        debug!(
            discovered = discovered.len(),
            added = added,
            total = self.items.len(),
            "Discovery applied"
        );
        added
    }

    /// Next schedulable items, ordered by ascending retry count (fresh items
    /// before repeatedly retried ones), ties broken by id for determinism.
    pub fn get_next_items(&self, batch_size: usize) -> Vec<WorkItem> {
        let mut pending: Vec<&WorkItem> = self
            .items
            .values()
            .filter(|i| i.status == WorkStatus::Pending)
            .collect();
        pending.sort_by(|a, b| {
            a.retry_count
                .cmp(&b.retry_count)
                .then_with(|| a.id.cmp(&b.id))
        });
        pending.into_iter().take(batch_size).cloned().collect()
    }

    /// Transition an item to terminal Completed, recording which kinds were
    /// stored.
    ///
    /// Completing an already-terminal item is a warning no-op: overwriting
    /// would break the monotone-transition invariant.
    pub fn mark_completed(&mut self, id: &str, kinds: BTreeSet<SubResourceKind>) {
        let Some(item) = self.items.get_mut(id) else {
            warn!(item = id, "mark_completed for unknown item ignored");
            return;
        };
        if item.status.is_terminal() {
            warn!(
                item = id,
                status = %item.status,
                "mark_completed for terminal item ignored"
            );
            return;
        }

        item.status = WorkStatus::Completed;
        item.completed_sub_resources = kinds;
        item.last_attempt = Some(Utc::now());
        item.error_message = None;

        self.stats.completed += 1;
        self.stats.pending = self.stats.pending.saturating_sub(1);
        self.processed_since_checkpoint += 1;
        self.refresh_derived();
    }

    /// Record a failed processing pass.
    ///
    /// Increments the retry count (unless `increment_retry` is false) and
    /// transitions to terminal Failed once the count reaches the configured
    /// maximum; otherwise the item stays Pending for a later attempt.
    /// Failing an already-terminal item is a warning no-op.
    pub fn mark_failed(&mut self, id: &str, error: &str, increment_retry: bool) {
        let Some(item) = self.items.get_mut(id) else {
            warn!(item = id, "mark_failed for unknown item ignored");
            return;
        };
        if item.status.is_terminal() {
            warn!(
                item = id,
                status = %item.status,
                "mark_failed for terminal item ignored"
            );
            return;
        }

        if increment_retry {
            item.retry_count += 1;
        }
        item.last_attempt = Some(Utc::now());
        item.error_message = Some(error.to_string());

        if item.retry_count >= self.max_retries {
            item.status = WorkStatus::Failed;
            self.stats.failed += 1;
            self.stats.pending = self.stats.pending.saturating_sub(1);
            debug!(
                item = id,
                retry_count = item.retry_count,
                "Retries exhausted, item terminally failed"
            );
        }

        self.processed_since_checkpoint += 1;
        self.refresh_derived();
    }

    /// Add issued API calls to the aggregate counters.
    pub fn record_api_calls(&mut self, calls: u64) {
        self.stats.total_api_calls += calls;
        self.refresh_derived();
    }

    /// Add stored output files and bytes to the aggregate counters.
    pub fn record_stored(&mut self, files: u64, bytes: u64) {
        self.stats.total_files_stored += files;
        self.stats.total_bytes_stored += bytes;
        self.refresh_derived();
    }

    /// Whether enough items were processed since the last checkpoint to
    /// persist a new one.
    pub fn should_checkpoint(&self) -> bool {
        self.checkpoint_frequency > 0
            && self.processed_since_checkpoint >= self.checkpoint_frequency
    }

    /// Reset the checkpoint gate after a snapshot was persisted.
    pub fn reset_checkpoint_counter(&mut self) {
        self.processed_since_checkpoint = 0;
    }

    /// Recompute status counts from the item map and compare against the
    /// cached counters.
    ///
    /// Never fails; returns the list of mismatches (empty when consistent).
    /// Run once after a resume as a non-fatal self-check.
    pub fn validate_integrity(&self) -> Vec<Discrepancy> {
        let mut completed = 0u64;
        let mut failed = 0u64;
        let mut pending = 0u64;
        for item in self.items.values() {
            match item.status {
                WorkStatus::Completed => completed += 1,
                WorkStatus::Failed => failed += 1,
                WorkStatus::Pending => pending += 1,
            }
        }

        let checks = [
            ("completed", self.stats.completed, completed),
            ("failed", self.stats.failed, failed),
            ("pending", self.stats.pending, pending),
            (
                "total_discovered",
                self.stats.total_discovered,
                self.items.len() as u64,
            ),
        ];

        checks
            .into_iter()
            .filter(|(_, cached, recomputed)| cached != recomputed)
            .map(|(field, cached, recomputed)| Discrepancy {
                field,
                cached,
                recomputed,
            })
            .collect()
    }

    /// Snapshot the full state as a durable checkpoint document.
    pub fn to_serializable(&self, config: &BackfillConfig) -> CheckpointDocument {
        CheckpointDocument {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id: self.run_id.clone(),
            items: self.items.clone(),
            stats: self.stats.clone(),
            checkpoint_metadata: CheckpointMetadata {
                last_checkpoint: Utc::now(),
                config_snapshot: config.clone(),
            },
        }
    }

    /// Rebuild a store from a checkpoint document.
    ///
    /// Retry and checkpointing limits come from the *current* configuration,
    /// not the snapshot, so an operator can loosen them between runs.
    pub fn from_serializable(
        doc: CheckpointDocument,
        max_retries: u32,
        checkpoint_frequency: u32,
    ) -> Self {
        Self {
            run_id: doc.run_id,
            items: doc.items,
            stats: doc.stats,
            max_retries,
            checkpoint_frequency,
            processed_since_checkpoint: 0,
        }
    }

    /// Refresh derived rate/ETA fields and the last-update stamp.
    fn refresh_derived(&mut self) {
        let now = Utc::now();
        self.stats.last_update = now;

        let elapsed_hours =
            (now - self.stats.start_time).num_milliseconds().max(0) as f64 / 3_600_000.0;
        if elapsed_hours > 0.0 {
            self.stats.processing_rate_per_hour = self.stats.completed as f64 / elapsed_hours;
        }

        self.stats.estimated_completion = if self.stats.processing_rate_per_hour > 0.0
            && self.stats.pending > 0
        {
            let remaining_hours = self.stats.pending as f64 / self.stats.processing_rate_per_hour;
            Some(now + ChronoDuration::milliseconds((remaining_hours * 3_600_000.0) as i64))
        } else {
            None
        };
    }
}
