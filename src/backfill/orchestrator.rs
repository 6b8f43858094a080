//! The backfill control loop
//!
//! Single-task, single-item-at-a-time processing: one shared rate limiter
//! serializes the outbound API stream, so parallel item processing would
//! only reorder waits without adding throughput. Storage uploads within an
//! item still fan out through the storage layer's bounded worker pool.

use crate::backfill::config::{BackfillConfig, CIRCUIT_BREAKER_THRESHOLD, DATA_SOURCE};
use crate::backfill::summary::{RunOutcome, RunSummary};
use crate::client::StatsProvider;
use crate::metrics;
use crate::progress::{ProgressStateStore, WorkItem};
use crate::shutdown::SharedShutdown;
use crate::storage::{ApiMetadata, DurableStorage};
use crate::{SubResourceKind, SubResourcePayload};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Items pulled per scheduling round. Kept at 1 so the single shared rate
/// limiter stays trivially correct; see the concurrency notes in the module
/// docs.
const BATCH_SIZE: usize = 1;

/// Top-level backfill orchestrator.
///
/// Owns its collaborators outright: exactly one [`StatsProvider`] (which in
/// turn owns the run's only rate limiter) and one [`DurableStorage`].
pub struct BackfillOrchestrator {
    config: BackfillConfig,
    client: Box<dyn StatsProvider>,
    storage: DurableStorage,
    shutdown: Option<SharedShutdown>,
}

impl BackfillOrchestrator {
    /// Create an orchestrator over the given collaborators.
    pub fn new(
        config: BackfillConfig,
        client: Box<dyn StatsProvider>,
        storage: DurableStorage,
    ) -> Self {
        Self {
            config,
            client,
            storage,
            shutdown: None,
        }
    }

    /// Attach a shared shutdown handle for graceful cancellation.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Execute the backfill run.
    ///
    /// Returns `true` only if every discovered item reached a terminal state
    /// without tripping the circuit breaker or being interrupted. No error
    /// escapes under normal operation: failures are absorbed into the
    /// summary and the boolean.
    pub async fn run(&mut self) -> bool {
        let span = info_span!("backfill_run", period = %self.config.period);
        self.run_inner().instrument(span).await.is_success()
    }

    /// Execute the backfill run and return the full summary.
    pub async fn run_with_summary(&mut self) -> RunSummary {
        let span = info_span!("backfill_run", period = %self.config.period);
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&mut self) -> RunSummary {
        let started = Instant::now();
        info!(
            period = %self.config.period,
            storage = %self.config.storage_location,
            dry_run = self.config.dry_run,
            "Starting backfill run"
        );

        // Start: resume if a usable checkpoint exists, otherwise discover.
        let mut progress = match self.storage.load_checkpoint().await {
            Some(document) => {
                let store = ProgressStateStore::from_serializable(
                    document,
                    self.config.max_retries,
                    self.config.checkpoint_frequency,
                );
                let discrepancies = store.validate_integrity();
                for discrepancy in &discrepancies {
                    warn!(discrepancy = %discrepancy, "Checkpoint counter mismatch");
                }
                info!(
                    run_id = %store.run_id(),
                    items = store.items().len(),
                    pending = store.stats().pending,
                    discrepancies = discrepancies.len(),
                    "Resumed from checkpoint"
                );
                store
            }
            None => match self.discover(started).await {
                Ok(store) => store,
                Err(summary) => return summary,
            },
        };

        // Processing loop.
        let mut consecutive_failures = 0u32;
        let mut outcome = RunOutcome::Drained;

        while progress.has_pending() {
            if self.shutdown_requested() {
                info!("Shutdown requested, stopping with resumable state");
                outcome = RunOutcome::Interrupted;
                break;
            }

            let Some(item) = progress.get_next_items(BATCH_SIZE).into_iter().next() else {
                break;
            };

            let succeeded = self.process_item(&item, &mut progress).await;
            if succeeded {
                consecutive_failures = 0;
            } else {
                consecutive_failures += 1;
                if consecutive_failures >= CIRCUIT_BREAKER_THRESHOLD {
                    error!(
                        consecutive_failures = consecutive_failures,
                        "Circuit breaker tripped, aborting run"
                    );
                    outcome = RunOutcome::BreakerTripped;
                    break;
                }
            }

            metrics::set_items_pending(progress.stats().pending);

            if progress.should_checkpoint() {
                self.persist_checkpoint(&progress).await;
                progress.reset_checkpoint_counter();
            }
        }

        // Finishing: always leave a final checkpoint behind, then summarize.
        self.persist_checkpoint(&progress).await;
        let summary = RunSummary::build(
            outcome,
            started.elapsed(),
            &progress,
            self.client.stats(),
            self.storage.stats(),
        );
        summary.log();
        summary
    }

    /// Discovery: the one irrecoverable prerequisite. An empty listing or a
    /// failure after the client's internal retries aborts the run without
    /// writing a checkpoint, so the next attempt starts from discovery again.
    async fn discover(&mut self, started: Instant) -> Result<ProgressStateStore, RunSummary> {
        let mut store = ProgressStateStore::new(
            self.config.max_retries,
            self.config.checkpoint_frequency,
        );

        let calls_before = self.client.stats().total_requests;
        let result = self.client.discover_items(&self.config.period).await;
        store.record_api_calls(self.client.stats().total_requests - calls_before);

        let items = match result {
            Ok(items) if items.is_empty() => {
                error!(period = %self.config.period, "Discovery returned no items, aborting");
                return Err(self.abort_summary(started, &store));
            }
            Ok(items) => items,
            Err(e) => {
                error!(period = %self.config.period, error = %e, "Discovery failed, aborting");
                return Err(self.abort_summary(started, &store));
            }
        };

        let added = store.add_discovered_items(&items);
        info!(
            run_id = %store.run_id(),
            discovered = added,
            "Discovery complete"
        );
        Ok(store)
    }

    fn abort_summary(&self, started: Instant, store: &ProgressStateStore) -> RunSummary {
        let summary = RunSummary::build(
            RunOutcome::DiscoveryFailed,
            started.elapsed(),
            store,
            self.client.stats(),
            self.storage.stats(),
        );
        summary.log();
        summary
    }

    /// Process one item: attempt every sub-resource kind, store what
    /// succeeded, and record the outcome. Returns whether the item completed.
    async fn process_item(
        &mut self,
        item: &WorkItem,
        progress: &mut ProgressStateStore,
    ) -> bool {
        debug!(item = %item.id, retry_count = item.retry_count, "Processing item");

        let calls_before = self.client.stats().total_requests;
        let mut fetched: BTreeMap<SubResourceKind, SubResourcePayload> = BTreeMap::new();
        let mut first_error: Option<String> = None;

        for kind in SubResourceKind::ALL {
            match self.client.fetch_sub_resource(&item.id, kind).await {
                Ok(payload) => {
                    fetched.insert(kind, payload);
                }
                Err(e) => {
                    warn!(item = %item.id, kind = %kind, error = %e, "Sub-resource fetch failed");
                    if first_error.is_none() {
                        first_error = Some(format!("{kind}: {e}"));
                    }
                }
            }
        }
        progress.record_api_calls(self.client.stats().total_requests - calls_before);

        if fetched.is_empty() {
            let error =
                first_error.unwrap_or_else(|| "all sub-resource fetches failed".to_string());
            progress.mark_failed(&item.id, &error, true);
            metrics::record_item(false);
            return false;
        }

        let storage_before = self.storage.stats();
        let mut stored: BTreeSet<SubResourceKind> = BTreeSet::new();
        let mut store_failures = false;

        for (kind, payload) in &fetched {
            if self.config.dry_run {
                info!(
                    item = %item.id,
                    kind = %kind,
                    rows = payload.row_count(),
                    "Dry run: skipping store"
                );
                stored.insert(*kind);
                continue;
            }

            let api_metadata = ApiMetadata {
                source: DATA_SOURCE.to_string(),
                endpoint: kind.to_string(),
            };
            let ok = self
                .storage
                .store_item_data(
                    *kind,
                    &item.id,
                    &self.config.period,
                    item.date,
                    payload,
                    &api_metadata,
                )
                .await;
            if ok {
                stored.insert(*kind);
            } else {
                store_failures = true;
            }
        }

        let storage_after = self.storage.stats();
        progress.record_stored(
            storage_after.files_uploaded - storage_before.files_uploaded,
            storage_after.total_bytes_uploaded - storage_before.total_bytes_uploaded,
        );

        if stored.is_empty() {
            progress.mark_failed(&item.id, "storage failed for every fetched sub-resource", true);
            metrics::record_item(false);
            return false;
        }
        if store_failures {
            warn!(item = %item.id, "Some fetched sub-resources failed to store");
        }

        info!(
            item = %item.id,
            kinds = stored.len(),
            of = SubResourceKind::ALL.len(),
            "Item completed"
        );
        progress.mark_completed(&item.id, stored);
        metrics::record_item(true);
        true
    }

    /// Persist a checkpoint. A write failure is logged and non-fatal: only
    /// resumability from this exact point is at risk.
    async fn persist_checkpoint(&mut self, progress: &ProgressStateStore) {
        if self.config.dry_run {
            debug!("Dry run: skipping checkpoint write");
            return;
        }
        let document = progress.to_serializable(&self.config);
        if let Err(e) = self.storage.store_checkpoint(&document).await {
            warn!(error = %e, "Checkpoint write failed, continuing");
        }
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false)
    }
}
