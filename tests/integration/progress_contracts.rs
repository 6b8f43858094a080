//! Contract tests for the progress state store: scheduling order, terminal
//! transitions, and the counter-reconciliation invariant under interleaved
//! mutations.

use crate::support::discovered;
use boxscore_backfill::backfill::BackfillConfig;
use boxscore_backfill::progress::{CheckpointDocument, ProgressStateStore, WorkStatus};
use boxscore_backfill::{DiscoveredItem, SubResourceKind};
use std::collections::BTreeSet;

fn assert_reconciled(store: &ProgressStateStore) {
    let discrepancies = store.validate_integrity();
    assert!(
        discrepancies.is_empty(),
        "reconciliation invariant violated: {discrepancies:?}"
    );
}

#[test]
fn test_discovery_idempotence_across_replays() {
    let mut store = ProgressStateStore::new(3, 10);
    let first: Vec<DiscoveredItem> = ["a", "b", "c"].iter().map(|id| discovered(id)).collect();
    let second: Vec<DiscoveredItem> = ["b", "c", "d", "e"].iter().map(|id| discovered(id)).collect();

    assert_eq!(store.add_discovered_items(&first), 3);
    // Overlapping replay only adds the genuinely new ids.
    assert_eq!(store.add_discovered_items(&second), 2);
    assert_eq!(store.stats().total_discovered, 5);
    assert_eq!(store.stats().pending, 5);
    assert_reconciled(&store);
}

#[test]
fn test_scheduling_prefers_fresh_items() {
    let mut store = ProgressStateStore::new(10, 100);
    store.add_discovered_items(&["a", "b", "c", "d"].map(discovered));

    // Give b and d one failed pass, a two.
    store.mark_failed("b", "boom", true);
    store.mark_failed("d", "boom", true);
    store.mark_failed("a", "boom", true);
    store.mark_failed("a", "boom", true);

    let order: Vec<String> = store
        .get_next_items(10)
        .into_iter()
        .map(|i| i.id)
        .collect();
    assert_eq!(order, ["c", "b", "d", "a"]);
    assert_reconciled(&store);
}

#[test]
fn test_exhausted_item_never_scheduled_again() {
    let mut store = ProgressStateStore::new(2, 100);
    store.add_discovered_items(&["a"].map(discovered));

    store.mark_failed("a", "pass 1", true);
    assert_eq!(store.get_next_items(10).len(), 1);

    store.mark_failed("a", "pass 2", true);
    assert_eq!(store.item("a").unwrap().status, WorkStatus::Failed);
    assert!(store.get_next_items(10).is_empty());

    // Late submissions against the terminal item change nothing.
    store.mark_completed("a", BTreeSet::from([SubResourceKind::Traditional]));
    assert_eq!(store.item("a").unwrap().status, WorkStatus::Failed);
    assert_eq!(store.item("a").unwrap().retry_count, 2);
    assert_reconciled(&store);
}

#[test]
fn test_invariant_holds_under_interleaved_mutations() {
    let mut store = ProgressStateStore::new(2, 3);
    let ids: Vec<String> = (0..30).map(|i| format!("{i:02}")).collect();
    let items: Vec<DiscoveredItem> = ids.iter().map(|id| discovered(id)).collect();
    store.add_discovered_items(&items);
    assert_reconciled(&store);

    for (index, id) in ids.iter().enumerate() {
        match index % 4 {
            // Straight completion.
            0 => store.mark_completed(id, BTreeSet::from([SubResourceKind::Traditional])),
            // One failure, then completion on the retry pass.
            1 => {
                store.mark_failed(id, "first pass", true);
                store.mark_completed(id, BTreeSet::from([SubResourceKind::Advanced]));
            }
            // Failure to exhaustion.
            2 => {
                store.mark_failed(id, "first pass", true);
                store.mark_failed(id, "second pass", true);
            }
            // Left pending.
            _ => {}
        }
        assert_reconciled(&store);
    }

    let stats = store.stats();
    assert_eq!(stats.completed, 16);
    assert_eq!(stats.failed, 7);
    assert_eq!(stats.pending, 7);
    assert_eq!(stats.total_discovered, 30);
}

#[test]
fn test_round_trip_reproduces_statuses_retries_and_stats() {
    let mut store = ProgressStateStore::new(2, 5);
    store.add_discovered_items(&["a", "b", "c", "d"].map(discovered));
    store.mark_completed(
        "a",
        BTreeSet::from([SubResourceKind::Traditional, SubResourceKind::PlayByPlay]),
    );
    store.mark_failed("b", "transient", true);
    store.mark_failed("c", "hard", true);
    store.mark_failed("c", "hard again", true);
    store.record_api_calls(13);
    store.record_stored(3, 98_765);

    let config = BackfillConfig::new("2023-24", "memory");
    let json = serde_json::to_string_pretty(&store.to_serializable(&config)).unwrap();
    let doc: CheckpointDocument = serde_json::from_str(&json).unwrap();
    let restored = ProgressStateStore::from_serializable(doc, 2, 5);

    assert_eq!(restored.items(), store.items());
    assert_eq!(restored.stats().completed, 1);
    assert_eq!(restored.stats().failed, 1);
    assert_eq!(restored.stats().pending, 2);
    assert_eq!(restored.stats().total_api_calls, 13);
    assert_eq!(restored.stats().total_bytes_stored, 98_765);
    assert_eq!(restored.item("b").unwrap().retry_count, 1);
    assert_eq!(restored.item("c").unwrap().status, WorkStatus::Failed);
    assert_reconciled(&restored);
}

#[test]
fn test_checkpoint_document_shape_matches_contract() {
    let mut store = ProgressStateStore::new(2, 5);
    store.add_discovered_items(&["a"].map(discovered));
    store.mark_completed("a", BTreeSet::from([SubResourceKind::Traditional]));

    let config = BackfillConfig::new("2023-24", "memory");
    let json = serde_json::to_value(store.to_serializable(&config)).unwrap();

    assert!(json["run_id"].as_str().unwrap().starts_with("run-"));
    let item = &json["items"]["a"];
    assert_eq!(item["status"], "completed");
    assert_eq!(item["retry_count"], 0);
    assert_eq!(item["completed_sub_resources"][0], "traditional");
    assert!(json["stats"]["estimated_completion"].is_null());
    assert_eq!(
        json["checkpoint_metadata"]["config_snapshot"]["period"],
        "2023-24"
    );
    assert!(json["checkpoint_metadata"]["last_checkpoint"].is_string());
}
