//! End-to-end orchestrator scenarios over a scripted client and in-memory
//! object storage.

use crate::support::{discovered, Behavior, ScriptedClient};
use boxscore_backfill::backfill::{BackfillConfig, BackfillOrchestrator, RunOutcome};
use boxscore_backfill::progress::WorkStatus;
use boxscore_backfill::storage::{object, DurableStorage};
use boxscore_backfill::SubResourceKind;
use opendal::Operator;

const PREFIX: &str = "boxscores";

fn shared_storage() -> (Operator, DurableStorage) {
    let op = object::memory_operator().unwrap();
    let storage = DurableStorage::with_operator(op.clone(), PREFIX);
    (op, storage)
}

fn inspector(op: &Operator) -> DurableStorage {
    DurableStorage::with_operator(op.clone(), PREFIX)
}

fn config(max_retries: u32, checkpoint_frequency: u32) -> BackfillConfig {
    BackfillConfig {
        max_retries,
        checkpoint_frequency,
        ..BackfillConfig::new("2023-24", "memory")
    }
}

/// The reference scenario: three items where A fully succeeds, B succeeds
/// only its traditional box score, and C fails every kind on every attempt,
/// with max_retries=1 and checkpoint_frequency=2.
#[tokio::test]
async fn test_reference_scenario_partial_and_failed_items() {
    let mut client = ScriptedClient::new(vec![
        discovered("A"),
        discovered("B"),
        discovered("C"),
    ]);
    client.set_behavior("B", SubResourceKind::Advanced, Behavior::Fail);
    client.set_behavior("B", SubResourceKind::PlayByPlay, Behavior::Fail);
    client.set_item_behavior("C", Behavior::Fail);

    let (op, storage) = shared_storage();
    let mut orchestrator =
        BackfillOrchestrator::new(config(1, 2), Box::new(client), storage);
    let summary = orchestrator.run_with_summary().await;

    // The breaker never trips: one failing item is not a storm.
    assert_eq!(summary.outcome, RunOutcome::Drained);
    assert!(summary.is_success());
    assert_eq!(summary.progress.completed, 2);
    assert_eq!(summary.progress.failed, 1);
    assert_eq!(summary.progress.pending, 0);

    let inspect = inspector(&op);
    let final_checkpoint = inspect.load_checkpoint().await.expect("final checkpoint");
    assert_eq!(final_checkpoint.stats.completed, 2);
    assert_eq!(final_checkpoint.stats.failed, 1);
    assert_eq!(final_checkpoint.stats.pending, 0);

    // One mid-run checkpoint (after the second processed item) plus one
    // final checkpoint: the backup slot holds the mid-run snapshot.
    let backup_bytes = op
        .read(&inspect.checkpoint_backup_key())
        .await
        .expect("mid-run checkpoint preserved as backup");
    let mid_run: boxscore_backfill::progress::CheckpointDocument =
        serde_json::from_slice(&backup_bytes.to_vec()).unwrap();
    assert_eq!(mid_run.stats.completed, 2);
    assert_eq!(mid_run.stats.failed, 0);
    assert_eq!(mid_run.stats.pending, 1);

    // Item-level audit record.
    let item_b = &final_checkpoint.items["B"];
    assert_eq!(item_b.status, WorkStatus::Completed);
    assert_eq!(
        item_b.completed_sub_resources.iter().copied().collect::<Vec<_>>(),
        vec![SubResourceKind::Traditional]
    );
    let item_c = &final_checkpoint.items["C"];
    assert_eq!(item_c.status, WorkStatus::Failed);
    assert_eq!(item_c.retry_count, 1);
    assert!(item_c.error_message.is_some());

    // A wrote 3 files, B wrote 1, C wrote none.
    let files = inspect.list_keys("").await.unwrap();
    let parquet: Vec<&String> = files.iter().filter(|k| k.ends_with(".parquet")).collect();
    assert_eq!(parquet.len(), 4);
}

/// Partial success persists exactly the kinds that succeeded.
#[tokio::test]
async fn test_partial_success_writes_exactly_succeeded_kinds() {
    let mut client = ScriptedClient::new(vec![discovered("G1")]);
    client.set_behavior("G1", SubResourceKind::PlayByPlay, Behavior::Fail);

    let (op, storage) = shared_storage();
    let mut orchestrator =
        BackfillOrchestrator::new(config(3, 10), Box::new(client), storage);
    assert!(orchestrator.run().await);

    let inspect = inspector(&op);
    let checkpoint = inspect.load_checkpoint().await.unwrap();
    let item = &checkpoint.items["G1"];
    assert_eq!(item.status, WorkStatus::Completed);
    assert_eq!(
        item.completed_sub_resources.iter().copied().collect::<Vec<_>>(),
        vec![SubResourceKind::Traditional, SubResourceKind::Advanced]
    );

    let files = inspect.list_keys("").await.unwrap();
    let parquet: Vec<&String> = files.iter().filter(|k| k.ends_with(".parquet")).collect();
    assert_eq!(parquet.len(), 2);
    assert!(parquet.iter().any(|k| k.contains("/traditional/")));
    assert!(parquet.iter().any(|k| k.contains("/advanced/")));
    assert!(!parquet.iter().any(|k| k.contains("/play_by_play/")));
}

/// An empty payload counts as success for its kind and writes no file.
#[tokio::test]
async fn test_empty_payload_completes_without_files() {
    let mut client = ScriptedClient::new(vec![discovered("G1")]);
    client.set_item_behavior("G1", Behavior::SucceedEmpty);

    let (op, storage) = shared_storage();
    let mut orchestrator =
        BackfillOrchestrator::new(config(3, 10), Box::new(client), storage);
    assert!(orchestrator.run().await);

    let inspect = inspector(&op);
    let checkpoint = inspect.load_checkpoint().await.unwrap();
    assert_eq!(checkpoint.items["G1"].status, WorkStatus::Completed);
    assert_eq!(checkpoint.stats.total_files_stored, 0);

    let files = inspect.list_keys("").await.unwrap();
    assert!(!files.iter().any(|k| k.ends_with(".parquet")));
}

/// With a client that fails every call, the run stops after exactly 10
/// consecutive per-item failures and returns false.
#[tokio::test]
async fn test_circuit_breaker_after_ten_consecutive_failures() {
    let items: Vec<_> = (0..20).map(|i| discovered(&format!("{i:02}"))).collect();
    let client = ScriptedClient::failing(items);
    let log = client.log();

    let (op, storage) = shared_storage();
    let mut orchestrator =
        BackfillOrchestrator::new(config(5, 100), Box::new(client), storage);
    let summary = orchestrator.run_with_summary().await;

    assert_eq!(summary.outcome, RunOutcome::BreakerTripped);
    assert!(!summary.is_success());
    // Exactly 10 items attempted, each across all 3 kinds.
    assert_eq!(log.fetched_items().len(), 10);
    assert_eq!(log.fetch_count(), 30);

    // The trip still leaves a resumable checkpoint behind.
    let checkpoint = inspector(&op).load_checkpoint().await.unwrap();
    assert_eq!(checkpoint.stats.pending, 20);
}

/// Discovery returning no items aborts the run without leaving a
/// checkpoint that a later run could mistake for drained state.
#[tokio::test]
async fn test_empty_discovery_aborts_without_checkpoint() {
    let client = ScriptedClient::new(vec![]);
    let (op, storage) = shared_storage();
    let mut orchestrator =
        BackfillOrchestrator::new(config(3, 10), Box::new(client), storage);
    let summary = orchestrator.run_with_summary().await;

    assert_eq!(summary.outcome, RunOutcome::DiscoveryFailed);
    assert!(inspector(&op).load_checkpoint().await.is_none());
}

/// A dry run fetches everything but writes neither data nor checkpoints.
#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let client = ScriptedClient::new(vec![discovered("A"), discovered("B")]);
    let log = client.log();

    let (op, storage) = shared_storage();
    let dry_config = BackfillConfig {
        dry_run: true,
        ..config(3, 1)
    };
    let mut orchestrator = BackfillOrchestrator::new(dry_config, Box::new(client), storage);
    assert!(orchestrator.run().await);

    assert_eq!(log.fetch_count(), 6);
    let inspect = inspector(&op);
    assert!(inspect.load_checkpoint().await.is_none());
    assert!(inspect.list_keys("").await.unwrap().is_empty());
}
