//! Shared test support: a scripted statistics client
//!
//! Implements [`StatsProvider`] over a per-(item, kind) behavior table so
//! orchestrator tests can exercise success, partial failure, and outage
//! paths without any network. A cloneable [`CallLog`] stays observable
//! after the client is boxed into the orchestrator.

use async_trait::async_trait;
use boxscore_backfill::client::{ClientStats, FetchError, FetchResult, StatsProvider};
use boxscore_backfill::shutdown::SharedShutdown;
use boxscore_backfill::{
    ColumnData, ColumnValues, DiscoveredItem, SubResourceKind, SubResourcePayload, TableBatch,
};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted outcome for one (item, kind) fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Return a small valid payload
    Succeed,
    /// Return a payload whose result-set list is empty
    SucceedEmpty,
    /// Fail with a transient network error
    Fail,
}

/// Observable record of the calls a [`ScriptedClient`] received.
#[derive(Clone, Default)]
pub struct CallLog {
    fetches: Arc<Mutex<Vec<(String, SubResourceKind)>>>,
    discoveries: Arc<AtomicU32>,
}

impl CallLog {
    /// All fetch calls, in order.
    pub fn fetches(&self) -> Vec<(String, SubResourceKind)> {
        self.fetches.lock().unwrap().clone()
    }

    /// Number of fetch calls.
    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }

    /// Item ids that were fetched at least once.
    pub fn fetched_items(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .fetches
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect();
        ids.dedup();
        ids
    }

    /// Number of discovery calls.
    pub fn discovery_count(&self) -> u32 {
        self.discoveries.load(Ordering::SeqCst)
    }
}

/// A [`StatsProvider`] driven by a behavior table.
pub struct ScriptedClient {
    items: Vec<DiscoveredItem>,
    behaviors: HashMap<(String, SubResourceKind), Behavior>,
    default_behavior: Behavior,
    log: CallLog,
    shutdown_after_fetches: Option<(usize, SharedShutdown)>,
    stats: ClientStats,
}

impl ScriptedClient {
    /// Client discovering the given items, succeeding on every fetch.
    pub fn new(items: Vec<DiscoveredItem>) -> Self {
        Self {
            items,
            behaviors: HashMap::new(),
            default_behavior: Behavior::Succeed,
            log: CallLog::default(),
            shutdown_after_fetches: None,
            stats: ClientStats::default(),
        }
    }

    /// Client failing every fetch.
    pub fn failing(items: Vec<DiscoveredItem>) -> Self {
        Self {
            default_behavior: Behavior::Fail,
            ..Self::new(items)
        }
    }

    /// Handle to the call log, valid after the client is boxed.
    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    /// Script one (item, kind) outcome.
    pub fn set_behavior(&mut self, item_id: &str, kind: SubResourceKind, behavior: Behavior) {
        self.behaviors.insert((item_id.to_string(), kind), behavior);
    }

    /// Script all kinds of one item at once.
    pub fn set_item_behavior(&mut self, item_id: &str, behavior: Behavior) {
        for kind in SubResourceKind::ALL {
            self.set_behavior(item_id, kind, behavior);
        }
    }

    /// Request shutdown on the given handle once `count` fetches happened.
    pub fn shutdown_after(&mut self, count: usize, shutdown: SharedShutdown) {
        self.shutdown_after_fetches = Some((count, shutdown));
    }

    fn behavior_for(&self, item_id: &str, kind: SubResourceKind) -> Behavior {
        self.behaviors
            .get(&(item_id.to_string(), kind))
            .copied()
            .unwrap_or(self.default_behavior)
    }
}

#[async_trait]
impl StatsProvider for ScriptedClient {
    async fn discover_items(&mut self, _period: &str) -> FetchResult<Vec<DiscoveredItem>> {
        self.log.discoveries.fetch_add(1, Ordering::SeqCst);
        self.stats.total_requests += 1;
        self.stats.successes += 1;
        self.stats.cumulative_latency += Duration::from_millis(5);
        Ok(self.items.clone())
    }

    async fn fetch_sub_resource(
        &mut self,
        item_id: &str,
        kind: SubResourceKind,
    ) -> FetchResult<SubResourcePayload> {
        let fetch_count = {
            let mut fetches = self.log.fetches.lock().unwrap();
            fetches.push((item_id.to_string(), kind));
            fetches.len()
        };
        self.stats.total_requests += 1;
        self.stats.cumulative_latency += Duration::from_millis(5);

        if let Some((threshold, shutdown)) = &self.shutdown_after_fetches {
            if fetch_count >= *threshold {
                shutdown.request_shutdown();
            }
        }

        match self.behavior_for(item_id, kind) {
            Behavior::Succeed => {
                self.stats.successes += 1;
                Ok(sample_payload(item_id, kind))
            }
            Behavior::SucceedEmpty => {
                self.stats.successes += 1;
                Ok(SubResourcePayload { kind, tables: vec![] })
            }
            Behavior::Fail => {
                self.stats.failures += 1;
                Err(FetchError::Network("connection reset".to_string()))
            }
        }
    }

    fn stats(&self) -> ClientStats {
        self.stats
    }
}

/// A discovered item on a fixed date.
pub fn discovered(id: &str) -> DiscoveredItem {
    DiscoveredItem {
        game_id: id.to_string(),
        game_date: NaiveDate::from_ymd_opt(2023, 11, 14).unwrap(),
    }
}

/// A minimal valid payload for one kind.
pub fn sample_payload(item_id: &str, kind: SubResourceKind) -> SubResourcePayload {
    let (table_name, columns) = match kind {
        SubResourceKind::PlayByPlay => (
            "PlayByPlay",
            vec![
                ColumnData {
                    name: "GAME_ID".to_string(),
                    values: ColumnValues::Utf8(vec![Some(item_id.to_string())]),
                },
                ColumnData {
                    name: "EVENTNUM".to_string(),
                    values: ColumnValues::Int64(vec![Some(1)]),
                },
                ColumnData {
                    name: "PERIOD".to_string(),
                    values: ColumnValues::Int64(vec![Some(1)]),
                },
            ],
        ),
        _ => (
            "PlayerStats",
            vec![
                ColumnData {
                    name: "GAME_ID".to_string(),
                    values: ColumnValues::Utf8(vec![Some(item_id.to_string())]),
                },
                ColumnData {
                    name: "PLAYER_ID".to_string(),
                    values: ColumnValues::Int64(vec![Some(201939)]),
                },
                ColumnData {
                    name: "TEAM_ID".to_string(),
                    values: ColumnValues::Int64(vec![Some(1610612744)]),
                },
            ],
        ),
    };

    SubResourcePayload {
        kind,
        tables: vec![TableBatch {
            name: table_name.to_string(),
            columns,
        }],
    }
}
