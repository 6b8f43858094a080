//! # Boxscore Backfill Library
//!
//! A resumable backfill engine for historical sports-event statistics.
//! Pulls per-game box-score data from a rate-limited statistics API and
//! lands it as partitioned, compressed parquet files in object storage,
//! checkpointing progress so interrupted runs pick up where they left off.
//!
//! ## Features
//!
//! - **Resumable**: durable JSON checkpoints with automatic restore on startup
//! - **Adaptive Rate Limiting**: inter-request delay that backs off on 429/5xx
//!   responses and recovers once the API is healthy
//! - **Partial-Failure Tolerant**: per-game sub-resources (traditional box
//!   score, advanced box score, play-by-play) succeed or fail independently
//! - **Circuit Breaker**: aborts the run after a storm of consecutive failures
//!   instead of burning API quota against an outage
//! - **Columnar Output**: dictionary-encoded, compressed parquet with embedded
//!   provenance metadata, partitioned by month
//!
//! ## Quick Start
//!
//! ```no_run
//! use boxscore_backfill::backfill::{BackfillConfig, BackfillOrchestrator};
//! use boxscore_backfill::client::{HttpStatsClient, RateLimiter};
//! use boxscore_backfill::storage::DurableStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BackfillConfig::new("2023-24", "./backfill-data");
//! let limiter = RateLimiter::new(config.rate_limit_base_delay);
//! let client = HttpStatsClient::new("https://stats.example.com", limiter);
//! let storage = DurableStorage::local("./backfill-data", "boxscores")?;
//!
//! let mut orchestrator = BackfillOrchestrator::new(config, Box::new(client), storage);
//! let drained = orchestrator.run().await;
//! # let _ = drained;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`client`] - Rate-limited statistics API client with bounded retry
//! - [`progress`] - Per-item progress tracking and checkpoint round-tripping
//! - [`storage`] - Parquet encoding and object-storage persistence
//! - [`backfill`] - The orchestrator control loop composing the above
//! - [`shutdown`] - Graceful interrupt coordination
//!
//! ## Data Types
//!
//! The library defines strongly-typed structures for the payloads crossing
//! the API boundary:
//!
//! - [`SubResourceKind`] - The distinct data products tied to one game
//! - [`DiscoveredItem`] - A game surfaced by period discovery
//! - [`TableBatch`] - One tabular result set with typed columns

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Backfill orchestration
pub mod backfill;

/// CLI command implementations
pub mod cli;

/// Statistics API client
pub mod client;

/// Prometheus metrics integration
pub mod metrics;

/// Per-item progress tracking and checkpointing
pub mod progress;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

/// Parquet encoding and object-storage persistence
pub mod storage;

/// One of the distinct data products fetched per game.
///
/// Kinds are mutually independent: a failure fetching one never blocks the
/// others, and an item is considered complete as soon as at least one kind
/// has been stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SubResourceKind {
    /// Traditional box score (points, rebounds, assists, ...)
    #[serde(rename = "traditional")]
    Traditional,
    /// Advanced box score (ratings, pace, usage, ...)
    #[serde(rename = "advanced")]
    Advanced,
    /// Play-by-play event log
    #[serde(rename = "play_by_play")]
    PlayByPlay,
}

impl SubResourceKind {
    /// All kinds, in the fixed order they are attempted per item.
    pub const ALL: [SubResourceKind; 3] = [
        SubResourceKind::Traditional,
        SubResourceKind::Advanced,
        SubResourceKind::PlayByPlay,
    ];

    /// Stable lowercase label used in object keys and checkpoints.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubResourceKind::Traditional => "traditional",
            SubResourceKind::Advanced => "advanced",
            SubResourceKind::PlayByPlay => "play_by_play",
        }
    }
}

impl std::fmt::Display for SubResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SubResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "traditional" => Ok(SubResourceKind::Traditional),
            "advanced" => Ok(SubResourceKind::Advanced),
            "play_by_play" => Ok(SubResourceKind::PlayByPlay),
            _ => Err(format!("Invalid sub-resource kind: {s}")),
        }
    }
}

/// A game surfaced by period discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredItem {
    /// Stable game identifier from the upstream API (e.g., "0022300451")
    pub game_id: String,
    /// Calendar date the game was played
    pub game_date: NaiveDate,
}

impl DiscoveredItem {
    /// Validate discovered-item integrity.
    pub fn validate(&self) -> Result<(), String> {
        if self.game_id.is_empty() {
            return Err("Game id cannot be empty".to_string());
        }
        if self.game_id.chars().any(|c| c == '/' || c.is_whitespace()) {
            return Err(format!(
                "Game id contains characters unsafe for object keys: {}",
                self.game_id
            ));
        }
        Ok(())
    }
}

/// Typed column values for one tabular result set.
///
/// The upstream API is loosely typed JSON; the client parses each column into
/// one of these variants at the boundary so the storage layer never sees
/// opaque maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnValues {
    /// 64-bit integer column, null-aware
    Int64(Vec<Option<i64>>),
    /// 64-bit float column, null-aware
    Float64(Vec<Option<f64>>),
    /// UTF-8 string column, null-aware
    Utf8(Vec<Option<String>>),
}

impl ColumnValues {
    /// Number of values (rows) in the column.
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Int64(v) => v.len(),
            ColumnValues::Float64(v) => v.len(),
            ColumnValues::Utf8(v) => v.len(),
        }
    }

    /// Whether the column holds no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A named, typed column within a [`TableBatch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnData {
    /// Column name as reported by the upstream result set headers
    pub name: String,
    /// Column values
    pub values: ColumnValues,
}

/// One tabular result set from a sub-resource payload.
///
/// A single API response may carry several result sets (e.g., player stats
/// and team stats); each becomes its own `TableBatch` and, downstream, its
/// own parquet file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableBatch {
    /// Result set name as reported by the API (e.g., "PlayerStats")
    pub name: String,
    /// Columns, all of equal length
    pub columns: Vec<ColumnData>,
}

impl TableBatch {
    /// Number of rows in the batch (0 for a column-less batch).
    pub fn row_count(&self) -> usize {
        self.columns.first().map(|c| c.values.len()).unwrap_or(0)
    }

    /// Number of columns in the batch.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Whether the batch carries no rows.
    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// Validate batch integrity: a non-empty name, non-empty column names,
    /// and rectangular shape (all columns the same length).
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("Result set name cannot be empty".to_string());
        }

        let expected = self.row_count();
        for column in &self.columns {
            if column.name.is_empty() {
                return Err(format!(
                    "Result set {} has a column with an empty name",
                    self.name
                ));
            }
            if column.values.len() != expected {
                return Err(format!(
                    "Result set {} is ragged: column {} has {} rows, expected {}",
                    self.name,
                    column.name,
                    column.values.len(),
                    expected
                ));
            }
        }

        Ok(())
    }
}

/// A fetched sub-resource: the kind tag plus its tabular result sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubResourcePayload {
    /// Which data product this payload belongs to
    pub kind: SubResourceKind,
    /// The result sets carried by the response
    pub tables: Vec<TableBatch>,
}

impl SubResourcePayload {
    /// Total rows across all result sets.
    pub fn row_count(&self) -> usize {
        self.tables.iter().map(TableBatch::row_count).sum()
    }

    /// Whether every result set is empty.
    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(TableBatch::is_empty)
    }
}
