//! Checkpoint document types
//!
//! The JSON snapshot persisted by the storage layer. The document embeds a
//! schema version; an unknown version is treated by callers as "no
//! checkpoint" since discovery is idempotent and a fresh start is always
//! safe.

use crate::backfill::BackfillConfig;
use crate::progress::store::{ProgressStats, WorkItem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current checkpoint schema version.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// The durable, resumable unit of orchestrator state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointDocument {
    /// Schema version of this document
    pub schema_version: String,
    /// Identifier of the run that wrote the snapshot
    pub run_id: String,
    /// Full work-item map, keyed by item id
    pub items: BTreeMap<String, WorkItem>,
    /// Aggregate counters at snapshot time
    pub stats: ProgressStats,
    /// Snapshot provenance
    pub checkpoint_metadata: CheckpointMetadata,
}

/// Provenance recorded alongside every snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// When this snapshot was taken
    pub last_checkpoint: DateTime<Utc>,
    /// The configuration the writing run was started with
    pub config_snapshot: BackfillConfig,
}

impl CheckpointDocument {
    /// Whether this document carries the schema version this build writes.
    pub fn schema_version_matches(&self) -> bool {
        self.schema_version == SCHEMA_VERSION
    }
}
