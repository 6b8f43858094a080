//! Durable storage for output files and checkpoints
//!
//! All writes go through one opendal operator. Data-file uploads run through
//! a small bounded worker pool (object keys are independent, unlike the
//! rate-limited API); checkpoint writes are sequential and guarded by a
//! best-effort backup copy of the previous snapshot.

use crate::metrics;
use crate::progress::CheckpointDocument;
use crate::storage::parquet::{encode_table, FileProvenance};
use crate::storage::{object, path, StorageResult};
use crate::{SubResourceKind, SubResourcePayload};
use chrono::{NaiveDate, Utc};
use futures_util::stream::{self, StreamExt};
use opendal::{ErrorKind, Operator};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default bounded-upload worker count.
const DEFAULT_UPLOAD_WORKERS: usize = 3;

/// Fixed object name of the current checkpoint.
const CHECKPOINT_OBJECT: &str = "checkpoint.json";

/// Fixed object name of the prior checkpoint.
const CHECKPOINT_BACKUP_OBJECT: &str = "checkpoint_backup.json";

/// Caller-supplied provenance for stored payloads.
#[derive(Debug, Clone)]
pub struct ApiMetadata {
    /// Upstream system name (e.g., "stats-api")
    pub source: String,
    /// Logical endpoint/product the payload came from
    pub endpoint: String,
}

/// One pending object upload.
#[derive(Debug, Clone)]
pub struct UploadTask {
    /// Destination object key
    pub key: String,
    /// Object contents
    pub bytes: Vec<u8>,
}

/// Cumulative storage-side statistics, surfaced in the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StorageStats {
    /// Objects successfully uploaded
    pub files_uploaded: u64,
    /// Bytes successfully uploaded
    pub total_bytes_uploaded: u64,
    /// Failed upload attempts
    pub failures: u64,
    /// Wall-clock time spent inside upload batches
    pub cumulative_upload_time: Duration,
}

/// Persists output data files and checkpoint snapshots to object storage.
pub struct DurableStorage {
    op: Operator,
    prefix: String,
    max_workers: usize,
    stats: StorageStats,
}

impl DurableStorage {
    /// Storage rooted at a local directory.
    pub fn local(root: &str, prefix: &str) -> StorageResult<Self> {
        Ok(Self::with_operator(object::local_operator(root)?, prefix))
    }

    /// Storage backed by S3 (or an S3-compatible endpoint).
    pub fn s3(
        bucket: &str,
        region: &str,
        root: &str,
        prefix: &str,
        endpoint: Option<&str>,
    ) -> StorageResult<Self> {
        Ok(Self::with_operator(
            object::s3_operator(bucket, region, root, endpoint)?,
            prefix,
        ))
    }

    /// In-memory storage for tests and experimentation.
    pub fn memory(prefix: &str) -> StorageResult<Self> {
        Ok(Self::with_operator(object::memory_operator()?, prefix))
    }

    /// Storage over an already-built operator.
    pub fn with_operator(op: Operator, prefix: &str) -> Self {
        Self {
            op,
            prefix: prefix.trim_matches('/').to_string(),
            max_workers: DEFAULT_UPLOAD_WORKERS,
            stats: StorageStats::default(),
        }
    }

    /// Override the bounded-upload worker count.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Cumulative storage statistics.
    pub fn stats(&self) -> StorageStats {
        self.stats
    }

    /// Key of the current checkpoint object.
    pub fn checkpoint_key(&self) -> String {
        format!("{}/{}", self.prefix, CHECKPOINT_OBJECT)
    }

    /// Key of the prior checkpoint object.
    pub fn checkpoint_backup_key(&self) -> String {
        format!("{}/{}", self.prefix, CHECKPOINT_BACKUP_OBJECT)
    }

    /// Store every result table of one sub-resource payload.
    ///
    /// Best-effort, not all-or-nothing: every table is attempted even when
    /// an earlier one fails, and `false` is returned if any failed. Empty
    /// tables are skipped and counted as success — an empty play-by-play is
    /// data absence upstream, not an error here.
    pub async fn store_item_data(
        &mut self,
        kind: SubResourceKind,
        item_id: &str,
        period_key: &str,
        date: NaiveDate,
        payload: &SubResourcePayload,
        api_metadata: &ApiMetadata,
    ) -> bool {
        let ingestion = Utc::now();
        let timestamp_ms = ingestion.timestamp_millis();
        let provenance = FileProvenance {
            source: &api_metadata.source,
            endpoint: &api_metadata.endpoint,
            item_id,
            date,
            period: period_key,
            kind,
            ingestion_timestamp: ingestion,
        };

        let mut tasks = Vec::new();
        let mut encode_ok = true;
        for (index, table) in payload.tables.iter().enumerate() {
            if table.is_empty() {
                info!(
                    item = item_id,
                    kind = %kind,
                    result_set = %table.name,
                    "Empty result set, nothing to store"
                );
                continue;
            }
            match encode_table(table, &provenance) {
                Ok(bytes) => tasks.push(UploadTask {
                    key: path::data_object_key(
                        &self.prefix,
                        kind,
                        item_id,
                        date,
                        timestamp_ms,
                        index,
                    ),
                    bytes,
                }),
                Err(e) => {
                    warn!(
                        item = item_id,
                        kind = %kind,
                        result_set = %table.name,
                        error = %e,
                        "Failed to encode result set"
                    );
                    encode_ok = false;
                }
            }
        }

        if tasks.is_empty() {
            return encode_ok;
        }

        let results = self.upload_many(tasks, self.max_workers).await;
        encode_ok && results.iter().all(|ok| *ok)
    }

    /// Upload independent objects through a bounded worker pool.
    ///
    /// Per-task failures become a `false` result for that task instead of
    /// aborting the batch; results preserve task order.
    pub async fn upload_many(&mut self, tasks: Vec<UploadTask>, max_workers: usize) -> Vec<bool> {
        if tasks.is_empty() {
            return Vec::new();
        }

        let started = Instant::now();
        let op = self.op.clone();
        let outcomes: Vec<(bool, u64)> = stream::iter(tasks.into_iter().map(|task| {
            let op = op.clone();
            async move {
                let size = task.bytes.len() as u64;
                match op.write(&task.key, task.bytes).await {
                    Ok(_) => {
                        debug!(key = %task.key, bytes = size, "Object uploaded");
                        (true, size)
                    }
                    Err(e) => {
                        warn!(key = %task.key, error = %e, "Object upload failed");
                        (false, 0)
                    }
                }
            }
        }))
        .buffered(max_workers.max(1))
        .collect()
        .await;

        let elapsed = started.elapsed();
        self.stats.cumulative_upload_time += elapsed;
        let mut results = Vec::with_capacity(outcomes.len());
        for (ok, bytes) in outcomes {
            if ok {
                self.stats.files_uploaded += 1;
                self.stats.total_bytes_uploaded += bytes;
            } else {
                self.stats.failures += 1;
            }
            metrics::record_upload(ok, bytes);
            results.push(ok);
        }
        results
    }

    /// Persist a checkpoint snapshot at the fixed key.
    ///
    /// The previous snapshot is first copied to the backup key; a backup
    /// failure is logged and never fatal.
    pub async fn store_checkpoint(&mut self, document: &CheckpointDocument) -> StorageResult<()> {
        let key = self.checkpoint_key();
        let backup_key = self.checkpoint_backup_key();

        match self.op.read(&key).await {
            Ok(existing) => {
                if let Err(e) = self.op.write(&backup_key, existing.to_vec()).await {
                    warn!(key = %backup_key, error = %e, "Checkpoint backup failed, continuing");
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(key = %key, error = %e, "Could not read current checkpoint for backup");
            }
        }

        let json = serde_json::to_vec_pretty(document)
            .map_err(|e| crate::storage::StorageError::Serialization(e.to_string()))?;
        let size = json.len() as u64;
        self.op.write(&key, json).await?;

        info!(
            key = %key,
            bytes = size,
            items = document.items.len(),
            "Checkpoint stored"
        );
        Ok(())
    }

    /// Load the current checkpoint, if a usable one exists.
    ///
    /// A missing object, unreadable JSON, and a schema-version mismatch all
    /// normalize to `None`: discovery is idempotent, so falling back to a
    /// fresh run is always safe.
    pub async fn load_checkpoint(&self) -> Option<CheckpointDocument> {
        let key = self.checkpoint_key();
        let bytes = match self.op.read(&key).await {
            Ok(buffer) => buffer.to_vec(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(key = %key, "No checkpoint found");
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Checkpoint read failed, starting fresh");
                return None;
            }
        };

        match serde_json::from_slice::<CheckpointDocument>(&bytes) {
            Ok(document) if document.schema_version_matches() => Some(document),
            Ok(document) => {
                warn!(
                    key = %key,
                    found_version = %document.schema_version,
                    "Checkpoint schema version mismatch, starting fresh"
                );
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Unreadable checkpoint, starting fresh");
                None
            }
        }
    }

    /// List object keys under a prefix (recursive). Used by tests and
    /// operational tooling to inspect run output.
    pub async fn list_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let dir = if prefix.is_empty() {
            format!("{}/", self.prefix)
        } else {
            format!("{}/{}/", self.prefix, prefix.trim_matches('/'))
        };
        let entries = match self.op.list_with(&dir).recursive(true).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(entries
            .into_iter()
            .filter(|e| !e.path().ends_with('/'))
            .map(|e| e.path().to_string())
            .collect())
    }
}
