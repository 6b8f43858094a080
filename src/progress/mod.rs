//! Per-item progress tracking and checkpointing
//!
//! [`ProgressStateStore`] owns the authoritative map of work items and the
//! aggregate counters derived from it; [`CheckpointDocument`] is its durable
//! JSON form. The store is mutated only by the orchestrator task.

pub mod checkpoint;
pub mod store;

pub use checkpoint::{CheckpointDocument, CheckpointMetadata, SCHEMA_VERSION};
pub use store::{Discrepancy, ProgressStateStore, ProgressStats, WorkItem, WorkStatus};
