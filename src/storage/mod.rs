//! Parquet encoding and object-storage persistence
//!
//! [`DurableStorage`] persists both output data files and checkpoint
//! snapshots through one opendal [`Operator`](opendal::Operator), so the
//! same code path serves local directories, S3 buckets, and the in-memory
//! backend used by tests.

pub mod object;
pub mod parquet;
pub mod path;
pub mod store;

pub use path::YearMonth;
pub use store::{ApiMetadata, DurableStorage, StorageStats, UploadTask};

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Backend initialization failure
    #[error("backend error: {0}")]
    Backend(String),

    /// Object read/write failure
    #[error("IO error: {0}")]
    Io(String),

    /// Parquet encoding failure
    #[error("encode error: {0}")]
    Encode(String),

    /// Checkpoint (de)serialization failure
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<opendal::Error> for StorageError {
    fn from(e: opendal::Error) -> Self {
        StorageError::Io(e.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
