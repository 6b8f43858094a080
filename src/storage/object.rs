//! Object-storage operator construction
//!
//! Thin constructors over opendal services. All higher-level code works
//! against the returned [`Operator`], so swapping a local directory for an
//! S3 bucket is a configuration change, not a code change.

use crate::storage::{StorageError, StorageResult};
use opendal::Operator;

/// Operator backed by a local filesystem directory.
pub fn local_operator(root: &str) -> StorageResult<Operator> {
    let builder = opendal::services::Fs::default().root(root);
    let op = Operator::new(builder)
        .map_err(|e| StorageError::Backend(format!("fs init: {e}")))?
        .finish();
    Ok(op)
}

/// Operator backed by AWS S3 (or an S3-compatible endpoint like MinIO).
///
/// Credentials resolve through the standard AWS environment/profile chain
/// unless provided explicitly.
pub fn s3_operator(
    bucket: &str,
    region: &str,
    root: &str,
    endpoint: Option<&str>,
) -> StorageResult<Operator> {
    let mut builder = opendal::services::S3::default()
        .bucket(bucket)
        .region(region)
        .root(root);
    if let Some(ep) = endpoint {
        builder = builder.endpoint(ep);
    }
    let op = Operator::new(builder)
        .map_err(|e| StorageError::Backend(format!("s3 init: {e}")))?
        .finish();
    Ok(op)
}

/// Operator backed by process memory.
///
/// Backs hermetic tests and `--dry-run` experimentation; contents vanish
/// with the process.
pub fn memory_operator() -> StorageResult<Operator> {
    let builder = opendal::services::Memory::default();
    let op = Operator::new(builder)
        .map_err(|e| StorageError::Backend(format!("memory init: {e}")))?
        .finish();
    Ok(op)
}
