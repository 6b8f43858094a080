//! CLI command implementations

use clap::{Parser, Subcommand};

pub mod backfill;

pub use backfill::BackfillArgs;

/// Historical backfill of sports-event statistics into object storage.
#[derive(Debug, Parser)]
#[command(name = "boxscore-backfill", version, about)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a resumable historical backfill for one period
    Backfill(BackfillArgs),
}

/// CLI-level errors.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// An argument failed validation
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Storage initialization failed
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    /// Metrics exporter initialization failed
    #[error("metrics error: {0}")]
    Metrics(String),
}
