//! Statistics API client
//!
//! Wraps the external statistics API behind [`StatsProvider`], a trait seam
//! the orchestrator depends on so tests can substitute a scripted client.
//! The concrete [`HttpStatsClient`] serializes every outbound request through
//! one [`RateLimiter`] and retries transient failures a bounded number of
//! times.

use crate::{DiscoveredItem, SubResourceKind, SubResourcePayload};
use async_trait::async_trait;
use std::time::Duration;

pub mod http;
pub mod parse;
pub mod rate_limit;

pub use http::HttpStatsClient;
pub use rate_limit::RateLimiter;

/// Fetch errors, split by whether a retry could plausibly succeed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// Network-level failure (timeout, connection refused, DNS)
    #[error("network error: {0}")]
    Network(String),

    /// Upstream returned 429
    #[error("rate limited by upstream")]
    RateLimited,

    /// Upstream returned a 5xx status
    #[error("server error: status {0}")]
    Server(u16),

    /// Upstream returned a non-retryable 4xx status
    #[error("client error: status {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body excerpt
        message: String,
    },

    /// Response body failed to deserialize
    #[error("decode error: {0}")]
    Decode(String),

    /// Response deserialized but violated the expected shape for its kind
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl FetchError {
    /// Whether the same call could plausibly succeed if repeated.
    ///
    /// Transient errors are retried at the call site; everything else
    /// surfaces immediately as a per-item failure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Network(_) | FetchError::RateLimited | FetchError::Server(_)
        )
    }
}

/// Result type for client operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Cumulative client-side request statistics, surfaced in the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClientStats {
    /// Total HTTP requests issued (including retries)
    pub total_requests: u64,
    /// Requests that returned a usable payload
    pub successes: u64,
    /// Requests that failed (after decoding or at the network layer)
    pub failures: u64,
    /// Requests answered with 429
    pub rate_limited: u64,
    /// Sum of observed request latencies
    pub cumulative_latency: Duration,
}

impl ClientStats {
    /// Mean request latency over all issued requests.
    pub fn average_latency(&self) -> Duration {
        if self.total_requests == 0 {
            return Duration::ZERO;
        }
        self.cumulative_latency / self.total_requests as u32
    }
}

/// The API surface the orchestrator consumes.
///
/// Methods take `&mut self`: the single orchestrator task is the only
/// caller, and the limiter and stats it drives are plain mutable state.
#[async_trait]
pub trait StatsProvider: Send {
    /// Discover every game in the given period via one bulk listing call.
    ///
    /// Transient failures are retried internally; a non-transient failure or
    /// exhausted retries surface as an error. Discovery failure is fatal to
    /// a fresh run, so this is the one call with no per-item fallback.
    async fn discover_items(&mut self, period: &str) -> FetchResult<Vec<DiscoveredItem>>;

    /// Fetch one sub-resource kind for one game.
    ///
    /// Kinds are independent: an error here never implies anything about the
    /// other kinds of the same game.
    async fn fetch_sub_resource(
        &mut self,
        item_id: &str,
        kind: SubResourceKind,
    ) -> FetchResult<SubResourcePayload>;

    /// Snapshot of cumulative request statistics.
    fn stats(&self) -> ClientStats;
}
