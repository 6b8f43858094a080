//! HTTP statistics API client
//!
//! Provides the concrete [`StatsProvider`] implementation with:
//! - Generic request/response handling
//! - Adaptive rate limiter integration (wait before, adjust after)
//! - Bounded retry with exponential backoff for transient failures
//! - Cumulative request statistics for the run summary

use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Instant;
use tracing::{debug, warn};

use crate::backfill::config::{calculate_backoff, MAX_FETCH_ATTEMPTS};
use crate::client::parse::{self, RawGameList, RawResultSets};
use crate::client::{ClientStats, FetchError, FetchResult, RateLimiter, StatsProvider};
use crate::{metrics, DiscoveredItem, SubResourceKind, SubResourcePayload};
use async_trait::async_trait;

/// Concrete statistics API client.
///
/// Owns the single [`RateLimiter`] the orchestrator constructed; every
/// outbound request is serialized through it.
pub struct HttpStatsClient {
    http: Client,
    base_url: String,
    limiter: RateLimiter,
    stats: ClientStats,
}

impl HttpStatsClient {
    /// Create a new client against the given base URL.
    pub fn new(base_url: impl Into<String>, limiter: RateLimiter) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            limiter,
            stats: ClientStats::default(),
        }
    }

    /// Endpoint path for a sub-resource kind.
    fn kind_endpoint(kind: SubResourceKind) -> &'static str {
        match kind {
            SubResourceKind::Traditional => "/stats/boxscoretraditional",
            SubResourceKind::Advanced => "/stats/boxscoreadvanced",
            SubResourceKind::PlayByPlay => "/stats/playbyplay",
        }
    }

    /// Execute a GET with rate limiting, bounded retry, and generic
    /// deserialization.
    ///
    /// Retries (up to [`MAX_FETCH_ATTEMPTS`] total attempts) on:
    /// - network errors
    /// - 429 rate limit responses
    /// - 5xx server errors
    ///
    /// Surfaces immediately on:
    /// - other 4xx client errors
    /// - undecodable bodies
    async fn get<T>(&mut self, endpoint: &str, params: &[(&str, &str)]) -> FetchResult<T>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut last_error = FetchError::Network("no attempt made".to_string());

        for attempt in 1..=MAX_FETCH_ATTEMPTS {
            self.limiter.wait().await;

            let started = Instant::now();
            let response = self.http.get(&url).query(params).send().await;
            let latency = started.elapsed();

            self.stats.total_requests += 1;
            self.stats.cumulative_latency += latency;

            let response = match response {
                Ok(resp) => resp,
                Err(e) => {
                    self.stats.failures += 1;
                    metrics::record_request(endpoint, None, latency);
                    warn!(
                        endpoint = endpoint,
                        attempt = attempt,
                        max_attempts = MAX_FETCH_ATTEMPTS,
                        error = %e,
                        "Network error"
                    );
                    last_error = FetchError::Network(e.to_string());
                    if attempt < MAX_FETCH_ATTEMPTS {
                        let backoff = calculate_backoff(attempt);
                        metrics::record_retry(attempt, backoff);
                        tokio::time::sleep(backoff).await;
                    }
                    continue;
                }
            };

            let status = response.status();
            self.limiter.adjust_for_response(latency, status.as_u16());
            metrics::record_request(endpoint, Some(status.as_u16()), latency);

            if status.as_u16() == 429 {
                self.stats.rate_limited += 1;
                self.stats.failures += 1;
                warn!(
                    endpoint = endpoint,
                    attempt = attempt,
                    delay_ms = self.limiter.current_delay().as_millis() as u64,
                    "Rate limited (429), delay widened"
                );
                last_error = FetchError::RateLimited;
                if attempt < MAX_FETCH_ATTEMPTS {
                    let backoff = calculate_backoff(attempt);
                    metrics::record_retry(attempt, backoff);
                    tokio::time::sleep(backoff).await;
                }
                continue;
            }

            if status.is_server_error() {
                self.stats.failures += 1;
                warn!(
                    endpoint = endpoint,
                    status = status.as_u16(),
                    attempt = attempt,
                    "Server error"
                );
                last_error = FetchError::Server(status.as_u16());
                if attempt < MAX_FETCH_ATTEMPTS {
                    let backoff = calculate_backoff(attempt);
                    metrics::record_retry(attempt, backoff);
                    tokio::time::sleep(backoff).await;
                }
                continue;
            }

            if status.is_client_error() {
                self.stats.failures += 1;
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unreadable body".to_string());
                return Err(FetchError::Http {
                    status: status.as_u16(),
                    message,
                });
            }

            return match response.json::<T>().await {
                Ok(data) => {
                    self.stats.successes += 1;
                    debug!(endpoint = endpoint, attempt = attempt, "Request succeeded");
                    Ok(data)
                }
                Err(e) => {
                    self.stats.failures += 1;
                    Err(FetchError::Decode(e.to_string()))
                }
            };
        }

        Err(last_error)
    }
}

#[async_trait]
impl StatsProvider for HttpStatsClient {
    async fn discover_items(&mut self, period: &str) -> FetchResult<Vec<DiscoveredItem>> {
        debug!(period = period, "Discovering games");
        let raw: RawGameList = self.get("/stats/games", &[("period", period)]).await?;
        let items = parse::parse_game_list(raw)?;
        debug!(period = period, count = items.len(), "Discovery complete");
        Ok(items)
    }

    async fn fetch_sub_resource(
        &mut self,
        item_id: &str,
        kind: SubResourceKind,
    ) -> FetchResult<SubResourcePayload> {
        let endpoint = Self::kind_endpoint(kind);
        let raw: RawResultSets = self.get(endpoint, &[("game_id", item_id)]).await?;
        parse::parse_sub_resource(kind, raw)
    }

    fn stats(&self) -> ClientStats {
        self.stats
    }
}
