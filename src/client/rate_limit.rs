//! Adaptive rate limiting for the statistics API
//!
//! The upstream API publishes no fixed quota, so the limiter adapts: 429 and
//! 5xx responses widen the inter-request delay, fast 200s decay it back
//! toward the configured base.

use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Hard ceiling on the inter-request delay.
/// 60 seconds is slow enough to ride out sustained throttling without
/// stalling a run indefinitely on a single bad window.
pub const MAX_DELAY: Duration = Duration::from_secs(60);

/// Multiplier applied on a 429 response.
const RATE_LIMITED_FACTOR: f64 = 2.0;

/// Multiplier applied on a 5xx response.
const SERVER_ERROR_FACTOR: f64 = 1.5;

/// Fraction of the gap to base delay recovered per healthy response.
const DECAY_STEP: f64 = 0.05;

/// Response-time threshold below which a 200 counts as "healthy".
const FAST_RESPONSE: Duration = Duration::from_secs(1);

/// Adaptive inter-request delay calculator.
///
/// Owned by a single caller: the orchestrator constructs exactly one limiter
/// and hands it to the API client, which serializes every outbound call
/// through [`wait`](RateLimiter::wait).
#[derive(Debug)]
pub struct RateLimiter {
    base_delay: Duration,
    current_delay: Duration,
    last_request: Option<Instant>,
    consecutive_errors: u32,
}

impl RateLimiter {
    /// Create a limiter with the given base (and initial) delay.
    ///
    /// The base delay is clamped to `MAX_DELAY` so the invariant
    /// `base_delay <= current_delay <= MAX_DELAY` holds from construction.
    pub fn new(base_delay: Duration) -> Self {
        let base_delay = base_delay.min(MAX_DELAY);
        Self {
            base_delay,
            current_delay: base_delay,
            last_request: None,
            consecutive_errors: 0,
        }
    }

    /// Block until `current_delay` has elapsed since the previous request,
    /// then stamp the new request time.
    ///
    /// The first call never sleeps.
    pub async fn wait(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.current_delay {
                sleep(self.current_delay - elapsed).await;
            }
        }
        self.last_request = Some(Instant::now());
    }

    /// Feed a response back into the limiter.
    ///
    /// - 429: double the delay
    /// - 5xx: grow the delay by 50%
    /// - fast 200 (< 1s): decay the delay 5% toward the base
    ///
    /// The result is always clamped to `[base_delay, MAX_DELAY]`.
    pub fn adjust_for_response(&mut self, response_time: Duration, status_code: u16) {
        if status_code == 429 {
            self.current_delay = self.current_delay.mul_f64(RATE_LIMITED_FACTOR);
            self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        } else if status_code >= 500 {
            self.current_delay = self.current_delay.mul_f64(SERVER_ERROR_FACTOR);
            self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        } else {
            if status_code == 200 && response_time < FAST_RESPONSE {
                let above_base = self.current_delay.saturating_sub(self.base_delay);
                self.current_delay = self.base_delay + above_base.mul_f64(1.0 - DECAY_STEP);
            }
            self.consecutive_errors = 0;
        }

        self.current_delay = self.current_delay.clamp(self.base_delay, MAX_DELAY);
    }

    /// Base (floor) delay this limiter was configured with.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Current inter-request delay.
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    /// Number of consecutive 429/5xx responses observed.
    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }
}
