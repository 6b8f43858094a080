//! Integration tests for adaptive rate limiting behavior.

use boxscore_backfill::client::rate_limit::MAX_DELAY;
use boxscore_backfill::client::RateLimiter;
use std::time::Duration;

const BASE: Duration = Duration::from_millis(500);

#[test]
fn test_delay_stays_bounded_under_throttling_storm() {
    let mut limiter = RateLimiter::new(BASE);

    // A long storm of 429s pins the delay at the ceiling, never beyond.
    for _ in 0..100 {
        limiter.adjust_for_response(Duration::from_millis(50), 429);
    }
    assert_eq!(limiter.current_delay(), MAX_DELAY);

    // Healthy responses recover toward base but never undershoot it.
    for _ in 0..10_000 {
        limiter.adjust_for_response(Duration::from_millis(50), 200);
    }
    assert_eq!(limiter.current_delay(), BASE);
}

#[test]
fn test_recovery_is_gradual_not_instant() {
    let mut limiter = RateLimiter::new(BASE);
    limiter.adjust_for_response(Duration::from_millis(50), 429);
    limiter.adjust_for_response(Duration::from_millis(50), 429);
    let widened = limiter.current_delay();

    limiter.adjust_for_response(Duration::from_millis(50), 200);
    let after_one = limiter.current_delay();
    assert!(after_one < widened);
    // 5% of the gap per healthy response: one response cannot restore base.
    assert!(after_one > BASE);
}

#[test]
fn test_error_streak_tracking_resets_on_success() {
    let mut limiter = RateLimiter::new(BASE);
    limiter.adjust_for_response(Duration::from_millis(50), 500);
    limiter.adjust_for_response(Duration::from_millis(50), 429);
    assert_eq!(limiter.consecutive_errors(), 2);

    limiter.adjust_for_response(Duration::from_millis(50), 200);
    assert_eq!(limiter.consecutive_errors(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_wait_spacing_follows_current_delay() {
    let mut limiter = RateLimiter::new(Duration::from_millis(200));

    limiter.wait().await;
    let first = tokio::time::Instant::now();

    limiter.wait().await;
    assert!(first.elapsed() >= Duration::from_millis(200));

    // A 429 doubles the spacing for the next request.
    limiter.adjust_for_response(Duration::from_millis(10), 429);
    let second = tokio::time::Instant::now();
    limiter.wait().await;
    assert!(second.elapsed() >= Duration::from_millis(400));
}
