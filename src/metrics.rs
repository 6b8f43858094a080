//! Production observability metrics for the backfill engine
//!
//! Thin helpers over the `metrics` crate with a Prometheus exporter. All
//! recording functions are safe to call before [`init_metrics`]; they
//! degrade to no-ops through the default recorder.

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

static METRICS_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Initialize the Prometheus exporter on the given scrape address.
///
/// Idempotent: a second call is a no-op. Must run inside a tokio runtime
/// (the exporter spawns its HTTP listener there).
pub fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INITIALIZED.get().is_some() {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "api_requests_total",
        Unit::Count,
        "HTTP requests issued to the statistics API"
    );
    describe_counter!(
        "api_429_errors_total",
        Unit::Count,
        "Rate-limit (429) responses received"
    );
    describe_counter!(
        "api_retries_total",
        Unit::Count,
        "Retry attempts after transient failures"
    );
    describe_histogram!(
        "api_request_duration_seconds",
        Unit::Seconds,
        "Statistics API request latency"
    );
    describe_histogram!(
        "retry_backoff_duration_seconds",
        Unit::Seconds,
        "Backoff slept before a retry"
    );
    describe_counter!(
        "files_uploaded_total",
        Unit::Count,
        "Output objects successfully uploaded"
    );
    describe_counter!(
        "upload_failures_total",
        Unit::Count,
        "Output object uploads that failed"
    );
    describe_counter!(
        "bytes_uploaded_total",
        Unit::Bytes,
        "Output bytes successfully uploaded"
    );
    describe_counter!(
        "items_completed_total",
        Unit::Count,
        "Work items that reached Completed"
    );
    describe_counter!(
        "item_failures_total",
        Unit::Count,
        "Failed work-item processing passes"
    );
    describe_gauge!(
        "items_pending",
        Unit::Count,
        "Work items still awaiting processing"
    );

    let _ = METRICS_INITIALIZED.set(());
    info!(addr = %addr, "Metrics exporter listening");
    Ok(())
}

/// Whether the exporter has been installed.
pub fn is_initialized() -> bool {
    METRICS_INITIALIZED.get().is_some()
}

/// Record one API request. `status` is `None` for network-level failures.
pub fn record_request(endpoint: &str, status: Option<u16>, latency: Duration) {
    let status_label = status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "network_error".to_string());
    counter!(
        "api_requests_total",
        "endpoint" => endpoint.to_string(),
        "status" => status_label,
    )
    .increment(1);
    histogram!(
        "api_request_duration_seconds",
        "endpoint" => endpoint.to_string(),
    )
    .record(latency.as_secs_f64());

    if status == Some(429) {
        counter!("api_429_errors_total", "endpoint" => endpoint.to_string()).increment(1);
    }
}

/// Record a retry and the backoff preceding it.
pub fn record_retry(attempt: u32, backoff: Duration) {
    counter!("api_retries_total", "attempt" => attempt.to_string()).increment(1);
    histogram!("retry_backoff_duration_seconds").record(backoff.as_secs_f64());
}

/// Record one object upload outcome.
pub fn record_upload(ok: bool, bytes: u64) {
    if ok {
        counter!("files_uploaded_total").increment(1);
        counter!("bytes_uploaded_total").increment(bytes);
    } else {
        counter!("upload_failures_total").increment(1);
    }
}

/// Record one work-item processing pass.
pub fn record_item(completed: bool) {
    if completed {
        counter!("items_completed_total").increment(1);
    } else {
        counter!("item_failures_total").increment(1);
    }
}

/// Update the pending-items gauge.
pub fn set_items_pending(pending: u64) {
    gauge!("items_pending").set(pending as f64);
}
