//! Prometheus metrics.
//!
//! All metrics live in the default registry and are registered lazily on
//! first use. Registration can only fail on name collisions, which is a
//! startup invariant violation.

use std::time::Duration;

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// All HTTP requests handled by the service.
pub static HTTP_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests handled by the service.",
        &["path", "method", "status"]
    )
    .expect("register http_requests_total")
});

/// HTTP handler latencies.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "http_request_duration_seconds",
        "Histogram of latencies for HTTP requests.",
        &["path", "method"]
    )
    .expect("register http_request_duration_seconds")
});

/// Operations performed by cache providers.
pub static PROVIDER_OPERATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cache_provider_operations_total",
        "Count of cache provider operations.",
        &["provider", "operation", "status"]
    )
    .expect("register cache_provider_operations_total")
});

/// Cache provider operation latencies.
pub static PROVIDER_OPERATION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "cache_provider_operation_duration_seconds",
        "Histogram of latencies for cache provider operations.",
        &["provider", "operation"]
    )
    .expect("register cache_provider_operation_duration_seconds")
});

/// Calls to external origin endpoints.
pub static EXTERNAL_REQUESTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "external_requests_total",
        "Count of requests to external origin endpoints.",
        &["cache", "status"]
    )
    .expect("register external_requests_total")
});

/// External origin request latencies.
pub static EXTERNAL_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "external_request_duration_seconds",
        "Histogram of external origin request durations.",
        &["cache"]
    )
    .expect("register external_request_duration_seconds")
});

/// Values found on each cache layer.
pub static CACHE_LAYER_HITS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cache_layer_hits_total",
        "Number of cache hits on each layer.",
        &["level"]
    )
    .expect("register cache_layer_hits_total")
});

/// Misses per cache layer.
pub static CACHE_LAYER_MISSES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cache_layer_misses_total",
        "Number of cache misses on each layer.",
        &["level"]
    )
    .expect("register cache_layer_misses_total")
});

fn status_label(ok: bool) -> &'static str {
    if ok {
        "success"
    } else {
        "error"
    }
}

/// Record one provider operation with its outcome and latency.
pub fn record_provider_op(provider: &str, operation: &str, ok: bool, elapsed: Duration) {
    PROVIDER_OPERATIONS
        .with_label_values(&[provider, operation, status_label(ok)])
        .inc();
    PROVIDER_OPERATION_DURATION
        .with_label_values(&[provider, operation])
        .observe(elapsed.as_secs_f64());
}

/// Record one origin batch call.
pub fn record_external_request(cache: &str, ok: bool, elapsed: Duration) {
    EXTERNAL_REQUESTS
        .with_label_values(&[cache, status_label(ok)])
        .inc();
    EXTERNAL_REQUEST_DURATION
        .with_label_values(&[cache])
        .observe(elapsed.as_secs_f64());
}

/// Record hits/misses observed on one cache layer.
pub fn record_cache_layer(level: usize, hits: usize, misses: usize) {
    let level = level.to_string();
    CACHE_LAYER_HITS
        .with_label_values(&[&level])
        .inc_by(hits as f64);
    CACHE_LAYER_MISSES
        .with_label_values(&[&level])
        .inc_by(misses as f64);
}

/// Record one handled HTTP request.
pub fn record_http_request(path: &str, method: &str, status: u16, elapsed: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[path, method, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION
        .with_label_values(&[path, method])
        .observe(elapsed.as_secs_f64());
}

/// Encode every registered metric in Prometheus text format.
pub fn encode() -> Vec<u8> {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "failed to encode metrics");
    }
    buffer
}
