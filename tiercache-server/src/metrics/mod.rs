//! Prometheus Metrics for Tiercache
//!
//! Observability only; engine behaviour is never read back from here.
//! - Cache lookups, producer latency and failures per tier
//! - Keys removed by invalidation, flushes and expiry
//! - HTTP admin/proxy requests

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGaugeVec, TextEncoder, register_histogram_vec,
    register_int_counter_vec, register_int_gauge_vec,
};

lazy_static! {
    // ============================================================================
    // Cache Metrics
    // ============================================================================

    /// Lookups by tier and result (hit, miss)
    pub static ref CACHE_LOOKUPS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tiercache_lookups_total",
        "Total number of cache lookups by tier and result",
        &["tier", "result"]
    ).unwrap();

    /// Producer failures
    pub static ref PRODUCER_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tiercache_producer_errors_total",
        "Total number of failed producer invocations",
        &["tier"]
    ).unwrap();

    /// Producer latency in seconds
    pub static ref PRODUCER_DURATION: HistogramVec = register_histogram_vec!(
        "tiercache_producer_duration_seconds",
        "Producer latency in seconds",
        &["tier"],
        vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 30.0]
    ).unwrap();

    /// Keys removed by invalidate/clear
    pub static ref REMOVED_KEYS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tiercache_removed_keys_total",
        "Total keys removed by kind (invalidate, clear)",
        &["tier", "kind"]
    ).unwrap();

    /// Live keys per tier, refreshed by the stats reporter and /metrics
    pub static ref CACHE_KEYS: IntGaugeVec = register_int_gauge_vec!(
        "tiercache_keys",
        "Number of live keys per tier",
        &["tier"]
    ).unwrap();

    // ============================================================================
    // HTTP Server Metrics
    // ============================================================================

    /// HTTP requests total
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tiercache_http_requests_total",
        "Total HTTP requests",
        &["route", "status"]
    ).unwrap();
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Initialize metrics so they show up before first use
pub fn init_metrics() {
    let _ = &*CACHE_LOOKUPS_TOTAL;
    let _ = &*PRODUCER_ERRORS_TOTAL;
    let _ = &*PRODUCER_DURATION;
    let _ = &*REMOVED_KEYS_TOTAL;
    let _ = &*CACHE_KEYS;
    let _ = &*HTTP_REQUESTS_TOTAL;

    tracing::info!("Prometheus metrics initialized");
}

/// Record a cache lookup
pub fn record_lookup(tier: &str, result: &str) {
    CACHE_LOOKUPS_TOTAL.with_label_values(&[tier, result]).inc();
}

/// Record a producer run
pub fn record_producer(tier: &str, duration_secs: f64) {
    PRODUCER_DURATION
        .with_label_values(&[tier])
        .observe(duration_secs);
}

/// Record a failed producer run
pub fn record_producer_error(tier: &str) {
    PRODUCER_ERRORS_TOTAL.with_label_values(&[tier]).inc();
}

/// Record keys removed by an invalidate or clear
pub fn record_removed(tier: &str, kind: &str, count: usize) {
    REMOVED_KEYS_TOTAL
        .with_label_values(&[tier, kind])
        .inc_by(count as u64);
}

/// Update the live key gauge of a tier
pub fn set_keys(tier: &str, keys: usize) {
    CACHE_KEYS.with_label_values(&[tier]).set(keys as i64);
}

/// Record HTTP request
pub fn record_http_request(route: &str, status: u16) {
    let status = status.to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[route, status.as_str()])
        .inc();
}
