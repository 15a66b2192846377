//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define service metrics (breaker rejections, rate limiting, cache efficiency)
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `circuit_open_total` (counter): calls rejected by an open breaker, by `name`
//! - `circuit_breaker_state` (gauge): 0=closed, 1=open, 2=half-open, by `name`
//! - `rate_limited_total` (counter): rejected requests, by `route`
//! - `cache_hits_total` / `cache_misses_total` (counter): by `namespace`
//! - `cache_invalidations_total` (counter): keys deleted, by `namespace`
//! - `counter_store_errors_total` (counter): by `store`, `op`
//! - `http_requests_total` (counter) / `http_request_duration_seconds` (histogram)
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder (unit tests) every call is a no-op
//! - Labels are bounded: breaker names, namespaces and route prefixes only

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

use crate::resilience::CircuitState;

/// Metric names as constants for consistency.
pub mod names {
    pub const CIRCUIT_OPEN_TOTAL: &str = "circuit_open_total";
    pub const CIRCUIT_BREAKER_STATE: &str = "circuit_breaker_state";
    pub const RATE_LIMITED_TOTAL: &str = "rate_limited_total";
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_INVALIDATIONS_TOTAL: &str = "cache_invalidations_total";
    pub const STORE_ERRORS_TOTAL: &str = "counter_store_errors_total";
    pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
}

/// Install the Prometheus recorder and its HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus exporter"),
    }
}

/// A call was rejected because the breaker is open.
pub fn record_breaker_rejected(name: &str) {
    counter!(names::CIRCUIT_OPEN_TOTAL, "name" => name.to_string()).increment(1);
}

pub fn record_breaker_state(name: &str, state: CircuitState) {
    gauge!(names::CIRCUIT_BREAKER_STATE, "name" => name.to_string()).set(state as u8 as f64);
}

pub fn record_rate_limited(route: &str) {
    counter!(names::RATE_LIMITED_TOTAL, "route" => route.to_string()).increment(1);
}

pub fn record_cache_hit(namespace: &str) {
    counter!(names::CACHE_HITS_TOTAL, "namespace" => namespace.to_string()).increment(1);
}

pub fn record_cache_miss(namespace: &str) {
    counter!(names::CACHE_MISSES_TOTAL, "namespace" => namespace.to_string()).increment(1);
}

pub fn record_cache_invalidation(namespace: &str, deleted: u64) {
    counter!(names::CACHE_INVALIDATIONS_TOTAL, "namespace" => namespace.to_string())
        .increment(deleted);
}

pub fn record_store_error(store: &str, op: &'static str) {
    counter!(names::STORE_ERRORS_TOTAL, "store" => store.to_string(), "op" => op).increment(1);
}

/// Record a finished HTTP request.
pub fn record_request(method: &str, route: &str, status: u16, start: Instant) {
    counter!(
        names::HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}
