//! Metrics definitions for POI Service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `poi_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `outcome`: one value per authorizer exit (see `AuthRejection::outcome`)
//! - `result`: `hit`, `miss`
//! - `status`: `success`, `error`, `timeout`
//! - `endpoint`: known paths, everything else is `/other`
//!
//! Issuer and kid values are NEVER used as labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used by `/metrics`.
///
/// Must be called once, before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("poi_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // JWKS fetch is bounded by the fetch timeout (10s default)
        .set_buckets_for_metric(
            Matcher::Full("poi_jwks_fetch_duration_seconds".to_string()),
            &[0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000],
        )
        .map_err(|e| format!("Failed to set JWKS fetch buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `poi_http_requests_total`, `poi_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("poi_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("poi_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/metrics" => "/metrics",
        "/v1/auth/verify" => "/v1/auth/verify",
        _ => "/other",
    }
}

// ============================================================================
// Authorization Metrics
// ============================================================================

/// Record one authorizer decision.
///
/// Metric: `poi_auth_decisions_total`
/// Labels: `outcome` (`authorized` or a rejection name)
pub fn record_auth_decision(outcome: &'static str) {
    counter!("poi_auth_decisions_total", "outcome" => outcome).increment(1);
}

// ============================================================================
// Key Cache Metrics
// ============================================================================

/// Record a key cache lookup.
///
/// Metric: `poi_jwk_cache_lookups_total`
/// Labels: `result` (`hit`, `miss`)
pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("poi_jwk_cache_lookups_total", "result" => result).increment(1);
}

/// Record keys evicted by a flush.
///
/// Metric: `poi_jwk_cache_evictions_total`
pub fn record_cache_evictions(count: usize) {
    counter!("poi_jwk_cache_evictions_total").increment(count as u64);
}

/// Set the current number of cached keys.
///
/// Metric: `poi_jwk_cache_entries`
#[allow(clippy::cast_precision_loss)] // Entry counts are far below 2^52
pub fn set_cache_entries(count: usize) {
    gauge!("poi_jwk_cache_entries").set(count as f64);
}

// ============================================================================
// JWKS Fetch Metrics
// ============================================================================

/// Record a JWKS fetch against the trusted issuer.
///
/// Metric: `poi_jwks_fetches_total`, `poi_jwks_fetch_duration_seconds`
/// Labels: `status` (`success`, `error`, `timeout`)
pub fn record_jwks_fetch(status: &'static str, duration: Duration) {
    histogram!("poi_jwks_fetch_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());
    counter!("poi_jwks_fetches_total", "status" => status).increment(1);
}
