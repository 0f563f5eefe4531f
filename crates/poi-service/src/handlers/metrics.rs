//! Prometheus metrics endpoint handler.
//!
//! Unauthenticated so Prometheus can scrape it. Labels are bounded and
//! carry no issuer, kid or token data.

use axum::{extract::State, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for GET /metrics
///
/// Returns Prometheus text format:
/// ```text
/// # TYPE poi_auth_decisions_total counter
/// poi_auth_decisions_total{outcome="authorized"} 42
/// ```
#[tracing::instrument(skip_all, name = "poi.metrics.scrape")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}

// Covered through the router in routes::tests and tests/auth_tests.rs.
