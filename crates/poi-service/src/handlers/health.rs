//! Liveness probe.

use tracing::instrument;

/// Handler for GET /health
///
/// Returns "OK" whenever the process is serving requests. Does not touch
/// the identity provider.
#[instrument(name = "poi.health.check")]
pub async fn health_check() -> &'static str {
    "OK"
}
