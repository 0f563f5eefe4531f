//! Token verification endpoint.

use axum::http::StatusCode;
use tracing::instrument;

/// Handler for GET /v1/auth/verify
///
/// Mounted behind the authorizer, so reaching it means the bearer token
/// passed every check. Returns 204 No Content.
#[instrument(name = "poi.auth.verify")]
pub async fn verify_token() -> StatusCode {
    StatusCode::NO_CONTENT
}
