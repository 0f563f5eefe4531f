//! Bearer-token authorizer for protected routes.
//!
//! Each request runs a fixed, short-circuiting pipeline:
//!
//! 1. Extract the credential from `Authorization: Bearer <token>`
//! 2. Parse the token (unverified)
//! 3. Read `kid` from the header and `iss` from the claims
//! 4. Resolve the key through the [`JwkStore`]
//! 5. Verify the signature against that key
//! 6. Check `exp` against the current time
//!
//! The wrapped handler runs only if every step passes. Every rejection is
//! a terminal response; clients see one generic 401 body regardless of the
//! step that failed. Internal logs carry kid and issuer, never the token.

use crate::auth::trust_store::{JwkStore, JwkStoreError};
use crate::errors::PoiError;
use crate::observability::metrics;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use common::jwt::{Token, CLAIM_EXP, CLAIM_ISS, HEADER_KID};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// State for the authorizer middleware.
#[derive(Clone)]
pub struct AuthState {
    /// Key resolution. `None` is a configuration fault and fails every request.
    pub jwk_store: Option<Arc<dyn JwkStore>>,
}

impl AuthState {
    pub fn new(jwk_store: Arc<dyn JwkStore>) -> Self {
        Self {
            jwk_store: Some(jwk_store),
        }
    }
}

/// The pipeline step that rejected a request.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    #[error("missing or malformed bearer credential")]
    MissingCredential,

    #[error("token could not be parsed")]
    MalformedToken,

    #[error("token carries no kid or no issuer")]
    MissingKeyReference,

    #[error("no key could be resolved for the token")]
    KeyUnavailable,

    #[error("key store is not configured")]
    ConfigurationFault,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token exp claim is missing or not an integer")]
    MalformedExpiry,

    #[error("token has expired")]
    Expired,
}

impl AuthRejection {
    /// Bounded label for the `poi_auth_decisions_total` metric.
    pub fn outcome(&self) -> &'static str {
        match self {
            AuthRejection::MissingCredential => "missing_credential",
            AuthRejection::MalformedToken => "malformed_token",
            AuthRejection::MissingKeyReference => "missing_key_reference",
            AuthRejection::KeyUnavailable => "key_unavailable",
            AuthRejection::ConfigurationFault => "configuration_fault",
            AuthRejection::InvalidSignature => "invalid_signature",
            AuthRejection::MalformedExpiry => "malformed_expiry",
            AuthRejection::Expired => "expired",
        }
    }
}

/// Server-side faults become 500; every other rejection is a 401.
impl From<AuthRejection> for PoiError {
    fn from(rejection: AuthRejection) -> Self {
        match rejection {
            AuthRejection::ConfigurationFault | AuthRejection::MalformedExpiry => {
                PoiError::Internal
            }
            _ => PoiError::InvalidToken,
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        PoiError::from(self).into_response()
    }
}

/// Extract the bearer credential from the Authorization header.
///
/// The scheme must be exactly `Bearer ` (case-sensitive, single space).
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AuthRejection> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "poi.middleware.auth", "Missing Authorization header");
            AuthRejection::MissingCredential
        })?;

    auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        tracing::debug!(target: "poi.middleware.auth", "Invalid Authorization header format");
        AuthRejection::MissingCredential
    })
}

/// Check the `exp` claim of a verified token against `now` (Unix seconds).
///
/// A token expiring exactly at `now` is still accepted.
pub fn check_expiry(token: &Token, now: i64) -> Result<(), AuthRejection> {
    let exp = token
        .claim_value(CLAIM_EXP)
        .and_then(|exp| exp.parse::<i64>().ok())
        .ok_or_else(|| {
            tracing::error!(target: "poi.middleware.auth", "Verified token has missing or malformed exp claim");
            AuthRejection::MalformedExpiry
        })?;

    if now > exp {
        tracing::debug!(target: "poi.middleware.auth", exp = exp, now = now, "Token expired");
        return Err(AuthRejection::Expired);
    }

    Ok(())
}

/// Run the authorization pipeline against the current time.
pub async fn authorize_request(state: &AuthState, headers: &HeaderMap) -> Result<(), AuthRejection> {
    authorize_request_at(state, headers, chrono::Utc::now().timestamp()).await
}

/// Run the authorization pipeline with an explicit `now` (Unix seconds).
pub async fn authorize_request_at(
    state: &AuthState,
    headers: &HeaderMap,
    now: i64,
) -> Result<(), AuthRejection> {
    let raw = extract_bearer_token(headers)?;

    let token = Token::parse_unverified(raw).map_err(|e| {
        tracing::debug!(target: "poi.middleware.auth", error = %e, "Failed to parse token");
        AuthRejection::MalformedToken
    })?;

    let kid = token.header_value(HEADER_KID).filter(|kid| !kid.is_empty());
    let iss = token.claim_value(CLAIM_ISS).filter(|iss| !iss.is_empty());
    let (Some(kid), Some(iss)) = (kid, iss) else {
        tracing::debug!(target: "poi.middleware.auth", "Token has no kid or no iss");
        return Err(AuthRejection::MissingKeyReference);
    };

    let Some(jwk_store) = state.jwk_store.as_ref() else {
        tracing::error!(target: "poi.middleware.auth", "No key store configured for authorizer");
        return Err(AuthRejection::ConfigurationFault);
    };

    let raw_jwk = jwk_store.get_jwk(&kid, &iss).await.map_err(|e| match e {
        JwkStoreError::DependencyMissing => {
            tracing::error!(target: "poi.middleware.auth", kid = %kid, iss = %iss, "Key store has no content fetcher");
            AuthRejection::ConfigurationFault
        }
        e => {
            tracing::debug!(target: "poi.middleware.auth", kid = %kid, iss = %iss, error = %e, "Key resolution failed");
            AuthRejection::KeyUnavailable
        }
    })?;

    token.is_valid(&raw_jwk).map_err(|e| {
        tracing::debug!(target: "poi.middleware.auth", kid = %kid, iss = %iss, error = %e, "Token verification failed");
        AuthRejection::InvalidSignature
    })?;

    check_expiry(&token, now)
}

/// Authorizer middleware.
///
/// Runs the pipeline and forwards the request unmodified on success.
///
/// # Authorization Header Format
///
/// ```text
/// Authorization: Bearer <token>
/// ```
///
/// # Response
///
/// - 401 Unauthorized with WWW-Authenticate header for any client-side failure
/// - 500 Internal Server Error for a missing key store or malformed `exp`
#[instrument(skip_all, name = "poi.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    req: Request,
    next: Next,
) -> Result<Response, PoiError> {
    match authorize_request(&state, req.headers()).await {
        Ok(()) => {
            metrics::record_auth_decision("authorized");
            Ok(next.run(req).await)
        }
        Err(rejection) => {
            metrics::record_auth_decision(rejection.outcome());
            Err(rejection.into())
        }
    }
}

/// Wrap every route of `router` with [`require_auth`].
pub fn authorized<S>(router: Router<S>, state: Arc<AuthState>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.route_layer(middleware::from_fn_with_state(state, require_auth))
}
