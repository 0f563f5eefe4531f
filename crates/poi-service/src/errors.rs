//! POI Service error types.
//!
//! Errors crossing the HTTP boundary carry fixed, generic messages. The
//! cause of a failure is logged server-side by whoever produced it and is
//! never echoed to the client.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Value of the `WWW-Authenticate` header on 401 responses.
pub const WWW_AUTHENTICATE_VALUE: &str = "Bearer realm=\"poi-service\", error=\"invalid_token\"";

/// POI Service error type.
///
/// Maps to HTTP status codes:
/// - InvalidToken: 401 Unauthorized
/// - Internal: 500 Internal Server Error
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PoiError {
    #[error("Invalid token")]
    InvalidToken,

    #[error("Internal server error")]
    Internal,
}

impl PoiError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            PoiError::InvalidToken => StatusCode::UNAUTHORIZED,
            PoiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: &'static str,
}

impl IntoResponse for PoiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (code, message) = match self {
            PoiError::InvalidToken => ("INVALID_TOKEN", "The access token is invalid or expired"),
            PoiError::Internal => ("INTERNAL_ERROR", "An internal error occurred"),
        };

        let mut response = (
            status,
            Json(ErrorResponse {
                error: ErrorDetail { code, message },
            }),
        )
            .into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(WWW_AUTHENTICATE_VALUE),
            );
        }

        response
    }
}
