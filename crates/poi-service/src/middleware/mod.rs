//! Middleware for POI Service.
//!
//! # Components
//!
//! - `auth` - Bearer-token authorizer for protected routes
//! - `http_metrics` - Request/response metrics for every route

pub mod auth;
pub mod http_metrics;

pub use auth::{authorized, require_auth, AuthRejection, AuthState};
pub use http_metrics::http_metrics_middleware;
