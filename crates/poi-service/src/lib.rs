//! POI Service Library
//!
//! Bearer-token authorization for the POI HTTP API. Tokens are verified
//! against the JWKS published by a single trusted identity provider.
//!
//! # Modules
//!
//! - `auth` - JWK types, key cache and the trust store
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - The request authorizer
//! - `observability` - Prometheus metrics
//! - `routes` - Router assembly
//! - `services` - Outbound content fetching
//! - `tasks` - Background maintenance tasks

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod routes;
pub mod services;
pub mod tasks;
