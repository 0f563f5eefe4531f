//! Background tasks for POI Service.
//!
//! # Tasks
//!
//! - `jwk_cache_flush` - Periodically evicts aged keys from the key cache

pub mod jwk_cache_flush;

pub use jwk_cache_flush::start_jwk_cache_flush;
