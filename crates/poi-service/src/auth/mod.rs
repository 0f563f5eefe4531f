//! Key material resolution for bearer-token authorization.
//!
//! # Components
//!
//! - `jwk` - JWK and JWKS wire types
//! - `cache` - Process-owned cache of resolved keys
//! - `trust_store` - Cache lookup, issuer trust enforcement and JWKS fetch

pub mod cache;
pub mod jwk;
pub mod trust_store;

pub use cache::{CacheError, JwkCache};
pub use jwk::{Jwk, Jwks};
pub use trust_store::{JwkStore, JwkStoreError, JwkTrustStore, JWKS_WELL_KNOWN_PATH};
