//! Common utilities and types shared across POI service components.

#![warn(clippy::pedantic)]

/// Module for JWT parsing, verification and signing
pub mod jwt;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for deterministic test fixtures (RSA keys, fixed tokens)
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
