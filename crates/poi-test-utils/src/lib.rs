//! # POI Test Utilities
//!
//! Shared test utilities for POI Service.
//!
//! This crate provides:
//! - Token builders signing with the deterministic fixture key
//! - A mock identity provider serving a JWKS document (wiremock)
//! - Server test harness (`TestPoiServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use poi_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let issuer = MockIssuer::with_fixture_key().await;
//!     let server = TestPoiServer::spawn(&issuer.issuer()).await?;
//!
//!     let token = TestTokenBuilder::new()
//!         .issued_by(&issuer.issuer())
//!         .expires_in(3600)
//!         .sign();
//!
//!     let response = reqwest::Client::new()
//!         .get(format!("{}/v1/auth/verify", server.url()))
//!         .bearer_auth(token)
//!         .send()
//!         .await?;
//!     assert_eq!(response.status(), 204);
//!     Ok(())
//! }
//! ```

pub mod mock_issuer;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use common::testing::FIXTURE_KID;
pub use mock_issuer::MockIssuer;
pub use server_harness::TestPoiServer;
pub use token_builders::TestTokenBuilder;
