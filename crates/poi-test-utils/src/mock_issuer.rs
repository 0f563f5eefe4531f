//! Mock identity provider.
//!
//! Serves a JWKS document at `/.well-known/jwks.json` on a wiremock server.
//! The issuer URL is the server URI with a trailing slash, so the trust
//! store derives the same JWKS location a real issuer would expose.

use common::testing::{rsa_public_jwk, FIXTURE_KID};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const JWKS_PATH: &str = "/.well-known/jwks.json";

/// A running mock identity provider.
///
/// Expectations set with `expect_fetches` are verified when the issuer is
/// dropped.
pub struct MockIssuer {
    server: MockServer,
}

impl MockIssuer {
    /// Serve a JWKS holding the fixture public key under [`FIXTURE_KID`].
    pub async fn with_fixture_key() -> Self {
        Self::serving(vec![rsa_public_jwk(FIXTURE_KID)], None).await
    }

    /// Serve a JWKS holding `keys`. When `expected_fetches` is set, the
    /// JWKS endpoint must be hit exactly that many times.
    pub async fn serving(keys: Vec<Value>, expected_fetches: Option<u64>) -> Self {
        let server = MockServer::start().await;
        let mock = Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })));

        match expected_fetches {
            Some(n) => mock.expect(n).mount(&server).await,
            None => mock.mount(&server).await,
        }

        Self { server }
    }

    /// Fixture key JWKS that must be fetched exactly `n` times.
    pub async fn expect_fetches(n: u64) -> Self {
        Self::serving(vec![rsa_public_jwk(FIXTURE_KID)], Some(n)).await
    }

    /// Respond to the JWKS endpoint with `status` and an empty body.
    pub async fn failing(status: u16) -> Self {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;

        Self { server }
    }

    /// The issuer URL (`iss` claim value) of this provider.
    pub fn issuer(&self) -> String {
        format!("{}/", self.server.uri())
    }

    /// Full URL of the JWKS document.
    pub fn jwks_url(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Number of JWKS requests received so far.
    pub async fn fetch_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| {
                requests
                    .iter()
                    .filter(|r| r.url.path() == JWKS_PATH)
                    .count()
            })
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serves_fixture_jwks() {
        let issuer = MockIssuer::with_fixture_key().await;

        let body: Value = reqwest::get(issuer.jwks_url())
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["keys"][0]["kid"], FIXTURE_KID);
        assert!(issuer.issuer().ends_with('/'));
        assert_eq!(issuer.fetch_count().await, 1);
    }

    #[tokio::test]
    async fn test_failing_issuer() {
        let issuer = MockIssuer::failing(503).await;

        let response = reqwest::get(issuer.jwks_url()).await.unwrap();
        assert_eq!(response.status(), 503);
    }
}
