//! Trust store resolving signing keys for `(kid, iss)` pairs.
//!
//! Resolution order for [`JwkStore::get_jwk`]:
//!
//! 1. Cache hit: return immediately, no network access
//! 2. Empty `kid` or `iss`: `InvalidParameter`
//! 3. Issuer other than the trusted one: `NoKeyAvailable`, nothing fetched
//! 4. Fetch `<iss>.well-known/jwks.json` through the injected fetcher,
//!    joining the fetch already in flight for that issuer if there is one
//! 5. Stamp keys lacking `iss` with the fetched issuer, cache every key
//! 6. Re-run the cache lookup; still missing is `NoKeyAvailable`
//!
//! # Security
//!
//! An untrusted issuer and an unknown kid of the trusted issuer produce the
//! same error, so callers cannot probe which issuers are trusted. Only the
//! internal log distinguishes them.

use crate::auth::cache::JwkCache;
use crate::auth::jwk::{Jwk, Jwks};
use crate::observability::metrics;
use crate::services::content_fetcher::{ContentFetcher, FetchError, DEFAULT_FETCH_TIMEOUT_SECONDS};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::instrument;

/// Path of the JWKS document relative to the issuer URL.
pub const JWKS_WELL_KNOWN_PATH: &str = ".well-known/jwks.json";

/// Errors returned by [`JwkStore::get_jwk`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JwkStoreError {
    #[error("invalid parameter: {0} is empty")]
    InvalidParameter(&'static str),

    #[error("no key available for the requested kid and issuer")]
    NoKeyAvailable,

    #[error("no content fetcher configured")]
    DependencyMissing,

    #[error("fetching key set failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("key set could not be decoded: {0}")]
    Decode(String),
}

impl JwkStoreError {
    /// Transport and decode failures may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, JwkStoreError::Fetch(_) | JwkStoreError::Decode(_))
    }
}

/// Resolve the serialized JWK for a `(kid, iss)` pair.
#[async_trait::async_trait]
pub trait JwkStore: Send + Sync {
    async fn get_jwk(&self, kid: &str, iss: &str) -> Result<String, JwkStoreError>;
}

/// A JWKS fetch shared by every request that misses while it runs.
type RefreshFuture = Shared<BoxFuture<'static, Result<(), JwkStoreError>>>;

/// [`JwkStore`] trusting exactly one issuer.
pub struct JwkTrustStore {
    /// Issuer URL, compared by exact string match.
    trusted_issuer: String,

    fetcher: Option<Arc<dyn ContentFetcher>>,

    cache: Arc<JwkCache>,

    /// Hard upper bound on one fetch, independent of the fetcher's own timeout.
    fetch_timeout: Duration,

    /// Fetch in flight per issuer. Concurrent misses await the same fetch
    /// and all take its outcome; nobody re-fetches behind it.
    in_flight: Mutex<HashMap<String, RefreshFuture>>,
}

impl JwkTrustStore {
    pub fn new(
        trusted_issuer: impl Into<String>,
        fetcher: Option<Arc<dyn ContentFetcher>>,
        cache: Arc<JwkCache>,
    ) -> Self {
        Self {
            trusted_issuer: trusted_issuer.into(),
            fetcher,
            cache,
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECONDS),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    async fn cached(&self, kid: &str, iss: &str) -> Option<Result<String, JwkStoreError>> {
        let jwk = self.cache.get(kid, iss).await.ok()?;
        Some(serialize(&jwk))
    }

    /// Join the fetch in flight for `iss`, or start one.
    ///
    /// The cache is re-checked under the lock, so a request that missed
    /// just before a fetch completed does not start another.
    async fn join_refresh(
        &self,
        fetcher: &Arc<dyn ContentFetcher>,
        kid: &str,
        iss: &str,
    ) -> Refresh {
        let mut in_flight = self.in_flight.lock().await;

        if let Some(found) = self.cached(kid, iss).await {
            return Refresh::Cached(found);
        }

        // A finished entry is stale; its waiters are about to retire it
        if let Some(pending) = in_flight.get(iss).filter(|p| p.peek().is_none()) {
            return Refresh::Pending(pending.clone());
        }

        let pending = refresh_issuer(
            Arc::clone(fetcher),
            Arc::clone(&self.cache),
            iss.to_string(),
            self.fetch_timeout,
        )
        .boxed()
        .shared();
        in_flight.insert(iss.to_string(), pending.clone());
        Refresh::Pending(pending)
    }

    /// Drop the finished fetch for `iss` unless a newer one replaced it.
    async fn retire_refresh(&self, iss: &str, finished: &RefreshFuture) {
        let mut in_flight = self.in_flight.lock().await;
        if in_flight
            .get(iss)
            .is_some_and(|pending| pending.ptr_eq(finished))
        {
            in_flight.remove(iss);
        }
    }
}

enum Refresh {
    Cached(Result<String, JwkStoreError>),
    Pending(RefreshFuture),
}

/// Fetch the issuer's JWKS and add every key to the cache.
///
/// Owns its inputs so that any waiter can drive it to completion.
async fn refresh_issuer(
    fetcher: Arc<dyn ContentFetcher>,
    cache: Arc<JwkCache>,
    iss: String,
    fetch_timeout: Duration,
) -> Result<(), JwkStoreError> {
    let url = format!("{iss}{JWKS_WELL_KNOWN_PATH}");
    tracing::debug!(target: "poi.auth.trust_store", url = %url, "Fetching JWKS");

    let start = Instant::now();
    let body = match tokio::time::timeout(fetch_timeout, fetcher.fetch(&url)).await {
        Ok(Ok(body)) => body,
        Ok(Err(e)) => {
            let status = if e == FetchError::Timeout { "timeout" } else { "error" };
            metrics::record_jwks_fetch(status, start.elapsed());
            tracing::error!(target: "poi.auth.trust_store", url = %url, error = %e, "Failed to fetch JWKS");
            return Err(JwkStoreError::Fetch(e));
        }
        Err(_) => {
            metrics::record_jwks_fetch("timeout", start.elapsed());
            tracing::error!(
                target: "poi.auth.trust_store",
                url = %url,
                timeout_secs = fetch_timeout.as_secs_f64(),
                "JWKS fetch exceeded timeout"
            );
            return Err(JwkStoreError::Fetch(FetchError::Timeout));
        }
    };
    metrics::record_jwks_fetch("success", start.elapsed());

    let jwks: Jwks = serde_json::from_str(&body).map_err(|e| {
        tracing::error!(target: "poi.auth.trust_store", url = %url, error = %e, "Failed to parse JWKS response");
        JwkStoreError::Decode(e.to_string())
    })?;

    let count = jwks.keys.len();
    for mut jwk in jwks.keys {
        if jwk.iss.is_empty() {
            jwk.iss.clone_from(&iss);
        }
        cache.add(jwk).await;
    }

    tracing::info!(target: "poi.auth.trust_store", key_count = count, "JWKS cache refreshed");
    Ok(())
}

#[async_trait::async_trait]
impl JwkStore for JwkTrustStore {
    #[instrument(skip(self), name = "poi.auth.trust_store.get_jwk")]
    async fn get_jwk(&self, kid: &str, iss: &str) -> Result<String, JwkStoreError> {
        if let Some(found) = self.cached(kid, iss).await {
            return found;
        }

        if kid.is_empty() {
            return Err(JwkStoreError::InvalidParameter("kid"));
        }
        if iss.is_empty() {
            return Err(JwkStoreError::InvalidParameter("iss"));
        }

        if iss != self.trusted_issuer {
            tracing::warn!(target: "poi.auth.trust_store", iss = %iss, kid = %kid, "Rejected key request for untrusted issuer");
            return Err(JwkStoreError::NoKeyAvailable);
        }

        let Some(fetcher) = self.fetcher.as_ref() else {
            tracing::error!(target: "poi.auth.trust_store", "No content fetcher configured");
            return Err(JwkStoreError::DependencyMissing);
        };

        let pending = match self.join_refresh(fetcher, kid, iss).await {
            Refresh::Cached(found) => return found,
            Refresh::Pending(pending) => pending,
        };

        let outcome = pending.clone().await;
        self.retire_refresh(iss, &pending).await;
        outcome?;

        match self.cached(kid, iss).await {
            Some(found) => found,
            None => {
                tracing::warn!(target: "poi.auth.trust_store", iss = %iss, kid = %kid, "Key not found in JWKS after refresh");
                Err(JwkStoreError::NoKeyAvailable)
            }
        }
    }
}

fn serialize(jwk: &Jwk) -> Result<String, JwkStoreError> {
    serde_json::to_string(jwk).map_err(|e| JwkStoreError::Decode(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::services::content_fetcher::mock::MockContentFetcher;
    use serde_json::json;

    const ISSUER: &str = "https://idp.example/";

    fn jwks_body(kids: &[&str]) -> String {
        let keys: Vec<_> = kids
            .iter()
            .map(|kid| json!({"kty": "RSA", "kid": kid, "n": "bW9kdWx1cw", "e": "AQAB"}))
            .collect();
        json!({ "keys": keys }).to_string()
    }

    fn store_with(fetcher: &Arc<MockContentFetcher>) -> (JwkTrustStore, Arc<JwkCache>) {
        let cache = Arc::new(JwkCache::new());
        let fetcher: Arc<dyn ContentFetcher> = fetcher.clone();
        let store = JwkTrustStore::new(ISSUER, Some(fetcher), Arc::clone(&cache));
        (store, cache)
    }

    #[tokio::test]
    async fn test_miss_fetches_once_then_serves_from_cache() {
        let fetcher = Arc::new(MockContentFetcher::returning(jwks_body(&["k1"])));
        let (store, _cache) = store_with(&fetcher);

        let first = store.get_jwk("k1", ISSUER).await.unwrap();
        let second = store.get_jwk("k1", ISSUER).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fetcher.call_count(), 1);
        assert_eq!(
            fetcher.requested_urls(),
            vec!["https://idp.example/.well-known/jwks.json"]
        );
    }

    #[tokio::test]
    async fn test_returned_key_is_stamped_with_issuer() {
        let fetcher = Arc::new(MockContentFetcher::returning(jwks_body(&["k1"])));
        let (store, _cache) = store_with(&fetcher);

        let raw = store.get_jwk("k1", ISSUER).await.unwrap();

        assert_eq!(
            raw,
            r#"{"kty":"RSA","kid":"k1","iss":"https://idp.example/","n":"bW9kdWx1cw","e":"AQAB"}"#
        );
    }

    #[tokio::test]
    async fn test_every_fetched_key_is_cached() {
        let fetcher = Arc::new(MockContentFetcher::returning(jwks_body(&["k1", "k2", "k3"])));
        let (store, cache) = store_with(&fetcher);

        store.get_jwk("k1", ISSUER).await.unwrap();
        store.get_jwk("k3", ISSUER).await.unwrap();

        assert_eq!(cache.len().await, 3);
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cache_hit_needs_no_fetcher() {
        let cache = Arc::new(JwkCache::new());
        cache
            .add(Jwk {
                kty: "RSA".to_string(),
                kid: "k1".to_string(),
                iss: ISSUER.to_string(),
                ..Jwk::default()
            })
            .await;
        let store = JwkTrustStore::new(ISSUER, None, cache);

        assert!(store.get_jwk("k1", ISSUER).await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_parameters_are_rejected() {
        let fetcher = Arc::new(MockContentFetcher::returning(jwks_body(&["k1"])));
        let (store, _cache) = store_with(&fetcher);

        assert_eq!(
            store.get_jwk("", ISSUER).await,
            Err(JwkStoreError::InvalidParameter("kid"))
        );
        assert_eq!(
            store.get_jwk("k1", "").await,
            Err(JwkStoreError::InvalidParameter("iss"))
        );
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_untrusted_issuer_never_fetches() {
        let fetcher = Arc::new(MockContentFetcher::returning(jwks_body(&["k1"])));
        let (store, _cache) = store_with(&fetcher);

        let result = store.get_jwk("k1", "https://evil.example/").await;

        assert_eq!(result, Err(JwkStoreError::NoKeyAvailable));
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_untrusted_issuer_matches_unknown_kid_error() {
        let fetcher = Arc::new(MockContentFetcher::returning(jwks_body(&["k1"])));
        let (store, _cache) = store_with(&fetcher);

        let untrusted = store.get_jwk("k1", "https://evil.example/").await;
        let unknown_kid = store.get_jwk("nope", ISSUER).await;

        assert_eq!(untrusted, unknown_kid);
        assert_eq!(unknown_kid, Err(JwkStoreError::NoKeyAvailable));
    }

    #[tokio::test]
    async fn test_issuer_match_is_exact() {
        let fetcher = Arc::new(MockContentFetcher::returning(jwks_body(&["k1"])));
        let (store, _cache) = store_with(&fetcher);

        // Missing trailing slash is a different issuer
        let result = store.get_jwk("k1", "https://idp.example").await;

        assert_eq!(result, Err(JwkStoreError::NoKeyAvailable));
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_key_with_explicit_other_issuer_is_not_served() {
        let body = json!({"keys": [
            {"kty": "RSA", "kid": "k1", "iss": "https://other.example/", "n": "bg", "e": "AQAB"}
        ]})
        .to_string();
        let fetcher = Arc::new(MockContentFetcher::returning(body));
        let (store, cache) = store_with(&fetcher);

        let result = store.get_jwk("k1", ISSUER).await;

        assert_eq!(result, Err(JwkStoreError::NoKeyAvailable));
        assert!(cache.get("k1", "https://other.example/").await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_fetcher_is_dependency_missing() {
        let store = JwkTrustStore::new(ISSUER, None, Arc::new(JwkCache::new()));

        let result = store.get_jwk("k1", ISSUER).await;

        assert_eq!(result, Err(JwkStoreError::DependencyMissing));
        assert!(!JwkStoreError::DependencyMissing.is_retryable());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_retryable() {
        let fetcher = Arc::new(MockContentFetcher::failing(FetchError::Status(503)));
        let (store, cache) = store_with(&fetcher);

        let err = store.get_jwk("k1", ISSUER).await.unwrap_err();

        assert_eq!(err, JwkStoreError::Fetch(FetchError::Status(503)));
        assert!(err.is_retryable());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_undecodable_body_is_retryable() {
        let fetcher = Arc::new(MockContentFetcher::returning("<html>not json</html>"));
        let (store, _cache) = store_with(&fetcher);

        let err = store.get_jwk("k1", ISSUER).await.unwrap_err();

        assert!(matches!(err, JwkStoreError::Decode(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_fetch_is_bounded_by_timeout() {
        let fetcher = Arc::new(
            MockContentFetcher::returning(jwks_body(&["k1"])).with_delay(Duration::from_secs(5)),
        );
        let cache = Arc::new(JwkCache::new());
        let dyn_fetcher: Arc<dyn ContentFetcher> = fetcher.clone();
        let store = JwkTrustStore::new(ISSUER, Some(dyn_fetcher), cache)
            .with_fetch_timeout(Duration::from_millis(50));

        let start = Instant::now();
        let result = store.get_jwk("k1", ISSUER).await;

        assert_eq!(result, Err(JwkStoreError::Fetch(FetchError::Timeout)));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_concurrent_misses_fetch_once() {
        let fetcher = Arc::new(
            MockContentFetcher::returning(jwks_body(&["k1"])).with_delay(Duration::from_millis(50)),
        );
        let (store, _cache) = store_with(&fetcher);
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move { store.get_jwk("k1", ISSUER).await }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_misses_for_distinct_kids_share_one_fetch() {
        let fetcher = Arc::new(
            MockContentFetcher::returning(jwks_body(&["k0", "k1", "k2", "k3", "k4"]))
                .with_delay(Duration::from_millis(50)),
        );
        let (store, cache) = store_with(&fetcher);
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for i in 0..5 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.get_jwk(&format!("k{i}"), ISSUER).await
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(fetcher.call_count(), 1);
        assert_eq!(cache.len().await, 5);
    }

    #[tokio::test]
    async fn test_hung_issuer_fails_every_waiter_within_one_timeout() {
        let fetcher = Arc::new(
            MockContentFetcher::returning(jwks_body(&["k0"])).with_delay(Duration::from_secs(30)),
        );
        let cache = Arc::new(JwkCache::new());
        let dyn_fetcher: Arc<dyn ContentFetcher> = fetcher.clone();
        let store = Arc::new(
            JwkTrustStore::new(ISSUER, Some(dyn_fetcher), cache)
                .with_fetch_timeout(Duration::from_millis(200)),
        );

        let start = Instant::now();
        let mut handles = Vec::new();
        for i in 0..5 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let result = store.get_jwk(&format!("k{i}"), ISSUER).await;
                (result, start.elapsed())
            }));
        }

        for handle in handles {
            let (result, elapsed) = handle.await.unwrap();
            assert_eq!(result, Err(JwkStoreError::Fetch(FetchError::Timeout)));
            // Serialized fetches would take 200ms per queued request
            assert!(elapsed < Duration::from_millis(390), "waited {elapsed:?}");
        }
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_reused_by_later_requests() {
        let fetcher = Arc::new(MockContentFetcher::failing(FetchError::Status(503)));
        let (store, _cache) = store_with(&fetcher);

        assert!(store.get_jwk("k1", ISSUER).await.is_err());
        assert!(store.get_jwk("k1", ISSUER).await.is_err());

        assert_eq!(fetcher.call_count(), 2);
        assert!(store.in_flight.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_evicted_key_is_fetched_again() {
        let fetcher = Arc::new(MockContentFetcher::returning(jwks_body(&["k1"])));
        let (store, cache) = store_with(&fetcher);

        store.get_jwk("k1", ISSUER).await.unwrap();
        cache
            .flush_at(Duration::from_secs(1), Instant::now() + Duration::from_secs(5))
            .await;
        store.get_jwk("k1", ISSUER).await.unwrap();

        assert_eq!(fetcher.call_count(), 2);
    }
}
