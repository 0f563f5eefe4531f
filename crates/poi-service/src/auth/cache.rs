//! Process-owned cache of resolved signing keys.
//!
//! Keys are scoped by `(kid, iss)` and stamped with their insertion time.
//! Eviction is age-based and driven out of band by the flush task
//! (`tasks::jwk_cache_flush`); no request path waits on it.

use crate::auth::jwk::Jwk;
use crate::observability::metrics;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::instrument;

/// Errors returned by [`JwkCache`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("no cached key for the requested kid and issuer")]
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    kid: String,
    iss: String,
}

#[derive(Debug)]
struct CacheEntry {
    jwk: Jwk,
    inserted_at: Instant,
}

/// Lock-guarded map of `(kid, iss)` to key.
///
/// At most one entry exists per `(kid, iss)`; the last `add` wins. Created
/// once at startup and shared through an `Arc`.
#[derive(Debug, Default)]
pub struct JwkCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl JwkCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a key, stamped with the current time.
    ///
    /// Keys with an empty `kid` are ignored.
    pub async fn add(&self, jwk: Jwk) {
        if jwk.kid.is_empty() {
            tracing::debug!(target: "poi.auth.cache", iss = %jwk.iss, "Skipping key without kid");
            return;
        }

        let key = CacheKey {
            kid: jwk.kid.clone(),
            iss: jwk.iss.clone(),
        };

        let mut entries = self.entries.write().await;
        tracing::debug!(target: "poi.auth.cache", kid = %key.kid, iss = %key.iss, "Caching key");
        entries.insert(
            key,
            CacheEntry {
                jwk,
                inserted_at: Instant::now(),
            },
        );
        metrics::set_cache_entries(entries.len());
    }

    /// Look up the key for exactly this `(kid, iss)` pair.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::NotFound` if no entry exists.
    #[instrument(skip(self), level = "debug")]
    pub async fn get(&self, kid: &str, iss: &str) -> Result<Jwk, CacheError> {
        let key = CacheKey {
            kid: kid.to_string(),
            iss: iss.to_string(),
        };

        let entries = self.entries.read().await;
        match entries.get(&key) {
            Some(entry) => {
                metrics::record_cache_lookup(true);
                Ok(entry.jwk.clone())
            }
            None => {
                metrics::record_cache_lookup(false);
                Err(CacheError::NotFound)
            }
        }
    }

    /// Evict every entry older than `max_age`. Returns the number evicted.
    pub async fn flush(&self, max_age: Duration) -> usize {
        self.flush_at(max_age, Instant::now()).await
    }

    /// Evict every entry older than `max_age` as of `now`.
    ///
    /// Deterministic variant of [`JwkCache::flush`] for tests.
    pub async fn flush_at(&self, max_age: Duration, now: Instant) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();

        entries.retain(|_, entry| now.saturating_duration_since(entry.inserted_at) <= max_age);

        let evicted = before - entries.len();
        if evicted > 0 {
            tracing::debug!(
                target: "poi.auth.cache",
                evicted = evicted,
                remaining = entries.len(),
                "Flushed expired keys"
            );
        }

        metrics::record_cache_evictions(evicted);
        metrics::set_cache_entries(entries.len());
        evicted
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
