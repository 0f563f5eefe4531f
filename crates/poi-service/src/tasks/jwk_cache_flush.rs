//! Key cache flush background task.
//!
//! Evicts cached keys older than the configured max age at a fixed
//! interval, so that rotated keys are re-fetched from the issuer.
//!
//! # Graceful Shutdown
//!
//! The task exits when its cancellation token is cancelled. A flush in
//! progress completes first.

use crate::auth::JwkCache;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Run the flush loop until `cancel_token` is cancelled.
///
/// # Arguments
///
/// * `cache` - Cache shared with the trust store
/// * `max_age` - Entries older than this are evicted
/// * `interval` - Time between flushes
/// * `cancel_token` - Token for graceful shutdown
#[instrument(skip_all, name = "poi.task.jwk_cache_flush")]
pub async fn start_jwk_cache_flush(
    cache: Arc<JwkCache>,
    max_age: Duration,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "poi.tasks.jwk_cache_flush",
        max_age_seconds = max_age.as_secs(),
        interval_seconds = interval.as_secs(),
        "Starting key cache flush task"
    );

    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately; nothing is cached yet
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let evicted = cache.flush(max_age).await;
                if evicted > 0 {
                    info!(
                        target: "poi.tasks.jwk_cache_flush",
                        evicted = evicted,
                        "Evicted aged keys from cache"
                    );
                }
            }
            () = cancel_token.cancelled() => {
                info!(
                    target: "poi.tasks.jwk_cache_flush",
                    "Key cache flush task received shutdown signal, exiting"
                );
                break;
            }
        }
    }
}
