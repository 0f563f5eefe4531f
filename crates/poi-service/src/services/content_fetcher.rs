//! Content fetching for remote key material.
//!
//! The trust store depends only on [`ContentFetcher`], a single-method
//! capability that returns the body found at a URL. [`HttpContentFetcher`]
//! is the production implementation over reqwest.
//!
//! # Security
//!
//! - Every request carries a timeout so an unresponsive issuer cannot hang
//!   a request indefinitely
//! - Response bodies are never logged

use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Default timeout for outbound fetches in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECONDS: u64 = 10;

/// Errors returned by a [`ContentFetcher`].
///
/// All variants are transport-level and safe to retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("request timed out")]
    Timeout,
}

/// Fetch the content found at a URL.
#[async_trait::async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Return the body at `url`, or an error if it could not be retrieved.
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// HTTP implementation of [`ContentFetcher`].
#[derive(Debug, Clone)]
pub struct HttpContentFetcher {
    http_client: reqwest::Client,
}

impl HttpContentFetcher {
    /// Create a fetcher whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "poi.services.fetcher", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self { http_client }
    }
}

impl Default for HttpContentFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECONDS))
    }
}

#[async_trait::async_trait]
impl ContentFetcher for HttpContentFetcher {
    #[instrument(skip(self), name = "poi.services.fetcher.fetch")]
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self.http_client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                tracing::warn!(target: "poi.services.fetcher", url = %url, "Fetch timed out");
                FetchError::Timeout
            } else {
                tracing::warn!(target: "poi.services.fetcher", url = %url, error = %e, "Fetch failed");
                FetchError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            tracing::warn!(
                target: "poi.services.fetcher",
                url = %url,
                status = %status,
                "Fetch returned unexpected status"
            );
            return Err(FetchError::Status(status.as_u16()));
        }

        response.text().await.map_err(|e| {
            if e.is_timeout() {
                tracing::warn!(target: "poi.services.fetcher", url = %url, "Reading body timed out");
                FetchError::Timeout
            } else {
                tracing::warn!(target: "poi.services.fetcher", url = %url, error = %e, "Failed to read body");
                FetchError::Body(e.to_string())
            }
        })
    }
}

/// Mock content fetcher module for testing.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Mock fetcher returning a canned body or failure.
    pub struct MockContentFetcher {
        /// Body or error to return on every call.
        response: Result<String, FetchError>,
        /// Delay before responding.
        delay: Option<Duration>,
        /// Number of calls made.
        call_count: AtomicUsize,
        /// URLs requested, in call order.
        urls: Mutex<Vec<String>>,
    }

    impl MockContentFetcher {
        /// Create a mock that always returns `body`.
        pub fn returning(body: impl Into<String>) -> Self {
            Self::with_response(Ok(body.into()))
        }

        /// Create a mock that always fails with `error`.
        pub fn failing(error: FetchError) -> Self {
            Self::with_response(Err(error))
        }

        fn with_response(response: Result<String, FetchError>) -> Self {
            Self {
                response,
                delay: None,
                call_count: AtomicUsize::new(0),
                urls: Mutex::new(Vec::new()),
            }
        }

        /// Sleep for `delay` before answering each call.
        #[must_use]
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Get the number of calls made.
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        /// Get the URLs requested so far.
        pub fn requested_urls(&self) -> Vec<String> {
            self.urls.lock().map(|urls| urls.clone()).unwrap_or_default()
        }
    }

    #[async_trait::async_trait]
    impl ContentFetcher for MockContentFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut urls) = self.urls.lock() {
                urls.push(url.to_string());
            }

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.response.clone()
        }
    }
}
