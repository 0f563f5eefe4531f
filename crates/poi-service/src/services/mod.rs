//! Service layer for POI Service.
//!
//! # Components
//!
//! - `content_fetcher` - Fetch remote content by URL (JWKS retrieval)

pub mod content_fetcher;

pub use content_fetcher::{ContentFetcher, FetchError, HttpContentFetcher};
