//! Test server harness for E2E testing
//!
//! Provides `TestPoiServer` for spawning real POI Service instances in tests.

use metrics_exporter_prometheus::PrometheusBuilder;
use poi_service::auth::{JwkCache, JwkStore, JwkTrustStore};
use poi_service::config::Config;
use poi_service::routes::{self, AppState};
use poi_service::services::{ContentFetcher, HttpContentFetcher};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning POI Service in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health() -> Result<()> {
///     let server = TestPoiServer::spawn("https://idp.example/").await?;
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestPoiServer {
    addr: SocketAddr,
    config: Config,
    cache: Arc<JwkCache>,
    _handle: JoinHandle<()>,
}

impl TestPoiServer {
    /// Spawn a server trusting `trusted_issuer`.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Fetch JWKS over HTTP with a 2 second timeout
    /// - Start the HTTP server in the background
    pub async fn spawn(trusted_issuer: &str) -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("TRUSTED_ISSUER_URL".to_string(), trusted_issuer.to_string()),
            ("JWKS_FETCH_TIMEOUT_SECONDS".to_string(), "2".to_string()),
        ]))
        .await
    }

    /// Spawn a server from explicit environment-style variables.
    pub async fn spawn_with_vars(vars: HashMap<String, String>) -> Result<Self, anyhow::Error> {
        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let cache = Arc::new(JwkCache::new());
        let fetcher: Arc<dyn ContentFetcher> =
            Arc::new(HttpContentFetcher::new(config.jwks_fetch_timeout()));
        let jwk_store: Arc<dyn JwkStore> = Arc::new(
            JwkTrustStore::new(
                config.trusted_issuer_url.clone(),
                Some(fetcher),
                Arc::clone(&cache),
            )
            .with_fetch_timeout(config.jwks_fetch_timeout()),
        );

        // Each server gets its own recorder; none is installed globally
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();

        let state = Arc::new(AppState { jwk_store });
        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind(&config.bind_address)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            cache,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The key cache behind the server's trust store.
    pub fn cache(&self) -> &Arc<JwkCache> {
        &self.cache
    }
}

impl Drop for TestPoiServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
