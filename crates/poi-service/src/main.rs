//! POI Service
//!
//! Entry point for the POI HTTP API. Bearer tokens are authorized against
//! the JWKS published by a single trusted identity provider.
//!
//! # Startup
//!
//! 1. Initialize tracing
//! 2. Load configuration
//! 3. Create the key cache, HTTP content fetcher and trust store
//! 4. Install the Prometheus recorder
//! 5. Spawn the key cache flush task
//! 6. Serve until SIGINT/SIGTERM, then stop the flush task

use poi_service::auth::{JwkCache, JwkStore, JwkTrustStore};
use poi_service::config::Config;
use poi_service::observability::metrics::init_metrics_recorder;
use poi_service::routes::{self, AppState};
use poi_service::services::{ContentFetcher, HttpContentFetcher};
use poi_service::tasks::start_jwk_cache_flush;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "poi_service=debug,common=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting POI Service");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        trusted_issuer = %config.trusted_issuer_url,
        jwk_cache_max_age_seconds = config.jwk_cache_max_age_seconds,
        jwks_fetch_timeout_seconds = config.jwks_fetch_timeout_seconds,
        "Configuration loaded successfully"
    );

    // Key cache is owned by the process and shared with the flush task
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

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics: {}", e);
        e
    })?;

    let bind_address = config.bind_address.clone();
    let drain_seconds = config.drain_seconds;

    // Start the cache flush task
    let shutdown_token = CancellationToken::new();
    let flush_task = tokio::spawn(start_jwk_cache_flush(
        Arc::clone(&cache),
        config.jwk_cache_max_age(),
        config.jwk_cache_flush_interval(),
        shutdown_token.child_token(),
    ));

    let state = Arc::new(AppState { jwk_store });
    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("POI Service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(drain_seconds))
        .await?;

    // Stop background tasks
    shutdown_token.cancel();
    if let Err(e) = flush_task.await {
        warn!(error = %e, "Key cache flush task ended abnormally");
    }

    info!("POI Service shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and the drain period is complete.
async fn shutdown_signal(drain_seconds: u64) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    if drain_seconds > 0 {
        warn!("Draining connections for {} seconds...", drain_seconds);
        tokio::time::sleep(Duration::from_secs(drain_seconds)).await;
        info!("Drain period complete");
    }
}
