//! Unified Cache - diagnostics server for the cache manager
//!
//! Serves a JSON value cache over HTTP with TTL freshness, stale serving,
//! LRU eviction and memory pressure handling.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use unified_cache::api::{create_router, AppState};
use unified_cache::{CacheManager, ManagerSettings};

/// Main entry point for the cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load settings from environment variables
/// 3. Create the cache manager
/// 4. Start background expiry cleanup
/// 5. Create Axum router with all endpoints
/// 6. Start HTTP server on configured port
/// 7. Destroy the manager on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "unified_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Unified Cache Server");

    let settings = ManagerSettings::from_env();
    info!(
        "Settings loaded: max_entries={}, max_bytes={}, port={}, cleanup_interval={}s",
        settings.max_entries,
        settings.memory.max_total_bytes,
        settings.server_port,
        settings.cleanup_interval
    );

    let cache = CacheManager::new(settings.clone());
    cache.start_cleanup_task();
    info!("Cache manager initialized");

    let state = AppState::new(cache.clone(), Default::default());
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cache))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then tears the cache down.
async fn shutdown_signal(cache: CacheManager<serde_json::Value>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    cache.destroy();
    warn!("Cache manager destroyed");
}
