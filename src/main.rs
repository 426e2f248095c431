//! tagcache server
//!
//! Hosts the named caches and rate limiter behind a small admin HTTP API.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tagcache::api::create_router;
use tagcache::tasks::spawn_reaper;
use tagcache::{AppState, Config};

/// Main entry point for the tagcache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the named caches and the rate limiter
/// 4. Start one reaper per cache plus one for the rate limiter
/// 5. Create Axum router with all endpoints
/// 6. Serve until SIGINT/SIGTERM, then stop reapers and drop cache contents
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tagcache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting tagcache server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: port={}, rate_limit={}/{}ms",
        config.server_port,
        config.rate_limit.max_requests,
        config.rate_limit.window.as_millis()
    );

    let state = AppState::from_config(&config).context("invalid configuration")?;

    for cache in state.caches.values() {
        cache.start_reaper();
    }
    let limiter_reaper = spawn_reaper(
        state.rate_limiter.clone(),
        config.rate_limit.cleanup_interval,
    );
    info!("Started {} reapers", state.caches.len() + 1);

    let app = create_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    limiter_reaper.stop().await;
    for cache in state.caches.values() {
        cache.destroy();
    }
    state.rate_limiter.clear();

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
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
}
