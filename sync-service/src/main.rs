//! Match Prestige sync service - Shopify webhook and App Proxy receiver.
//!
//! This binary serves `/sync`:
//! - `GET` answers a health check
//! - `POST` verifies the Shopify signature and echoes the JSON payload
//!
//! The signing scheme is chosen with `SYNC_AUTH_SCHEME` (`body` or `query`).

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use prestige::{router, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("sync_server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        auth_scheme = %config.auth_scheme,
        secret_configured = config.shopify_api_secret.is_some(),
        max_body_bytes = config.max_body_bytes,
        "config_loaded"
    );

    if config.shopify_api_secret.is_none() {
        warn!("shopify_api_secret_missing_all_requests_denied");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = router(AppState::new(config));

    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "sync_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("sync_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("sync_server_shutting_down");
}
