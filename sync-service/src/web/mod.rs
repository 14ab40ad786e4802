//! Web server module for the `/sync` endpoint.
//!
//! This module provides a thin web server that:
//! - Answers `GET /sync` health checks
//! - Authenticates `POST /sync` with the configured Shopify scheme
//! - Echoes the verified JSON payload back

pub mod handlers;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use tower_http::trace::TraceLayer;

pub use handlers::{health, sync_webhook, AppState, HealthResponse, PayloadError, SyncResponse};

/// Build the router for the given state.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_body_bytes;

    Router::new()
        .route("/sync", get(health).post(sync_webhook))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
