//! `/sync` endpoint handlers.
//!
//! The POST handler only:
//! 1. Verifies the request signature against the raw request
//! 2. Parses the JSON payload
//! 3. Echoes the payload back
//!
//! Authentication runs on the untouched body bytes before any parsing.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{OriginalUri, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode, Uri},
    response::IntoResponse,
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::auth::{SignedRequest, Verifier, HMAC_HEADER};
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub verifier: Arc<Verifier>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let verifier = Verifier::new(config.auth_scheme, config.shopify_api_secret.clone());
        Self {
            config: Arc::new(config),
            verifier: Arc::new(verifier),
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub timestamp: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: "Match Prestige sync service is running",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

// =============================================================================
// Sync
// =============================================================================

/// Sync response: `success` with the received payload, or `error` with a message.
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<Value>,
}

impl SyncResponse {
    pub fn success(received: Value) -> Self {
        Self {
            status: "success",
            message: None,
            received: Some(received),
        }
    }

    pub fn error(message: &'static str) -> Self {
        Self {
            status: "error",
            message: Some(message),
            received: None,
        }
    }
}

/// Why a verified body could not be turned into a payload.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("top-level JSON value must be an object or an array")]
    NotContainer,
}

/// Sync endpoint.
///
/// Responds 401 with the scheme's message when verification fails, 400 when
/// the payload is not valid JSON, and otherwise echoes the payload.
pub async fn sync_webhook(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let scheme = state.verifier.scheme();
    let hmac_header = headers.get(HMAC_HEADER).and_then(|v| v.to_str().ok());
    let raw_query = signed_query(&uri);

    info!(
        scheme = %scheme,
        body_length = body.len(),
        has_hmac_header = hmac_header.is_some(),
        has_query = raw_query.is_some(),
        "sync_request_received"
    );

    let request = SignedRequest {
        raw_body: &body,
        hmac_header,
        raw_query,
    };

    if !state.verifier.verify(&request) {
        warn!(scheme = %scheme, "sync_unauthorized");
        return (
            StatusCode::UNAUTHORIZED,
            Json(SyncResponse::error(scheme.rejection_message())),
        );
    }

    let received = match parse_payload(&headers, &body) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "sync_invalid_payload");
            return (
                StatusCode::BAD_REQUEST,
                Json(SyncResponse::error("Invalid JSON body")),
            );
        }
    };

    info!(scheme = %scheme, "sync_accepted");

    (StatusCode::OK, Json(SyncResponse::success(received)))
}

/// The query string as signed: everything after the first `?`, up to a second one.
fn signed_query(uri: &Uri) -> Option<&str> {
    uri.query().map(|q| q.split('?').next().unwrap_or(q))
}

/// Parse the body as a JSON payload.
///
/// Bodies that are empty or not sent as JSON yield `{}`.
fn parse_payload(headers: &HeaderMap, body: &[u8]) -> Result<Value, PayloadError> {
    if body.is_empty() || !is_json(headers) {
        return Ok(json!({}));
    }

    let value: Value = serde_json::from_slice(body)?;
    if !(value.is_object() || value.is_array()) {
        return Err(PayloadError::NotContainer);
    }
    Ok(value)
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|content_type| {
            let mime = content_type
                .split(';')
                .next()
                .unwrap_or("")
                .trim()
                .to_ascii_lowercase();
            mime == "application/json" || mime.ends_with("+json")
        })
        .unwrap_or(false)
}
