//! Match Prestige sync service.
//!
//! Receives Shopify callbacks on `/sync` and authenticates them before
//! touching the payload. One of two Shopify signing schemes is active per
//! deployment:
//! - `body`: webhook HMAC over the raw request body
//! - `query`: App Proxy HMAC over the canonical query string
//!
//! ## Architecture
//!
//! ```text
//! Shopify → /sync → Verifier (raw body / raw query) → JSON payload → echo
//! ```

pub mod auth;
pub mod config;
pub mod web;

// Re-export commonly used types
pub use auth::{AuthScheme, BodyHmacVerifier, QueryHmacVerifier, Secret, SignedRequest, Verifier};
pub use config::Config;
pub use web::{router, AppState};
