//! Configuration module for environment variable parsing.
//!
//! Everything is read once at start-up; handlers only ever see the loaded
//! [`Config`].

use std::env;
use tracing::warn;

use crate::auth::{AuthScheme, Secret};

/// Default request body limit (100 KiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 100 * 1024;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Shopify API secret. `None` means every request is denied.
    pub shopify_api_secret: Option<Secret>,

    /// Which Shopify signing scheme `/sync` accepts
    pub auth_scheme: AuthScheme,

    /// Largest request body accepted, in bytes
    pub max_body_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 3000,
            shopify_api_secret: None,
            auth_scheme: AuthScheme::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Config {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),

            shopify_api_secret: parse_secret("SHOPIFY_API_SECRET"),

            auth_scheme: parse_scheme("SYNC_AUTH_SCHEME", defaults.auth_scheme),

            max_body_bytes: env::var("MAX_BODY_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_body_bytes),
        }
    }
}

/// Read a secret; blank values count as unset.
fn parse_secret(name: &str) -> Option<Secret> {
    env::var(name)
        .ok()
        .filter(|raw| !raw.trim().is_empty())
        .and_then(Secret::new)
}

/// Parse the auth scheme, falling back to `default` on unknown values.
fn parse_scheme(name: &str, default: AuthScheme) -> AuthScheme {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.parse() {
        Ok(scheme) => scheme,
        Err(e) => {
            warn!(env_var = name, error = %e, fallback = %default, "Invalid auth scheme, using default");
            default
        }
    }
}
