//! Shopify request authentication.
//!
//! Shopify signs requests with HMAC-SHA256 keyed by the app's API secret.
//! Two schemes exist and a deployment runs exactly one of them:
//! - Webhooks sign the raw request body. The base64 digest arrives in the
//!   `X-Shopify-Hmac-Sha256` header.
//! - App Proxy requests sign a canonical form of the query string. The hex
//!   digest arrives in the `signature` query parameter.
//!
//! Every failure is a denial. Verifiers return `bool` and never panic; the
//! typed [`Rejection`] only feeds the logs.

pub mod body;
pub mod query;

use std::fmt;
use std::str::FromStr;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

pub use body::{sign_body, BodyHmacVerifier, HMAC_HEADER};
pub use query::{
    canonicalize, parse_query, sign_query, ParamValue, QueryHmacVerifier, QueryParams,
    MAX_QUERY_PAIRS, SIGNATURE_PARAM,
};

type HmacSha256 = Hmac<Sha256>;

/// Shared secret used to key the HMAC.
///
/// `Debug` output is redacted so the secret cannot leak through logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(Vec<u8>);

impl Secret {
    /// Wrap a secret. An empty secret is the same as no secret.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Option<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            None
        } else {
            Some(Self(bytes))
        }
    }

    fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Why a request was denied.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    #[error("shared secret is not configured")]
    MissingSecret,
    #[error("request carries no signature")]
    MissingSignature,
    #[error("signature parameter is repeated")]
    AmbiguousSignature,
    #[error("secret cannot key HMAC-SHA256")]
    InvalidKey,
    #[error("signature does not match")]
    Mismatch,
}

impl Rejection {
    /// Short snake_case code for log fields.
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::MissingSecret => "missing_secret",
            Rejection::MissingSignature => "missing_signature",
            Rejection::AmbiguousSignature => "ambiguous_signature",
            Rejection::InvalidKey => "invalid_key",
            Rejection::Mismatch => "mismatch",
        }
    }
}

/// HMAC-SHA256 of `message` keyed by `secret`.
fn hmac_sha256(secret: &Secret, message: &[u8]) -> Result<Vec<u8>, Rejection> {
    let mut mac =
        HmacSha256::new_from_slice(secret.expose()).map_err(|_| Rejection::InvalidKey)?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Constant-time equality over the encoded digests.
///
/// Inputs of different length compare unequal. Digest lengths are fixed per
/// scheme, so the length check reveals nothing about the secret.
fn constant_time_eq(expected: &[u8], presented: &[u8]) -> bool {
    expected.ct_eq(presented).into()
}

// =============================================================================
// Scheme selection
// =============================================================================

/// Which signing scheme this deployment accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthScheme {
    /// Webhook: HMAC over the raw body, base64 in a header.
    #[default]
    Body,
    /// App Proxy: HMAC over canonical query parameters, hex in `signature`.
    Query,
}

impl AuthScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthScheme::Body => "body",
            AuthScheme::Query => "query",
        }
    }

    /// Message returned to the caller with a 401.
    pub fn rejection_message(&self) -> &'static str {
        match self {
            AuthScheme::Body => "Invalid HMAC signature",
            AuthScheme::Query => "Invalid App Proxy signature",
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown value for the auth scheme setting.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown auth scheme `{0}` (expected `body` or `query`)")]
pub struct SchemeParseError(pub String);

impl FromStr for AuthScheme {
    type Err = SchemeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "body" | "webhook" => Ok(AuthScheme::Body),
            "query" | "app_proxy" | "proxy" => Ok(AuthScheme::Query),
            other => Err(SchemeParseError(other.to_string())),
        }
    }
}

/// The parts of an inbound request a verifier may look at.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignedRequest<'a> {
    /// Body bytes exactly as received.
    pub raw_body: &'a [u8],
    /// Value of the `X-Shopify-Hmac-Sha256` header.
    pub hmac_header: Option<&'a str>,
    /// Query string exactly as received, without the leading `?`.
    pub raw_query: Option<&'a str>,
}

/// The verifier for the configured scheme.
#[derive(Debug, Clone)]
pub enum Verifier {
    Body(BodyHmacVerifier),
    Query(QueryHmacVerifier),
}

impl Verifier {
    pub fn new(scheme: AuthScheme, secret: Option<Secret>) -> Self {
        match scheme {
            AuthScheme::Body => Verifier::Body(BodyHmacVerifier::new(secret)),
            AuthScheme::Query => Verifier::Query(QueryHmacVerifier::new(secret)),
        }
    }

    pub fn scheme(&self) -> AuthScheme {
        match self {
            Verifier::Body(_) => AuthScheme::Body,
            Verifier::Query(_) => AuthScheme::Query,
        }
    }

    /// Verify a request under the configured scheme.
    pub fn verify(&self, request: &SignedRequest<'_>) -> bool {
        match self {
            Verifier::Body(verifier) => verifier.verify(request.raw_body, request.hmac_header),
            Verifier::Query(verifier) => verifier.verify(request.raw_query.unwrap_or("")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_rejects_empty() {
        assert!(Secret::new("").is_none());
        assert!(Secret::new(Vec::new()).is_none());
        assert!(Secret::new("shhh").is_some());
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::new("super-secret-value").unwrap();
        let printed = format!("{:?}", secret);
        assert!(!printed.contains("super-secret-value"));
        assert_eq!(printed, "Secret(<redacted>)");
    }

    #[test]
    fn test_hmac_sha256_known_answer() {
        // RFC 4231 test case 2
        let secret = Secret::new("Jefe").unwrap();
        let digest = hmac_sha256(&secret, b"what do ya want for nothing?").unwrap();
        assert_eq!(
            hex::encode(digest),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(!constant_time_eq(b"abc", b""));
    }

    #[test]
    fn test_auth_scheme_from_str() {
        assert_eq!("body".parse::<AuthScheme>(), Ok(AuthScheme::Body));
        assert_eq!(" Webhook ".parse::<AuthScheme>(), Ok(AuthScheme::Body));
        assert_eq!("QUERY".parse::<AuthScheme>(), Ok(AuthScheme::Query));
        assert_eq!("app_proxy".parse::<AuthScheme>(), Ok(AuthScheme::Query));
        assert_eq!(
            "header".parse::<AuthScheme>(),
            Err(SchemeParseError("header".to_string()))
        );
    }

    #[test]
    fn test_rejection_messages_differ_per_scheme() {
        assert_eq!(AuthScheme::Body.rejection_message(), "Invalid HMAC signature");
        assert_eq!(
            AuthScheme::Query.rejection_message(),
            "Invalid App Proxy signature"
        );
    }

    #[test]
    fn test_verifier_dispatches_on_scheme() {
        let secret = Secret::new("topsecret").unwrap();
        let body = br#"{"x":1}"#;
        let signature = sign_body(&secret, body).unwrap();

        let verifier = Verifier::new(AuthScheme::Body, Some(secret.clone()));
        assert_eq!(verifier.scheme(), AuthScheme::Body);
        assert!(verifier.verify(&SignedRequest {
            raw_body: body,
            hmac_header: Some(&signature),
            raw_query: None,
        }));

        // The same request means nothing to the query scheme.
        let verifier = Verifier::new(AuthScheme::Query, Some(secret));
        assert_eq!(verifier.scheme(), AuthScheme::Query);
        assert!(!verifier.verify(&SignedRequest {
            raw_body: body,
            hmac_header: Some(&signature),
            raw_query: None,
        }));
    }

    #[test]
    fn test_verifier_is_shareable_across_threads() {
        use std::sync::Arc;

        let secret = Secret::new("shhh").unwrap();
        let verifier = Arc::new(Verifier::new(AuthScheme::Query, Some(secret)));
        let query = "a=1&b=2&signature=835430910a6a1d5ad9d55d06348e915895bd064d7506c1f6ce87940a2915517a";

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let verifier = Arc::clone(&verifier);
                std::thread::spawn(move || {
                    verifier.verify(&SignedRequest {
                        raw_query: Some(query),
                        ..Default::default()
                    })
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }
}
