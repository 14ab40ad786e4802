//! Webhook verification: HMAC over the exact request body.
//!
//! Reference: https://shopify.dev/docs/apps/build/webhooks/subscribe/https#step-2-validate-the-origin-of-your-webhook-to-ensure-its-coming-from-shopify

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::warn;

use super::{constant_time_eq, hmac_sha256, Rejection, Secret};

/// Header carrying the base64 body digest (header names are case-insensitive).
pub const HMAC_HEADER: &str = "x-shopify-hmac-sha256";

/// Compute the base64 webhook signature for a body.
pub fn sign_body(secret: &Secret, raw_body: &[u8]) -> Result<String, Rejection> {
    Ok(STANDARD.encode(hmac_sha256(secret, raw_body)?))
}

/// Verifies webhook requests against the configured secret.
#[derive(Debug, Clone)]
pub struct BodyHmacVerifier {
    secret: Option<Secret>,
}

impl BodyHmacVerifier {
    pub fn new(secret: Option<Secret>) -> Self {
        Self { secret }
    }

    /// Verify a webhook body against the presented header value.
    ///
    /// The body must be the bytes as received; any re-serialisation changes
    /// the digest.
    pub fn verify(&self, raw_body: &[u8], presented: Option<&str>) -> bool {
        match self.check(raw_body, presented) {
            Ok(()) => true,
            Err(rejection) => {
                warn!(
                    scheme = "body",
                    reason = rejection.code(),
                    body_length = raw_body.len(),
                    signature_length = presented.map_or(0, str::len),
                    "signature_rejected"
                );
                false
            }
        }
    }

    /// Like [`verify`](Self::verify), but reports why a request was denied.
    pub fn check(&self, raw_body: &[u8], presented: Option<&str>) -> Result<(), Rejection> {
        let secret = self.secret.as_ref().ok_or(Rejection::MissingSecret)?;
        let presented = presented
            .filter(|s| !s.is_empty())
            .ok_or(Rejection::MissingSignature)?;

        let expected = sign_body(secret, raw_body)?;

        // Compared as encoded text, so a malformed header is just a mismatch.
        if constant_time_eq(expected.as_bytes(), presented.as_bytes()) {
            Ok(())
        } else {
            Err(Rejection::Mismatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"x":1}"#;
    const BODY_SIGNATURE: &str = "zdnSlzShlWObbu8xfHGEy119zrxAxC6gfWdbUKwqgYw=";

    fn verifier() -> BodyHmacVerifier {
        BodyHmacVerifier::new(Secret::new("topsecret"))
    }

    #[test]
    fn test_sign_body_known_answer() {
        let secret = Secret::new("topsecret").unwrap();
        assert_eq!(sign_body(&secret, BODY).unwrap(), BODY_SIGNATURE);
    }

    #[test]
    fn test_verify_valid_signature() {
        assert!(verifier().verify(BODY, Some(BODY_SIGNATURE)));
    }

    #[test]
    fn test_verify_is_byte_exact() {
        assert!(!verifier().verify(br#"{"x": 1}"#, Some(BODY_SIGNATURE)));
        assert!(!verifier().verify(b"{\"x\":1}\n", Some(BODY_SIGNATURE)));
        assert_eq!(
            verifier().check(br#"{ "x":1 }"#, Some(BODY_SIGNATURE)),
            Err(Rejection::Mismatch)
        );
    }

    #[test]
    fn test_verify_missing_secret() {
        let verifier = BodyHmacVerifier::new(None);
        assert!(!verifier.verify(BODY, Some(BODY_SIGNATURE)));
        assert_eq!(
            verifier.check(BODY, Some(BODY_SIGNATURE)),
            Err(Rejection::MissingSecret)
        );
        assert!(!BodyHmacVerifier::new(Secret::new("")).verify(BODY, Some(BODY_SIGNATURE)));
    }

    #[test]
    fn test_verify_missing_signature() {
        assert_eq!(verifier().check(BODY, None), Err(Rejection::MissingSignature));
        assert_eq!(
            verifier().check(BODY, Some("")),
            Err(Rejection::MissingSignature)
        );
    }

    #[test]
    fn test_verify_wrong_secret() {
        let verifier = BodyHmacVerifier::new(Secret::new("other"));
        assert!(!verifier.verify(BODY, Some(BODY_SIGNATURE)));
    }

    #[test]
    fn test_verify_malformed_signature() {
        assert!(!verifier().verify(BODY, Some("not base64 at all!")));
        assert!(!verifier().verify(BODY, Some("zdnSlzShlWObbu8xfHGEy119zrxAxC6gfWdbUKwqgYw")));
        assert!(!verifier().verify(BODY, Some(&format!("{BODY_SIGNATURE}="))));
        // Hex of the right digest is still the wrong encoding.
        let hex_digest = hex::encode(STANDARD.decode(BODY_SIGNATURE).unwrap());
        assert!(!verifier().verify(BODY, Some(&hex_digest)));
    }

    #[test]
    fn test_verify_rejects_every_single_bit_flip() {
        let digest = STANDARD.decode(BODY_SIGNATURE).unwrap();
        for byte in 0..digest.len() {
            for bit in 0..8 {
                let mut mutated = digest.clone();
                mutated[byte] ^= 1 << bit;
                let signature = STANDARD.encode(&mutated);
                assert!(
                    !verifier().verify(BODY, Some(&signature)),
                    "bit {bit} of byte {byte} flipped"
                );
            }
        }
    }

    #[test]
    fn test_verify_empty_body() {
        let secret = Secret::new("topsecret").unwrap();
        let signature = sign_body(&secret, b"").unwrap();
        assert!(verifier().verify(b"", Some(&signature)));
    }

    #[test]
    fn test_verify_binary_body() {
        let secret = Secret::new("topsecret").unwrap();
        let body = [0xff, 0x00, 0xfe, 0x80];
        let signature = sign_body(&secret, &body).unwrap();
        assert!(verifier().verify(&body, Some(&signature)));
    }
}
