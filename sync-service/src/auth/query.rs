//! App Proxy verification: HMAC over canonical query parameters.
//!
//! The canonical message is built from every parameter except `signature`:
//! each becomes `key=value` (repeated keys join their values with `,`), the
//! components are sorted as whole strings and concatenated without a
//! separator.
//!
//! Reference: https://shopify.dev/docs/apps/build/online-store/app-proxies/authenticate-app-proxies

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use tracing::warn;
use url::form_urlencoded;

use super::{constant_time_eq, hmac_sha256, Rejection, Secret};

/// Query parameter carrying the hex digest.
pub const SIGNATURE_PARAM: &str = "signature";

/// Pairs parsed from one query string; the rest are ignored.
pub const MAX_QUERY_PAIRS: usize = 1000;

/// A query parameter value. Repeated keys become `Multi`, in parse order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Single(String),
    Multi(Vec<String>),
}

impl ParamValue {
    fn push(&mut self, value: String) {
        match self {
            ParamValue::Single(first) => {
                let first = std::mem::take(first);
                *self = ParamValue::Multi(vec![first, value]);
            }
            ParamValue::Multi(values) => values.push(value),
        }
    }

    /// The value, if the key appeared exactly once.
    pub fn as_single(&self) -> Option<&str> {
        match self {
            ParamValue::Single(value) => Some(value),
            ParamValue::Multi(_) => None,
        }
    }

    fn render(&self) -> String {
        match self {
            ParamValue::Single(value) => value.clone(),
            ParamValue::Multi(values) => values.join(","),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Single(value.to_string())
    }
}

impl From<Vec<&str>> for ParamValue {
    fn from(values: Vec<&str>) -> Self {
        ParamValue::Multi(values.into_iter().map(String::from).collect())
    }
}

pub type QueryParams = BTreeMap<String, ParamValue>;

/// Parse a raw query string (no leading `?`) into decoded parameters.
///
/// Uses `application/x-www-form-urlencoded` rules: `+` is a space, `%XX` is
/// decoded, a key without `=` has an empty value and empty pairs are skipped.
pub fn parse_query(raw_query: &str) -> QueryParams {
    let mut params = QueryParams::new();
    for (key, value) in form_urlencoded::parse(raw_query.as_bytes()).take(MAX_QUERY_PAIRS) {
        match params.entry(key.into_owned()) {
            Entry::Vacant(slot) => {
                slot.insert(ParamValue::Single(value.into_owned()));
            }
            Entry::Occupied(mut slot) => slot.get_mut().push(value.into_owned()),
        }
    }
    params
}

/// Build the canonical message for a parameter set.
///
/// Every parameter given is included; callers drop `signature` first.
/// Components are ordered by UTF-16 code units, the order Shopify's own
/// signing libraries sort strings in.
pub fn canonicalize(params: &QueryParams) -> String {
    let mut components: Vec<String> = params
        .iter()
        .map(|(key, value)| format!("{}={}", key, value.render()))
        .collect();
    components.sort_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));
    components.concat()
}

/// Compute the hex App Proxy signature for a parameter set.
pub fn sign_query(secret: &Secret, params: &QueryParams) -> Result<String, Rejection> {
    Ok(hex::encode(hmac_sha256(secret, canonicalize(params).as_bytes())?))
}

/// Verifies App Proxy requests against the configured secret.
#[derive(Debug, Clone)]
pub struct QueryHmacVerifier {
    secret: Option<Secret>,
}

impl QueryHmacVerifier {
    pub fn new(secret: Option<Secret>) -> Self {
        Self { secret }
    }

    /// Verify a raw query string carrying its own `signature` parameter.
    pub fn verify(&self, raw_query: &str) -> bool {
        match self.check(raw_query) {
            Ok(()) => true,
            Err(rejection) => {
                warn!(
                    scheme = "query",
                    reason = rejection.code(),
                    query_length = raw_query.len(),
                    "signature_rejected"
                );
                false
            }
        }
    }

    /// Like [`verify`](Self::verify), but reports why a request was denied.
    pub fn check(&self, raw_query: &str) -> Result<(), Rejection> {
        let secret = self.secret.as_ref().ok_or(Rejection::MissingSecret)?;

        let mut params = parse_query(raw_query);
        let presented = match params.remove(SIGNATURE_PARAM) {
            Some(ParamValue::Single(signature)) if !signature.is_empty() => signature,
            Some(ParamValue::Multi(_)) => return Err(Rejection::AmbiguousSignature),
            _ => return Err(Rejection::MissingSignature),
        };

        let expected = sign_query(secret, &params)?;

        if constant_time_eq(expected.as_bytes(), presented.as_bytes()) {
            Ok(())
        } else {
            Err(Rejection::Mismatch)
        }
    }
}
