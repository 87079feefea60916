//! Usage: Security-sensitive helpers (token masking, URL redaction, constant-time equality).

use subtle::ConstantTimeEq;
use url::Url;

const TOKEN_MASK_PREFIX_LEN: usize = 6;
const TOKEN_MASK_SUFFIX_LEN: usize = 4;

/// Query keys whose values must never reach the logs verbatim.
const SECRET_QUERY_KEYS: &[&str] = &["id_token", "access_token", "code", "state", "nonce"];

pub(crate) fn mask_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let len = trimmed.len();
    if len <= TOKEN_MASK_PREFIX_LEN + TOKEN_MASK_SUFFIX_LEN || !trimmed.is_ascii() {
        return "*".repeat(len.min(8));
    }

    let prefix = &trimmed[..TOKEN_MASK_PREFIX_LEN];
    let suffix = &trimmed[len - TOKEN_MASK_SUFFIX_LEN..];
    format!("{prefix}...{suffix}")
}

/// Renders a redirect/authorize URL for logging with secret query values masked.
pub(crate) fn redact_url(url: &Url) -> String {
    if url.query().is_none() {
        return url.to_string();
    }

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| {
            let value = if SECRET_QUERY_KEYS.contains(&key.as_ref()) {
                mask_token(&value)
            } else {
                value.into_owned()
            };
            (key.into_owned(), value)
        })
        .collect();

    let mut redacted = url.clone();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}

pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
