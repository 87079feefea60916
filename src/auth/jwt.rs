//! Usage: Unverified JWT claim inspection (expiry + login hint) for client-side cache decisions.
//!
//! No signature is checked here. The claims only decide whether a cached token is worth reusing;
//! the resource server remains the authority on validity.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;

pub(crate) fn decode_claims(token: &str) -> Option<Value> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    let payload_part = token.split('.').nth(1)?;
    let payload = URL_SAFE_NO_PAD
        .decode(payload_part.trim_end_matches('='))
        .ok()?;
    let claims: Value = serde_json::from_slice(&payload).ok()?;
    claims.is_object().then_some(claims)
}

/// `exp` claim in unix milliseconds; fractional NumericDate values keep their sub-second part.
pub fn token_expiry_unix_ms(token: &str) -> Option<i64> {
    let claims = decode_claims(token)?;
    let exp = claims.get("exp")?;
    if let Some(seconds) = exp.as_i64() {
        return Some(seconds.saturating_mul(1000));
    }
    exp.as_f64()
        .filter(|v| v.is_finite())
        .map(|v| (v * 1000.0).round() as i64)
}

/// True at or after the embedded expiry instant; tokens without a readable `exp` count as expired.
pub fn is_token_expired(token: &str, now_unix_ms: i64) -> bool {
    match token_expiry_unix_ms(token) {
        Some(exp_ms) => now_unix_ms >= exp_ms,
        None => true,
    }
}

/// Best-effort account hint for silent token requests.
pub(crate) fn login_hint(id_token: &str) -> Option<String> {
    let claims = decode_claims(id_token)?;
    ["preferred_username", "upn", "email"]
        .iter()
        .filter_map(|key| claims.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}
