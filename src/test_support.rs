//! Usage: Public test helpers for unit and integration tests.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Builds an unsigned (`alg: none`) JWT carrying `claims`, enough for expiry inspection.
pub fn unsigned_jwt(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}

/// Unsigned JWT expiring `ttl_secs` from now (negative for an already-expired token).
pub fn jwt_expiring_in(ttl_secs: i64, extra_claims: serde_json::Value) -> String {
    let mut claims = match extra_claims {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    let exp = crate::shared::time::now_unix_seconds().saturating_add(ttl_secs);
    claims.insert("exp".to_string(), serde_json::json!(exp));
    unsigned_jwt(&serde_json::Value::Object(claims))
}
