//! Usage: Plugin-facing auth API (`auth.getAccessToken` / `auth.logOut`) with lenient option parsing.

use super::strategy::{AccessTokenOptions, AuthClient};
use serde_json::Value;

/// Accepts a JSON array of strings or a single string; anything else yields no scopes.
pub(crate) fn scopes_from_value(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Value::String(raw) => raw
            .split_whitespace()
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Query-string form: a JSON array, or space separated scopes.
pub(crate) fn scopes_from_param(raw: &str) -> Vec<String> {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Array(_)) => scopes_from_value(&value),
        _ => scopes_from_value(&Value::String(raw.to_string())),
    }
}

pub fn options_from_value(raw: &Value) -> AccessTokenOptions {
    let Some(map) = raw.as_object() else {
        return AccessTokenOptions::default();
    };
    let target_resource = map
        .get("targetResource")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let scopes = map.get("scopes").map(scopes_from_value).unwrap_or_default();
    AccessTokenOptions {
        target_resource,
        scopes,
    }
}

/// The object extensions receive as `auth`.
#[derive(Debug, Clone)]
pub struct ExtensionClient {
    auth: AuthClient,
}

impl ExtensionClient {
    pub fn new(auth: AuthClient) -> Self {
        Self { auth }
    }

    pub async fn get_access_token(&self, raw_options: Value) -> String {
        let options = options_from_value(&raw_options);
        self.auth.get_access_token(&options).await
    }

    pub async fn log_out(&self) {
        self.auth.log_out().await;
    }
}
