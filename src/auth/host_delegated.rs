//! Usage: Embedded-host auth: token acquisition is delegated to the host's `/api/auth/*` routes.

use super::strategy::{AccessTokenOptions, AuthStrategy, StrategyFuture};
use crate::infra::config::AuthConfig;
use crate::shared::error::AppResult;
use serde::Deserialize;
use url::Url;

pub const CSRF_HEADER: &str = "X-CSRF-Token";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessTokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HostDelegatedAuth {
    client: reqwest::Client,
    base_url: Url,
    csrf_token: String,
}

impl HostDelegatedAuth {
    pub fn new(client: reqwest::Client, base_url: Url, csrf_token: impl Into<String>) -> Self {
        Self {
            client,
            base_url,
            csrf_token: csrf_token.into(),
        }
    }

    pub fn from_config(config: &AuthConfig) -> AppResult<Self> {
        let base_url = Url::parse(config.host_base_url.trim())
            .map_err(|e| format!("SEC_INVALID_INPUT: invalid auth.host_base_url: {e}"))?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| format!("SYSTEM_ERROR: failed to build host http client: {e}"))?;
        if config.csrf_token.trim().is_empty() {
            tracing::warn!("auth.csrf_token is empty; the host will reject delegated requests");
        }
        Ok(Self::new(client, base_url, config.csrf_token.trim()))
    }

    fn endpoint(&self, path: &str) -> AppResult<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/api/auth/{path}"))
            .map_err(|e| format!("SEC_INVALID_INPUT: invalid host endpoint: {e}").into())
    }

    async fn fetch_token(&self, options: &AccessTokenOptions) -> AppResult<String> {
        let mut url = self.endpoint("getAccessToken")?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(resource) = options.target_resource.as_deref() {
                query.append_pair("targetResource", resource);
            }
            if !options.scopes.is_empty() {
                let scopes = serde_json::to_string(&options.scopes)
                    .map_err(|e| format!("SYSTEM_ERROR: failed to encode scopes: {e}"))?;
                query.append_pair("scopes", &scopes);
            }
        }

        let response = self
            .client
            .get(url)
            .header(CSRF_HEADER, &self.csrf_token)
            .send()
            .await
            .map_err(|e| format!("SYSTEM_ERROR: host token request failed: {e}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("SYSTEM_ERROR: host token request returned {status}").into());
        }

        // Any shape mismatch degrades to an empty token rather than an error.
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| format!("SYSTEM_ERROR: host token response is not json: {e}"))?;
        let parsed: Option<AccessTokenResponse> = serde_json::from_value(body).ok();
        Ok(parsed.and_then(|r| r.access_token).unwrap_or_default())
    }

    async fn request_log_out(&self) -> AppResult<()> {
        let url = self.endpoint("logOut")?;
        let response = self
            .client
            .get(url)
            .header(CSRF_HEADER, &self.csrf_token)
            .send()
            .await
            .map_err(|e| format!("SYSTEM_ERROR: host log out request failed: {e}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("SYSTEM_ERROR: host log out returned {status}").into());
        }
        Ok(())
    }
}

impl AuthStrategy for HostDelegatedAuth {
    fn name(&self) -> &'static str {
        "host"
    }

    fn get_access_token<'a>(
        &'a self,
        options: &'a AccessTokenOptions,
    ) -> StrategyFuture<'a, String> {
        Box::pin(self.fetch_token(options))
    }

    fn log_out(&self) -> StrategyFuture<'_, ()> {
        Box::pin(self.request_log_out())
    }
}
