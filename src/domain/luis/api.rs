//! Usage: LUIS authoring REST calls (list Azure accounts, assign an account to an app).

use crate::shared::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use url::Url;

const EXPIRED_TOKEN_MARKER: &str = "access token expiry";
pub const EXPIRED_TOKEN_REMEDIATION: &str =
    "run az account get-access-token, then replace the accessToken in your configuration";

/// Prediction resource as returned by `GET /luis/api/v2.0/azureaccounts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AzureAccount {
    pub azure_subscription_id: String,
    pub resource_group: String,
    pub account_name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct LuisAuthoringApi {
    client: reqwest::Client,
    endpoint: Url,
    authoring_key: String,
    access_token: String,
}

/// Maps a failed LUIS response onto the crate error model.
pub(crate) fn luis_error(status: reqwest::StatusCode, body: &str) -> AppError {
    if body.to_ascii_lowercase().contains(EXPIRED_TOKEN_MARKER) {
        return AppError::new(
            "AUTH_TOKEN_EXPIRED",
            format!("{body}\nAzure access token expired: {EXPIRED_TOKEN_REMEDIATION}"),
        );
    }
    AppError::new("LUIS_API_ERROR", format!("{status}: {body}"))
}

impl LuisAuthoringApi {
    pub fn new(
        client: reqwest::Client,
        endpoint: Url,
        authoring_key: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint,
            authoring_key: authoring_key.into(),
            access_token: access_token.into(),
        }
    }

    fn url(&self, path: &str) -> AppResult<Url> {
        let base = self.endpoint.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/luis/api/v2.0/{path}"))
            .map_err(|e| format!("SEC_INVALID_INPUT: invalid luis endpoint: {e}").into())
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.access_token)
            .header("Ocp-Apim-Subscription-Key", &self.authoring_key)
    }

    pub async fn list_azure_accounts(&self) -> AppResult<Vec<AzureAccount>> {
        let url = self.url("azureaccounts")?;
        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(|e| format!("LUIS_API_ERROR: azure accounts request failed: {e}"))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("LUIS_API_ERROR: azure accounts response read failed: {e}"))?;
        if !status.is_success() {
            return Err(luis_error(status, &body));
        }
        serde_json::from_str(&body)
            .map_err(|e| format!("LUIS_API_ERROR: unexpected azure accounts payload: {e}").into())
    }

    pub async fn assign_azure_account(&self, app_id: &str, account: &AzureAccount) -> AppResult<()> {
        let url = self.url(&format!("apps/{app_id}/azureaccounts"))?;
        let response = self
            .authorized(self.client.post(url))
            .json(account)
            .send()
            .await
            .map_err(|e| format!("LUIS_API_ERROR: assign account request failed: {e}"))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(luis_error(status, &body))
    }
}
