//! Usage: HTTP client for the provisioning service (`POST` start, `GET` job status).

use crate::shared::error::AppError;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

/// Failure talking to the provisioning service; `payload` keeps any JSON error body.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ProvisionApiError {
    pub message: String,
    pub payload: Option<Value>,
}

impl ProvisionApiError {
    fn transport(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            payload: None,
        }
    }

    fn from_body(status: reqwest::StatusCode, body: &str) -> Self {
        let payload = serde_json::from_str::<Value>(body).ok();
        let message = payload
            .as_ref()
            .and_then(|v| v.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("provisioning service returned {status}: {body}"));
        Self { message, payload }
    }
}

impl From<ProvisionApiError> for AppError {
    fn from(value: ProvisionApiError) -> Self {
        AppError::new("PROVISION_ERROR", value.message)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartedBody {
    #[serde(default, deserialize_with = "lenient_string")]
    id: Option<String>,
    #[serde(default)]
    process_name: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone)]
pub struct ProvisionStarted {
    pub job_id: String,
    pub process_name: Option<String>,
    pub message: Option<String>,
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub struct ProvisionStatusResponse {
    pub http_status: u16,
    pub message: Option<String>,
    pub config: Option<Value>,
    pub raw: Value,
}

impl ProvisionStatusResponse {
    /// `200` with a non-empty `config` is the only success signal.
    pub fn is_success(&self) -> bool {
        self.http_status == 200 && self.config.as_ref().is_some_and(config_is_present)
    }

    pub fn is_failure(&self) -> bool {
        self.http_status == 500
    }
}

fn config_is_present(config: &Value) -> bool {
    match config {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

#[derive(Debug, Clone)]
pub struct ProvisionApi {
    client: reqwest::Client,
    base_url: Url,
}

impl ProvisionApi {
    pub fn new(client: reqwest::Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ProvisionApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProvisionApiError::transport("provision base url cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub async fn start(
        &self,
        project_id: &str,
        target_type: &str,
        config: &Value,
        arm_token: &str,
        graph_token: &str,
    ) -> Result<ProvisionStarted, ProvisionApiError> {
        let url = self.endpoint(&["provision", project_id, target_type])?;
        let response = self
            .client
            .post(url)
            .bearer_auth(arm_token)
            .header("graphtoken", graph_token)
            .json(config)
            .send()
            .await
            .map_err(|e| ProvisionApiError::transport(format!("provision request failed: {e}")))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ProvisionApiError::transport(format!("provision response read failed: {e}"))
        })?;
        if !status.is_success() {
            return Err(ProvisionApiError::from_body(status, &body));
        }

        let raw: Value = serde_json::from_str(&body).map_err(|e| ProvisionApiError {
            message: format!("provision response is not json: {e}"),
            payload: None,
        })?;
        let parsed: StartedBody = serde_json::from_value(raw.clone()).map_err(|e| {
            ProvisionApiError {
                message: format!("provision response has unexpected shape: {e}"),
                payload: Some(raw.clone()),
            }
        })?;
        let job_id = parsed.id.filter(|id| !id.trim().is_empty()).ok_or_else(|| {
            ProvisionApiError {
                message: "provision response is missing a job id".to_string(),
                payload: Some(raw.clone()),
            }
        })?;

        Ok(ProvisionStarted {
            job_id,
            process_name: parsed.process_name,
            message: parsed.message,
            raw,
        })
    }

    /// Non-2xx statuses are returned, not raised; only transport and parse problems are errors.
    pub async fn status(
        &self,
        project_id: &str,
        target_type: &str,
        target_name: &str,
        job_id: &str,
        arm_token: &str,
    ) -> Result<ProvisionStatusResponse, ProvisionApiError> {
        let url = self.endpoint(&[
            "provision",
            project_id,
            "status",
            target_type,
            target_name,
            job_id,
        ])?;
        let response = self
            .client
            .get(url)
            .bearer_auth(arm_token)
            .send()
            .await
            .map_err(|e| ProvisionApiError::transport(format!("status request failed: {e}")))?;

        let http_status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            ProvisionApiError::transport(format!("status response read failed: {e}"))
        })?;
        let raw: Value = serde_json::from_str(&body).map_err(|e| ProvisionApiError {
            message: format!("status response is not json ({http_status}): {e}"),
            payload: None,
        })?;

        let message = raw
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string);
        let config = raw.get("config").cloned();
        Ok(ProvisionStatusResponse {
            http_status,
            message,
            config,
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn api_for(server: &mockito::ServerGuard) -> ProvisionApi {
        let base = Url::parse(&format!("{}/api", server.url())).expect("url");
        ProvisionApi::new(reqwest::Client::new(), base)
    }

    #[tokio::test]
    async fn start_sends_tokens_and_reads_job() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/provision/bot-1/azurePublish")
            .match_header("authorization", "Bearer arm-1")
            .match_header("graphtoken", "graph-1")
            .match_body(mockito::Matcher::PartialJson(json!({"name": "dev"})))
            .with_status(202)
            .with_body(r#"{"id":"job-1","processName":"dev","message":"Creating resources"}"#)
            .create_async()
            .await;

        let started = api_for(&server)
            .start("bot-1", "azurePublish", &json!({"name": "dev"}), "arm-1", "graph-1")
            .await
            .expect("start");
        assert_eq!(started.job_id, "job-1");
        assert_eq!(started.process_name.as_deref(), Some("dev"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn start_failure_keeps_payload() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/provision/bot-1/azurePublish")
            .with_status(400)
            .with_body(r#"{"message":"subscription missing","code":"E1"}"#)
            .create_async()
            .await;

        let err = api_for(&server)
            .start("bot-1", "azurePublish", &json!({"name": "dev"}), "a", "g")
            .await
            .expect_err("failure");
        assert_eq!(err.message, "subscription missing");
        assert_eq!(err.payload.expect("payload")["code"], "E1");
    }

    #[tokio::test]
    async fn status_returns_non_success_codes() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/provision/bot-1/status/azurePublish/dev/job-1")
            .with_status(500)
            .with_body(r#"{"status":500,"message":"quota exceeded"}"#)
            .create_async()
            .await;

        let response = api_for(&server)
            .status("bot-1", "azurePublish", "dev", "job-1", "a")
            .await
            .expect("status");
        assert!(response.is_failure());
        assert!(!response.is_success());
        assert_eq!(response.message.as_deref(), Some("quota exceeded"));
    }

    #[test]
    fn empty_config_is_not_success() {
        let response = |config: Option<Value>| ProvisionStatusResponse {
            http_status: 200,
            message: None,
            config,
            raw: json!({}),
        };
        assert!(!response(None).is_success());
        assert!(!response(Some(json!({}))).is_success());
        assert!(!response(Some(Value::Null)).is_success());
        assert!(response(Some(json!({"hostname": "bot"}))).is_success());
    }
}
