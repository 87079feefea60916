//! Usage: Assign an Azure prediction resource to every LUIS app a bot's dialogs reference.

use super::api::{AzureAccount, LuisAuthoringApi};
use super::settings_files::{find_settings_files, read_app_ids, DIALOGS_DIR_NAME};
use crate::shared::blocking;
use crate::shared::error::AppResult;
use std::collections::BTreeMap;
use std::path::PathBuf;
use url::Url;

#[derive(Debug, Clone)]
pub struct LuisPublishRequest {
    pub bot_dir: PathBuf,
    pub name: String,
    pub environment: String,
    pub authoring_region: String,
    pub authoring_key: String,
    pub access_token: String,
    /// Prediction account name; defaults to `{name}-{environment}-luis`.
    pub luis_resource: Option<String>,
    /// Overrides `https://{authoring_region}.api.cognitive.microsoft.com`.
    pub endpoint: Option<String>,
}

impl LuisPublishRequest {
    pub fn account_name(&self) -> String {
        self.luis_resource
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-{}-luis", self.name, self.environment))
    }

    pub fn endpoint_url(&self) -> AppResult<Url> {
        let raw = match self.endpoint.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(endpoint) => endpoint.to_string(),
            None => {
                let region = self.authoring_region.trim();
                if region.is_empty() {
                    return Err("SEC_INVALID_INPUT: authoring region is required".into());
                }
                format!("https://{region}.api.cognitive.microsoft.com")
            }
        };
        Url::parse(&raw).map_err(|e| format!("SEC_INVALID_INPUT: invalid luis endpoint: {e}").into())
    }
}

fn select_account(accounts: Vec<AzureAccount>, wanted: &str) -> AppResult<AzureAccount> {
    accounts
        .into_iter()
        .find(|account| account.account_name == wanted)
        .ok_or_else(|| {
            format!("LUIS_API_ERROR: no prediction account named {wanted} is available").into()
        })
}

/// Returns `dialogKey -> appId` for every app that was assigned the prediction account.
pub async fn publish_luis_to_prediction(
    client: &reqwest::Client,
    request: &LuisPublishRequest,
) -> AppResult<BTreeMap<String, String>> {
    let dialogs_dir = request.bot_dir.join(DIALOGS_DIR_NAME);
    let app_ids = blocking::run("luis_settings_scan", move || {
        let files = find_settings_files(&dialogs_dir)?;
        if files.is_empty() {
            return Ok(BTreeMap::new());
        }
        read_app_ids(&files)
    })
    .await?;

    if app_ids.is_empty() {
        tracing::info!(bot_dir = %request.bot_dir.display(), "no luis settings found; nothing to publish");
        return Ok(app_ids);
    }

    let api = LuisAuthoringApi::new(
        client.clone(),
        request.endpoint_url()?,
        request.authoring_key.clone(),
        request.access_token.clone(),
    );
    let accounts = api.list_azure_accounts().await?;
    let account = select_account(accounts, &request.account_name())?;

    for (dialog_key, app_id) in &app_ids {
        api.assign_azure_account(app_id, &account).await?;
        tracing::info!(
            dialog = %dialog_key,
            app_id = %app_id,
            account = %account.account_name,
            "assigned prediction account"
        );
    }

    Ok(app_ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> LuisPublishRequest {
        LuisPublishRequest {
            bot_dir: PathBuf::from("."),
            name: "mybot".to_string(),
            environment: "dev".to_string(),
            authoring_region: "westus".to_string(),
            authoring_key: "key".to_string(),
            access_token: "tok".to_string(),
            luis_resource: None,
            endpoint: None,
        }
    }

    #[test]
    fn account_name_falls_back_to_convention() {
        assert_eq!(request().account_name(), "mybot-dev-luis");
        let custom = LuisPublishRequest {
            luis_resource: Some("shared-luis".to_string()),
            ..request()
        };
        assert_eq!(custom.account_name(), "shared-luis");
    }

    #[test]
    fn endpoint_defaults_to_region_host() {
        assert_eq!(
            request().endpoint_url().expect("url").as_str(),
            "https://westus.api.cognitive.microsoft.com/"
        );
        let blank = LuisPublishRequest {
            authoring_region: " ".to_string(),
            ..request()
        };
        assert!(blank.endpoint_url().is_err());
    }
}
