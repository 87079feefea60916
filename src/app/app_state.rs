//! Usage: Process-wide service wiring used by `commands/*` (config, token cache, auth, poller).

use crate::auth::token_cache::{MemoryTokenStore, SqliteTokenStore, TokenStore};
use crate::auth::{AuthClient, AuthSession, ExtensionClient};
use crate::domain::provision::{NotificationCenter, ProvisionApi, ProvisionPoller, ProvisionStatusStore};
use crate::infra::config::{AppConfig, TokenCacheBackend};
use crate::infra::db;
use crate::infra::project_settings::ProjectSettingsStore;
use crate::shared::blocking;
use crate::shared::error::AppResult;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

pub struct AppState {
    pub config: AppConfig,
    pub data_dir: PathBuf,
    pub http: reqwest::Client,
    pub session: Arc<AuthSession>,
    pub auth: AuthClient,
    pub settings: Arc<ProjectSettingsStore>,
    pub notifications: Arc<NotificationCenter>,
    pub poller: ProvisionPoller,
}

async fn open_token_store(config: &AppConfig, data_dir: &Path) -> AppResult<Arc<dyn TokenStore>> {
    match config.storage.token_cache {
        TokenCacheBackend::Memory => Ok(Arc::new(MemoryTokenStore::new())),
        TokenCacheBackend::Sqlite => {
            let dir = data_dir.to_path_buf();
            let db = blocking::run("db_init", move || db::init(&dir)).await?;
            Ok(Arc::new(SqliteTokenStore::new(db)))
        }
    }
}

impl AppState {
    pub async fn init(config: AppConfig, data_dir: PathBuf) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.auth.request_timeout())
            .build()
            .map_err(|e| format!("SYSTEM_ERROR: failed to build http client: {e}"))?;

        let store = open_token_store(&config, &data_dir).await?;
        let session = Arc::new(AuthSession::new());
        let auth = AuthClient::from_config(&config.auth, store, session.clone())?;

        let base_url = Url::parse(config.provision.base_url.trim())
            .map_err(|e| format!("SEC_INVALID_INPUT: invalid provision.base_url: {e}"))?;
        let settings = Arc::new(ProjectSettingsStore::new(data_dir.clone()));
        let notifications = Arc::new(NotificationCenter::new());
        let poller = ProvisionPoller::new(
            ProvisionApi::new(http.clone(), base_url),
            Arc::new(ProvisionStatusStore::new()),
            settings.clone(),
            notifications.clone(),
            config.provision.poll_interval(),
        );

        tracing::info!(
            data_dir = %data_dir.display(),
            auth = auth.strategy_name(),
            "app state ready"
        );

        Ok(Self {
            config,
            data_dir,
            http,
            session,
            auth,
            settings,
            notifications,
            poller,
        })
    }

    pub fn extension_client(&self) -> ExtensionClient {
        ExtensionClient::new(self.auth.clone())
    }
}
