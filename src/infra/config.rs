//! Usage: App configuration (`composer-hub.toml`): schema, defaults, env overrides and validation.

use crate::infra::app_paths;
use crate::shared::error::AppResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const CONFIG_FILE_NAME: &str = "composer-hub.toml";
pub const CONFIG_PATH_ENV: &str = "COMPOSER_HUB_CONFIG";
pub const CSRF_TOKEN_ENV: &str = "COMPOSER_CSRF_TOKEN";

const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
const DEFAULT_TENANT: &str = "common";
const DEFAULT_REDIRECT_URI: &str = "http://localhost:3000/auth/callback";
const DEFAULT_HOST_BASE_URL: &str = "http://localhost:5000";
const DEFAULT_PROVISION_BASE_URL: &str = "http://localhost:5000/api";
const DEFAULT_MONITOR_INTERVAL_MS: u64 = 500;
const DEFAULT_POPUP_TIMEOUT_SECONDS: u64 = 300;
const DEFAULT_FRAME_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;
const MIN_MONITOR_INTERVAL_MS: u64 = 50;
const MIN_POLL_INTERVAL_MS: u64 = 100;
const MAX_POPUP_TIMEOUT_SECONDS: u64 = 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Tokens come from the identity provider through a popup/hidden frame.
    #[default]
    Browser,
    /// The embedded host owns auth; requests are delegated to its server endpoints.
    Host,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TokenCacheBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub client_id: String,
    pub tenant: String,
    pub authority: String,
    pub redirect_uri: String,
    pub host_base_url: String,
    pub csrf_token: String,
    pub monitor_interval_ms: u64,
    pub popup_timeout_seconds: u64,
    pub frame_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::Browser,
            client_id: String::new(),
            tenant: DEFAULT_TENANT.to_string(),
            authority: DEFAULT_AUTHORITY.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            host_base_url: DEFAULT_HOST_BASE_URL.to_string(),
            csrf_token: String::new(),
            monitor_interval_ms: DEFAULT_MONITOR_INTERVAL_MS,
            popup_timeout_seconds: DEFAULT_POPUP_TIMEOUT_SECONDS,
            frame_timeout_seconds: DEFAULT_FRAME_TIMEOUT_SECONDS,
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
        }
    }
}

impl AuthConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    pub fn popup_timeout(&self) -> Duration {
        Duration::from_secs(self.popup_timeout_seconds)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_secs(self.frame_timeout_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    pub base_url: String,
    pub poll_interval_ms: u64,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PROVISION_BASE_URL.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl ProvisionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: Option<PathBuf>,
    pub token_cache: TokenCacheBackend,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub auth: AuthConfig,
    pub provision: ProvisionConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn data_dir(&self) -> AppResult<PathBuf> {
        app_paths::app_data_dir(self.storage.data_dir.as_deref())
    }
}

fn sanitize_intervals(config: &mut AppConfig) -> bool {
    let mut changed = false;

    if config.auth.monitor_interval_ms < MIN_MONITOR_INTERVAL_MS {
        config.auth.monitor_interval_ms = DEFAULT_MONITOR_INTERVAL_MS;
        changed = true;
    }
    if config.auth.popup_timeout_seconds == 0 {
        config.auth.popup_timeout_seconds = DEFAULT_POPUP_TIMEOUT_SECONDS;
        changed = true;
    }
    if config.auth.popup_timeout_seconds > MAX_POPUP_TIMEOUT_SECONDS {
        config.auth.popup_timeout_seconds = MAX_POPUP_TIMEOUT_SECONDS;
        changed = true;
    }
    if config.auth.frame_timeout_seconds == 0 {
        config.auth.frame_timeout_seconds = DEFAULT_FRAME_TIMEOUT_SECONDS;
        changed = true;
    }
    if config.auth.request_timeout_seconds == 0 {
        config.auth.request_timeout_seconds = DEFAULT_REQUEST_TIMEOUT_SECONDS;
        changed = true;
    }
    if config.provision.poll_interval_ms < MIN_POLL_INTERVAL_MS {
        config.provision.poll_interval_ms = DEFAULT_POLL_INTERVAL_MS;
        changed = true;
    }

    changed
}

fn validate_url(field: &str, raw: &str) -> AppResult<()> {
    let url = Url::parse(raw.trim())
        .map_err(|e| format!("SEC_INVALID_INPUT: {field} is not a valid url: {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("SEC_INVALID_INPUT: {field} must use http or https").into());
    }
    Ok(())
}

pub fn validate(config: &AppConfig) -> AppResult<()> {
    validate_url("auth.authority", &config.auth.authority)?;
    validate_url("auth.redirect_uri", &config.auth.redirect_uri)?;
    validate_url("auth.host_base_url", &config.auth.host_base_url)?;
    validate_url("provision.base_url", &config.provision.base_url)?;

    if config.auth.tenant.trim().is_empty() {
        return Err("SEC_INVALID_INPUT: auth.tenant must not be empty".into());
    }
    if config.auth.mode == AuthMode::Browser && config.auth.client_id.trim().is_empty() {
        return Err("SEC_INVALID_INPUT: auth.client_id is required in browser mode".into());
    }
    Ok(())
}

pub fn parse_config_toml(content: &str) -> AppResult<AppConfig> {
    toml::from_str(content).map_err(|e| {
        format!("SEC_INVALID_INPUT: failed to parse {CONFIG_FILE_NAME}: {e}").into()
    })
}

fn apply_env_overrides(config: &mut AppConfig, get_env: impl Fn(&str) -> Option<String>) {
    if let Some(token) = get_env(CSRF_TOKEN_ENV)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
    {
        config.auth.csrf_token = token;
    }
}

fn resolve_config_path(explicit: Option<&Path>) -> AppResult<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    Ok(app_paths::app_data_dir(None)?.join(CONFIG_FILE_NAME))
}

/// Missing files yield defaults; a present but invalid file is an error.
pub fn load(explicit: Option<&Path>) -> AppResult<AppConfig> {
    let path = resolve_config_path(explicit)?;
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            format!(
                "SYSTEM_ERROR: failed to read config {}: {e}",
                path.display()
            )
        })?;
        parse_config_toml(&content)?
    } else {
        tracing::debug!(path = %path.display(), "config file not found; using defaults");
        AppConfig::default()
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    if sanitize_intervals(&mut config) {
        tracing::warn!(path = %path.display(), "config contained out-of-range intervals; defaults applied");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_once_client_id_set() {
        let mut config = AppConfig::default();
        assert!(validate(&config).is_err());
        config.auth.client_id = "client-123".to_string();
        validate(&config).expect("defaults valid");
        assert_eq!(config.provision.poll_interval(), Duration::from_millis(5000));
        assert_eq!(config.auth.mode, AuthMode::Browser);
    }

    #[test]
    fn host_mode_does_not_require_client_id() {
        let mut config = AppConfig::default();
        config.auth.mode = AuthMode::Host;
        validate(&config).expect("host mode valid");
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config = parse_config_toml(
            r#"
[auth]
mode = "host"
host_base_url = "http://127.0.0.1:5100"

[provision]
poll_interval_ms = 250
"#,
        )
        .expect("parse");
        assert_eq!(config.auth.mode, AuthMode::Host);
        assert_eq!(config.auth.host_base_url, "http://127.0.0.1:5100");
        assert_eq!(config.auth.tenant, DEFAULT_TENANT);
        assert_eq!(config.provision.poll_interval_ms, 250);
        assert_eq!(config.storage.token_cache, TokenCacheBackend::Sqlite);
    }

    #[test]
    fn invalid_toml_is_rejected() {
        let err = parse_config_toml("[auth\nmode = 3").expect_err("invalid");
        assert_eq!(err.code(), "SEC_INVALID_INPUT");
    }

    #[test]
    fn invalid_redirect_uri_is_rejected() {
        let mut config = AppConfig::default();
        config.auth.client_id = "client".to_string();
        config.auth.redirect_uri = "not a url".to_string();
        let err = validate(&config).expect_err("invalid url");
        assert!(err.to_string().contains("auth.redirect_uri"));
    }

    #[test]
    fn sanitize_restores_zero_intervals() {
        let mut config = AppConfig::default();
        config.auth.monitor_interval_ms = 0;
        config.provision.poll_interval_ms = 1;
        config.auth.popup_timeout_seconds = 10 * 60 * 60;
        assert!(sanitize_intervals(&mut config));
        assert_eq!(config.auth.monitor_interval_ms, DEFAULT_MONITOR_INTERVAL_MS);
        assert_eq!(config.provision.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(config.auth.popup_timeout_seconds, MAX_POPUP_TIMEOUT_SECONDS);
        assert!(!sanitize_intervals(&mut config));
    }

    #[test]
    fn csrf_env_override_wins() {
        let mut config = AppConfig::default();
        config.auth.csrf_token = "from-file".to_string();
        apply_env_overrides(&mut config, |key| {
            (key == CSRF_TOKEN_ENV).then(|| " from-env ".to_string())
        });
        assert_eq!(config.auth.csrf_token, "from-env");
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            "[auth]\nclient_id = \"abc\"\n[provision]\nbase_url = \"http://127.0.0.1:9/api\"\n",
        )
        .expect("write config");
        let config = load(Some(&path)).expect("load");
        assert_eq!(config.auth.client_id, "abc");
        assert_eq!(config.provision.base_url, "http://127.0.0.1:9/api");
    }
}
