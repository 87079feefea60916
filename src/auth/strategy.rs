//! Usage: `AuthStrategy` seam plus the never-failing `AuthClient` facade handed to callers.

use super::browser::BrowserPopupAuth;
use super::host_delegated::HostDelegatedAuth;
use super::session::AuthSession;
use super::token_cache::TokenStore;
use super::windows::SystemWindowOpener;
use crate::infra::config::{AuthConfig, AuthMode};
use crate::shared::error::AppResult;
use crate::shared::security::mask_token;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type StrategyFuture<'a, T> = Pin<Box<dyn Future<Output = AppResult<T>> + Send + 'a>>;

/// What the caller wants a token for. Explicit `scopes` win over `target_resource`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessTokenOptions {
    pub target_resource: Option<String>,
    pub scopes: Vec<String>,
}

impl AccessTokenOptions {
    pub fn for_resource(resource: impl Into<String>) -> Self {
        Self {
            target_resource: Some(resource.into()),
            scopes: Vec::new(),
        }
    }

    pub fn with_scopes<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            target_resource: None,
            scopes: scopes.into_iter().map(Into::into).collect(),
        }
    }

    /// Scopes to request; falls back to `{target_resource}/.default`.
    pub fn effective_scopes(&self) -> Vec<String> {
        let scopes: Vec<String> = self
            .scopes
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if !scopes.is_empty() {
            return scopes;
        }

        self.target_resource
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(|r| vec![format!("{}/.default", r.trim_end_matches('/'))])
            .unwrap_or_default()
    }
}

pub trait AuthStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn get_access_token<'a>(&'a self, options: &'a AccessTokenOptions)
        -> StrategyFuture<'a, String>;

    fn log_out(&self) -> StrategyFuture<'_, ()>;
}

/// Entry point for token consumers. Never fails: errors are logged and degrade to `""`.
#[derive(Clone)]
pub struct AuthClient {
    strategy: Arc<dyn AuthStrategy>,
}

impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("strategy", &self.strategy.name())
            .finish()
    }
}

impl AuthClient {
    pub fn new(strategy: Arc<dyn AuthStrategy>) -> Self {
        Self { strategy }
    }

    /// Picks the strategy for `config.mode`; browser mode opens real browser windows.
    pub fn from_config(
        config: &AuthConfig,
        store: Arc<dyn TokenStore>,
        session: Arc<AuthSession>,
    ) -> AppResult<Self> {
        let strategy: Arc<dyn AuthStrategy> = match config.mode {
            AuthMode::Host => Arc::new(HostDelegatedAuth::from_config(config)?),
            AuthMode::Browser => {
                let opener = Arc::new(SystemWindowOpener::from_config(config)?);
                Arc::new(BrowserPopupAuth::from_config(config, store, session, opener)?)
            }
        };
        tracing::info!(strategy = strategy.name(), "auth client ready");
        Ok(Self::new(strategy))
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub async fn get_access_token(&self, options: &AccessTokenOptions) -> String {
        match self.strategy.get_access_token(options).await {
            Ok(token) => {
                tracing::debug!(
                    strategy = self.strategy.name(),
                    token = %mask_token(&token),
                    "access token acquired"
                );
                token
            }
            Err(err) => {
                tracing::warn!(
                    strategy = self.strategy.name(),
                    target_resource = options.target_resource.as_deref().unwrap_or(""),
                    "failed to get access token: {err}"
                );
                String::new()
            }
        }
    }

    pub async fn log_out(&self) {
        if let Err(err) = self.strategy.log_out().await {
            tracing::warn!(strategy = self.strategy.name(), "log out failed: {err}");
        }
    }
}
