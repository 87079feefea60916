//! Usage: Browser-mode auth: cached tokens first, then popup / hidden-frame implicit flows.

use super::jwt::{is_token_expired, login_hint};
use super::session::AuthSession;
use super::strategy::{AccessTokenOptions, AuthStrategy, StrategyFuture};
use super::token_cache::{cache_key, TokenStore, ID_TOKEN_CACHE_KEY};
use super::urls::IdentityUrls;
use super::window::{monitor_window_for_query_param, MonitorOptions, WindowOpener};
use crate::infra::config::AuthConfig;
use crate::shared::blocking;
use crate::shared::error::AppResult;
use crate::shared::security::mask_token;
use crate::shared::time::now_unix_millis;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct BrowserAuthTimings {
    pub monitor_interval: Duration,
    pub popup_timeout: Duration,
    pub frame_timeout: Duration,
}

impl BrowserAuthTimings {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            monitor_interval: config.monitor_interval(),
            popup_timeout: config.popup_timeout(),
            frame_timeout: config.frame_timeout(),
        }
    }

    fn popup(&self) -> MonitorOptions {
        MonitorOptions::new(self.monitor_interval, self.popup_timeout)
    }

    fn frame(&self) -> MonitorOptions {
        MonitorOptions::new(self.monitor_interval, self.frame_timeout)
    }
}

pub struct BrowserPopupAuth {
    urls: IdentityUrls,
    store: Arc<dyn TokenStore>,
    session: Arc<AuthSession>,
    opener: Arc<dyn WindowOpener>,
    timings: BrowserAuthTimings,
}

impl BrowserPopupAuth {
    pub fn new(
        urls: IdentityUrls,
        store: Arc<dyn TokenStore>,
        session: Arc<AuthSession>,
        opener: Arc<dyn WindowOpener>,
        timings: BrowserAuthTimings,
    ) -> Self {
        Self {
            urls,
            store,
            session,
            opener,
            timings,
        }
    }

    pub fn from_config(
        config: &AuthConfig,
        store: Arc<dyn TokenStore>,
        session: Arc<AuthSession>,
        opener: Arc<dyn WindowOpener>,
    ) -> AppResult<Self> {
        Ok(Self::new(
            IdentityUrls::from_config(config)?,
            store,
            session,
            opener,
            BrowserAuthTimings::from_config(config),
        ))
    }

    async fn cache_get(&self, key: &str) -> AppResult<Option<String>> {
        let store = self.store.clone();
        let key = key.to_string();
        blocking::run("token_cache_get", move || store.get(&key)).await
    }

    async fn cache_set(&self, key: &str, token: &str) -> AppResult<()> {
        let store = self.store.clone();
        let key = key.to_string();
        let token = token.to_string();
        blocking::run("token_cache_set", move || store.set(&key, &token)).await
    }

    async fn cached_valid(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self
            .cache_get(key)
            .await?
            .filter(|token| !is_token_expired(token, now_unix_millis())))
    }

    /// Returns a non-expired id token, opening a popup (none cached) or hidden frame (expired).
    async fn ensure_id_token(&self) -> AppResult<Option<String>> {
        let current = match self.session.id_token() {
            Some(token) => Some(token),
            None => self.cache_get(ID_TOKEN_CACHE_KEY).await?,
        };

        let fresh = match current {
            Some(token) if !is_token_expired(&token, now_unix_millis()) => {
                self.session.set_id_token(token.clone());
                return Ok(Some(token));
            }
            Some(_) => {
                tracing::info!("id token expired; refreshing silently");
                let window = self.opener.open_hidden_frame(&self.urls.id_token_url(true))?;
                monitor_window_for_query_param(window.as_ref(), "id_token", self.timings.frame())
                    .await
            }
            None => {
                tracing::info!("no id token cached; opening sign-in popup");
                let window = self.opener.open_popup(&self.urls.id_token_url(false))?;
                monitor_window_for_query_param(window.as_ref(), "id_token", self.timings.popup())
                    .await
            }
        };

        let Some(token) = fresh else {
            return Ok(None);
        };
        self.cache_set(ID_TOKEN_CACHE_KEY, &token).await?;
        self.session.set_id_token(token.clone());
        tracing::debug!(token = %mask_token(&token), "id token stored");
        Ok(Some(token))
    }

    async fn acquire(&self, options: &AccessTokenOptions) -> AppResult<String> {
        let scopes = options.effective_scopes();
        if scopes.is_empty() {
            return Err("SEC_INVALID_INPUT: scopes or targetResource is required".into());
        }
        let key = cache_key(self.urls.client_id(), &scopes);

        if let Some(token) = self.cached_valid(&key).await? {
            return Ok(token);
        }

        let _guard = self.session.acquire_guard().await;
        // Another caller may have finished the same acquisition while we waited.
        if let Some(token) = self.cached_valid(&key).await? {
            return Ok(token);
        }

        let Some(id_token) = self.ensure_id_token().await? else {
            return Err("AUTH_TOKEN_EXPIRED: could not obtain an id token".into());
        };

        let hint = login_hint(&id_token);
        let url = self.urls.access_token_url(&scopes, hint.as_deref());
        let frame = self.opener.open_hidden_frame(&url)?;
        let token =
            monitor_window_for_query_param(frame.as_ref(), "access_token", self.timings.frame())
                .await
                .ok_or_else(|| {
                    "AUTH_TOKEN_EXPIRED: access token frame produced no token".to_string()
                })?;

        self.cache_set(&key, &token).await?;
        tracing::info!(scopes = ?scopes, "access token acquired via hidden frame");
        Ok(token)
    }

    async fn clear(&self) -> AppResult<()> {
        let store = self.store.clone();
        // Keys are `clientId + JSON(scopes)`; the `[` keeps `client-1` from matching `client-10`.
        let prefix = format!("{}[", self.urls.client_id());
        let removed = blocking::run("token_cache_clear", move || {
            store.remove(ID_TOKEN_CACHE_KEY)?;
            store.remove_by_prefix(&prefix)
        })
        .await;
        // The session is reset even when the store could not be cleared.
        self.session.reset();
        let removed = removed?;
        tracing::info!(removed, "browser session logged out");
        Ok(())
    }
}

impl AuthStrategy for BrowserPopupAuth {
    fn name(&self) -> &'static str {
        "browser"
    }

    fn get_access_token<'a>(
        &'a self,
        options: &'a AccessTokenOptions,
    ) -> StrategyFuture<'a, String> {
        Box::pin(self.acquire(options))
    }

    fn log_out(&self) -> StrategyFuture<'_, ()> {
        Box::pin(self.clear())
    }
}
