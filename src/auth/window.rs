//! Usage: Popup / hidden-frame abstraction and the redirect monitor that waits for a query param.
//!
//! A window on the identity provider's origin cannot be read; only the closed flag is visible.
//! Once the redirect lands back on our own origin, the full URL becomes readable.

use crate::shared::error::AppResult;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WindowAccessError {
    #[error("window location is on a foreign origin")]
    CrossOrigin,
}

pub trait AuthWindow: Send + Sync {
    fn is_closed(&self) -> bool;

    /// `Ok(None)` while nothing has loaded yet; `Err(CrossOrigin)` while on a foreign origin.
    fn current_url(&self) -> Result<Option<Url>, WindowAccessError>;

    fn close(&self);
}

pub trait WindowOpener: Send + Sync {
    fn open_popup(&self, url: &Url) -> AppResult<Box<dyn AuthWindow>>;

    fn open_hidden_frame(&self, url: &Url) -> AppResult<Box<dyn AuthWindow>>;
}

#[derive(Debug, Clone, Copy)]
pub struct MonitorOptions {
    pub interval: Duration,
    pub timeout: Duration,
}

impl MonitorOptions {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            timeout,
        }
    }
}

enum UrlCheck {
    Found(String),
    ProviderError,
    Pending,
}

fn check_url(url: &Url, param_name: &str) -> UrlCheck {
    let mut provider_error: Option<(String, Option<String>)> = None;
    for (key, value) in url.query_pairs() {
        if key == param_name && !value.trim().is_empty() {
            return UrlCheck::Found(value.into_owned());
        }
        match key.as_ref() {
            "error" => provider_error = Some((value.into_owned(), None)),
            "error_description" => {
                if let Some((_, description)) = provider_error.as_mut() {
                    *description = Some(value.into_owned());
                } else {
                    provider_error = Some((String::new(), Some(value.into_owned())));
                }
            }
            _ => {}
        }
    }

    if let Some((error, description)) = provider_error {
        tracing::warn!(
            param = param_name,
            error = %error,
            error_description = description.as_deref().unwrap_or(""),
            "identity provider redirected with an error"
        );
        return UrlCheck::ProviderError;
    }
    UrlCheck::Pending
}

/// Waits until the window's same-origin URL carries `param_name`, then closes the window.
///
/// Resolves to `None` when the window closes, the provider redirects with `error`, or
/// `options.timeout` elapses.
pub async fn monitor_window_for_query_param(
    window: &dyn AuthWindow,
    param_name: &str,
    options: MonitorOptions,
) -> Option<String> {
    let deadline = Instant::now() + options.timeout;
    let mut ticker = tokio::time::interval(options.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let outcome = loop {
        ticker.tick().await;

        match window.current_url() {
            Ok(Some(url)) => match check_url(&url, param_name) {
                UrlCheck::Found(value) => break Some(value),
                UrlCheck::ProviderError => break None,
                UrlCheck::Pending => {}
            },
            Ok(None) | Err(WindowAccessError::CrossOrigin) => {}
        }

        if window.is_closed() {
            tracing::debug!(param = param_name, "auth window closed before redirect");
            break None;
        }
        if Instant::now() >= deadline {
            tracing::warn!(
                param = param_name,
                timeout_ms = options.timeout.as_millis(),
                "auth window timed out"
            );
            break None;
        }
    };

    window.close();
    outcome
}
