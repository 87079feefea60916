//! Usage: Concrete auth windows backed by the system browser and a redirect-walking http client.

mod headless;
mod loopback;

pub use headless::HeadlessFrame;
pub use loopback::{BrowserLauncher, LoopbackPopup, SystemBrowser};

use crate::auth::window::{AuthWindow, WindowOpener};
use crate::infra::config::AuthConfig;
use crate::shared::error::AppResult;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub struct SystemWindowOpener {
    redirect_uri: Url,
    launcher: Arc<dyn BrowserLauncher>,
    frame_client: reqwest::Client,
    popup_timeout: Duration,
    frame_timeout: Duration,
}

impl SystemWindowOpener {
    pub fn from_config(config: &AuthConfig) -> AppResult<Self> {
        Self::with_launcher(config, Arc::new(SystemBrowser))
    }

    pub fn with_launcher(config: &AuthConfig, launcher: Arc<dyn BrowserLauncher>) -> AppResult<Self> {
        let redirect_uri = Url::parse(config.redirect_uri.trim())
            .map_err(|e| format!("SEC_INVALID_INPUT: invalid auth.redirect_uri: {e}"))?;
        Ok(Self {
            redirect_uri,
            launcher,
            frame_client: headless::build_frame_client(config.request_timeout())?,
            popup_timeout: config.popup_timeout(),
            frame_timeout: config.frame_timeout(),
        })
    }
}

impl WindowOpener for SystemWindowOpener {
    fn open_popup(&self, url: &Url) -> AppResult<Box<dyn AuthWindow>> {
        let popup = LoopbackPopup::open(
            url,
            &self.redirect_uri,
            self.launcher.as_ref(),
            self.popup_timeout,
        )?;
        Ok(Box::new(popup))
    }

    fn open_hidden_frame(&self, url: &Url) -> AppResult<Box<dyn AuthWindow>> {
        Ok(Box::new(HeadlessFrame::open(
            self.frame_client.clone(),
            url,
            &self.redirect_uri,
            self.frame_timeout,
        )))
    }
}
