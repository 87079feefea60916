//! Usage: Per-session auth state (current id token), reset explicitly on logout.

use crate::shared::mutex_ext::MutexExt;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct AuthSession {
    id_token: Mutex<Option<String>>,
    /// Serializes interactive/silent acquisitions so concurrent callers share one popup.
    acquire_gate: tokio::sync::Mutex<()>,
}

impl AuthSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id_token(&self) -> Option<String> {
        self.id_token.lock_or_recover().clone()
    }

    pub fn set_id_token(&self, token: impl Into<String>) {
        *self.id_token.lock_or_recover() = Some(token.into());
    }

    pub fn reset(&self) {
        self.id_token.lock_or_recover().take();
    }

    pub(crate) async fn acquire_guard(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.acquire_gate.lock().await
    }
}
