//! Usage: Auth commands (plugin `auth.getAccessToken` / `auth.logOut`).

use crate::app_state::AppState;

/// Always a string; empty when no token could be obtained.
pub(crate) async fn auth_get_access_token(state: &AppState, options: serde_json::Value) -> String {
    state.extension_client().get_access_token(options).await
}

pub(crate) async fn auth_log_out(state: &AppState) {
    state.extension_client().log_out().await;
}
