//! Usage: Host-side `/api/auth/*` routes that back [`HostDelegatedAuth`](super::HostDelegatedAuth).

use super::extension_client::scopes_from_param;
use super::host_delegated::CSRF_HEADER;
use super::strategy::{AccessTokenOptions, AuthClient};
use crate::shared::security::constant_time_eq;
use axum::{
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone)]
pub struct HostApiState {
    csrf_token: Arc<str>,
    auth: AuthClient,
}

impl HostApiState {
    pub fn new(csrf_token: &str, auth: AuthClient) -> Self {
        Self {
            csrf_token: Arc::from(csrf_token.trim()),
            auth,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenQuery {
    target_resource: Option<String>,
    scopes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: String,
}

async fn require_csrf(State(state): State<HostApiState>, req: Request, next: Next) -> Response {
    let provided = req
        .headers()
        .get(CSRF_HEADER)
        .map(|v| v.as_bytes())
        .unwrap_or_default();
    let expected = state.csrf_token.as_bytes();
    if expected.is_empty() || !constant_time_eq(provided, expected) {
        tracing::warn!(path = %req.uri().path(), "host auth request rejected: csrf mismatch");
        return StatusCode::FORBIDDEN.into_response();
    }
    next.run(req).await
}

async fn get_access_token(
    State(state): State<HostApiState>,
    Query(query): Query<TokenQuery>,
) -> Json<TokenResponse> {
    let options = AccessTokenOptions {
        target_resource: query
            .target_resource
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()),
        scopes: query
            .scopes
            .as_deref()
            .map(scopes_from_param)
            .unwrap_or_default(),
    };
    let access_token = state.auth.get_access_token(&options).await;
    Json(TokenResponse { access_token })
}

async fn log_out(State(state): State<HostApiState>) -> StatusCode {
    state.auth.log_out().await;
    StatusCode::OK
}

pub fn build_router(state: HostApiState) -> Router {
    Router::new()
        .route("/api/auth/getAccessToken", get(get_access_token))
        .route("/api/auth/logOut", get(log_out))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_csrf))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::strategy::{AuthStrategy, StrategyFuture};
    use crate::shared::error::AppError;
    use crate::shared::mutex_ext::MutexExt;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStrategy {
        seen: Mutex<Vec<AccessTokenOptions>>,
    }

    impl AuthStrategy for RecordingStrategy {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn get_access_token<'a>(
            &'a self,
            options: &'a AccessTokenOptions,
        ) -> StrategyFuture<'a, String> {
            self.seen.lock_or_recover().push(options.clone());
            Box::pin(async { Ok::<_, AppError>("tok-1".to_string()) })
        }

        fn log_out(&self) -> StrategyFuture<'_, ()> {
            Box::pin(async { Ok::<_, AppError>(()) })
        }
    }

    async fn serve(strategy: Arc<RecordingStrategy>) -> String {
        let state = HostApiState::new("csrf-1", AuthClient::new(strategy));
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, build_router(state)).await;
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn csrf_mismatch_is_forbidden() {
        let base = serve(Arc::new(RecordingStrategy::default())).await;
        let client = reqwest::Client::new();

        let missing = client
            .get(format!("{base}/api/auth/getAccessToken"))
            .send()
            .await
            .expect("send");
        assert_eq!(missing.status(), reqwest::StatusCode::FORBIDDEN);

        let wrong = client
            .get(format!("{base}/api/auth/logOut"))
            .header(CSRF_HEADER, "nope")
            .send()
            .await
            .expect("send");
        assert_eq!(wrong.status(), reqwest::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn token_route_parses_query() {
        let strategy = Arc::new(RecordingStrategy::default());
        let base = serve(strategy.clone()).await;
        let body: serde_json::Value = reqwest::Client::new()
            .get(format!("{base}/api/auth/getAccessToken"))
            .query(&[("targetResource", "https://graph"), ("scopes", "[\"a\"]")])
            .header(CSRF_HEADER, "csrf-1")
            .send()
            .await
            .expect("send")
            .json()
            .await
            .expect("json");
        assert_eq!(body["accessToken"], "tok-1");

        let seen = strategy.seen.lock_or_recover().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].target_resource.as_deref(), Some("https://graph"));
        assert_eq!(seen[0].scopes, vec!["a"]);
    }
}
