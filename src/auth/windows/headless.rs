//! Usage: Hidden "frame" that follows the provider's redirects without a visible browser.
//!
//! Each `Location` hop is fetched with redirects disabled. Hops on the provider's origin stay
//! unreadable; the first hop onto the redirect URI's origin becomes the readable location.

use crate::auth::window::{AuthWindow, WindowAccessError};
use crate::shared::error::AppResult;
use crate::shared::mutex_ext::MutexExt;
use crate::shared::security::redact_url;
use reqwest::header::LOCATION;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

const MAX_REDIRECT_HOPS: usize = 10;

#[derive(Debug, Default)]
struct FrameState {
    landed: Option<Url>,
    closed: bool,
}

pub struct HeadlessFrame {
    state: Arc<Mutex<FrameState>>,
    cancel: CancellationToken,
}

pub(crate) fn build_frame_client(request_timeout: Duration) -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(request_timeout)
        .build()
        .map_err(|e| format!("SYSTEM_ERROR: failed to build frame http client: {e}").into())
}

impl HeadlessFrame {
    pub fn open(client: reqwest::Client, url: &Url, redirect_uri: &Url, timeout: Duration) -> Self {
        let state = Arc::new(Mutex::new(FrameState::default()));
        let cancel = CancellationToken::new();

        tracing::debug!(url = %redact_url(url), "loading hidden auth frame");
        tokio::spawn(walk_redirects(
            client,
            url.clone(),
            redirect_uri.clone(),
            state.clone(),
            cancel.clone(),
            timeout,
        ));

        Self { state, cancel }
    }
}

impl AuthWindow for HeadlessFrame {
    fn is_closed(&self) -> bool {
        self.state.lock_or_recover().closed
    }

    fn current_url(&self) -> Result<Option<Url>, WindowAccessError> {
        let state = self.state.lock_or_recover();
        match (&state.landed, state.closed) {
            (Some(url), _) => Ok(Some(url.clone())),
            (None, false) => Err(WindowAccessError::CrossOrigin),
            (None, true) => Ok(None),
        }
    }

    fn close(&self) {
        self.cancel.cancel();
        self.state.lock_or_recover().closed = true;
    }
}

impl Drop for HeadlessFrame {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn walk_redirects(
    client: reqwest::Client,
    start: Url,
    redirect_uri: Url,
    state: Arc<Mutex<FrameState>>,
    cancel: CancellationToken,
    timeout: Duration,
) {
    let walk = follow_hops(&client, start, &redirect_uri);
    let landed = tokio::select! {
        _ = cancel.cancelled() => None,
        result = tokio::time::timeout(timeout, walk) => match result {
            Ok(Ok(landed)) => landed,
            Ok(Err(err)) => {
                tracing::warn!("hidden auth frame failed: {err}");
                None
            }
            Err(_) => {
                tracing::warn!(timeout_ms = timeout.as_millis(), "hidden auth frame timed out");
                None
            }
        },
    };

    let mut state = state.lock_or_recover();
    match landed {
        Some(url) => state.landed = Some(url),
        None => state.closed = true,
    }
}

/// `Ok(None)` means the provider stopped on a page of its own (interactive prompt, error page).
async fn follow_hops(
    client: &reqwest::Client,
    start: Url,
    redirect_uri: &Url,
) -> AppResult<Option<Url>> {
    let target_origin = redirect_uri.origin();
    let mut current = start;

    for _ in 0..MAX_REDIRECT_HOPS {
        if current.origin() == target_origin {
            return Ok(Some(current));
        }

        let response = client
            .get(current.clone())
            .send()
            .await
            .map_err(|e| format!("SYSTEM_ERROR: auth frame request failed: {e}"))?;

        if !response.status().is_redirection() {
            tracing::debug!(
                status = response.status().as_u16(),
                "hidden auth frame stopped on a foreign page"
            );
            return Ok(None);
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| "SYSTEM_ERROR: auth frame redirect without location".to_string())?;
        current = current
            .join(location)
            .map_err(|e| format!("SYSTEM_ERROR: auth frame redirect location invalid: {e}"))?;
    }

    Err("SYSTEM_ERROR: auth frame exceeded redirect limit".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;

    async fn spawn_provider() -> Url {
        let app = Router::new()
            .route(
                "/authorize",
                get(|| async { (StatusCode::FOUND, [(header::LOCATION, "/hop")]).into_response() }),
            )
            .route(
                "/hop",
                get(|| async {
                    (
                        StatusCode::FOUND,
                        [(
                            header::LOCATION,
                            "http://127.0.0.1:9/auth/callback?access_token=tok-1&state=s",
                        )],
                    )
                        .into_response()
                }),
            )
            .route("/login", get(|| async { "sign in please" }));
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
            .await
            .expect("bind provider");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Url::parse(&format!("http://{addr}/")).expect("url")
    }

    fn redirect_uri() -> Url {
        Url::parse("http://127.0.0.1:9/auth/callback").expect("url")
    }

    async fn wait_settled(frame: &HeadlessFrame) {
        for _ in 0..200 {
            if !matches!(frame.current_url(), Err(WindowAccessError::CrossOrigin)) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn follows_redirects_onto_redirect_origin() {
        let base = spawn_provider().await;
        let client = build_frame_client(Duration::from_secs(5)).expect("client");
        let frame = HeadlessFrame::open(
            client,
            &base.join("authorize").expect("join"),
            &redirect_uri(),
            Duration::from_secs(5),
        );
        wait_settled(&frame).await;

        let landed = frame.current_url().expect("readable").expect("landed");
        assert_eq!(landed.path(), "/auth/callback");
        assert!(landed
            .query_pairs()
            .any(|(k, v)| k == "access_token" && v == "tok-1"));
    }

    #[tokio::test]
    async fn foreign_final_page_closes_frame() {
        let base = spawn_provider().await;
        let client = build_frame_client(Duration::from_secs(5)).expect("client");
        let frame = HeadlessFrame::open(
            client,
            &base.join("login").expect("join"),
            &redirect_uri(),
            Duration::from_secs(5),
        );
        wait_settled(&frame).await;

        assert!(frame.is_closed());
        assert_eq!(frame.current_url(), Ok(None));
    }
}
