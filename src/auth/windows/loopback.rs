//! Usage: Visible "popup" backed by the system browser plus a one-shot localhost redirect listener.
//!
//! The browser sits on the identity provider's origin until the provider redirects to
//! `redirect_uri`, which we serve ourselves; from then on the callback URL is readable.

use crate::auth::window::{AuthWindow, WindowAccessError};
use crate::shared::error::AppResult;
use crate::shared::mutex_ext::MutexExt;
use crate::shared::security::redact_url;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use url::Url;

const SUCCESS_HTML: &str =
    "<html><body><h1>Sign-in complete</h1><p>You may close this window.</p></body></html>";
const NOT_FOUND_HTML: &str = "<html><body><h1>Not found</h1></body></html>";
const MAX_REQUEST_BYTES: usize = 16 * 1024;
/// Idle connections (browser preconnects) must not hold up the real callback.
const CONNECTION_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Launches a URL in the user's browser.
pub trait BrowserLauncher: Send + Sync {
    fn launch(&self, url: &Url) -> AppResult<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn launch(&self, url: &Url) -> AppResult<()> {
        open::that(url.as_str())
            .map_err(|e| format!("SYSTEM_ERROR: failed to launch system browser: {e}").into())
    }
}

#[derive(Debug, Default)]
struct LoopbackState {
    landed: Option<Url>,
    closed: bool,
}

pub struct LoopbackPopup {
    state: Arc<Mutex<LoopbackState>>,
    cancel: CancellationToken,
}

impl LoopbackPopup {
    /// Binds the redirect listener first so the provider can never redirect to a closed port.
    pub fn open(
        authorize_url: &Url,
        redirect_uri: &Url,
        launcher: &dyn BrowserLauncher,
        timeout: Duration,
    ) -> AppResult<Self> {
        let listener = bind_redirect_listener(redirect_uri)?;
        let state = Arc::new(Mutex::new(LoopbackState::default()));
        let cancel = CancellationToken::new();

        tokio::spawn(serve_redirect(
            listener,
            redirect_uri.clone(),
            state.clone(),
            cancel.clone(),
            timeout,
        ));

        tracing::info!(url = %redact_url(authorize_url), "opening sign-in popup in system browser");
        if let Err(err) = launcher.launch(authorize_url) {
            cancel.cancel();
            state.lock_or_recover().closed = true;
            return Err(err);
        }

        Ok(Self { state, cancel })
    }
}

impl AuthWindow for LoopbackPopup {
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

impl Drop for LoopbackPopup {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn bind_redirect_listener(redirect_uri: &Url) -> AppResult<TcpListener> {
    let host = match redirect_uri.host_str() {
        Some("localhost") | None => "127.0.0.1",
        Some(host) => host,
    };
    let port = redirect_uri
        .port_or_known_default()
        .ok_or_else(|| "SEC_INVALID_INPUT: redirect_uri has no port".to_string())?;

    let std_listener = std::net::TcpListener::bind((host, port))
        .map_err(|e| format!("SYSTEM_ERROR: auth redirect bind failed on {host}:{port}: {e}"))?;
    std_listener
        .set_nonblocking(true)
        .map_err(|e| format!("SYSTEM_ERROR: auth redirect listener setup failed: {e}"))?;
    TcpListener::from_std(std_listener)
        .map_err(|e| format!("SYSTEM_ERROR: auth redirect listener setup failed: {e}").into())
}

async fn serve_redirect(
    listener: TcpListener,
    redirect_uri: Url,
    state: Arc<Mutex<LoopbackState>>,
    cancel: CancellationToken,
    timeout: Duration,
) {
    let wait = async {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    tracing::warn!("auth redirect accept failed: {err}");
                    return None;
                }
            };
            match tokio::time::timeout(
                CONNECTION_READ_TIMEOUT,
                handle_connection(socket, &redirect_uri),
            )
            .await
            {
                Ok(Ok(Some(url))) => return Some(url),
                Ok(Ok(None)) => continue,
                Ok(Err(err)) => tracing::debug!("auth redirect request ignored: {err}"),
                Err(_) => tracing::debug!("auth redirect connection idle; dropped"),
            }
        }
    };

    let landed = tokio::select! {
        _ = cancel.cancelled() => None,
        result = tokio::time::timeout(timeout, wait) => result.ok().flatten(),
    };

    let mut state = state.lock_or_recover();
    match landed {
        Some(url) => state.landed = Some(url),
        None => state.closed = true,
    }
}

/// Returns the full callback URL when the request hits the redirect path; other paths get 404.
async fn handle_connection(mut socket: TcpStream, redirect_uri: &Url) -> AppResult<Option<Url>> {
    let mut buffer = vec![0u8; MAX_REQUEST_BYTES];
    let size = socket
        .read(&mut buffer)
        .await
        .map_err(|e| format!("SYSTEM_ERROR: auth redirect read failed: {e}"))?;
    if size == 0 {
        return Err("SYSTEM_ERROR: auth redirect request is empty".into());
    }

    let request = String::from_utf8_lossy(&buffer[..size]);
    let target = extract_request_target(request.as_ref())?;
    let callback = redirect_uri
        .join(target)
        .map_err(|e| format!("SYSTEM_ERROR: invalid auth redirect target: {e}"))?;

    let matches = callback.path() == redirect_uri.path();
    let (status, body) = if matches {
        ("HTTP/1.1 200 OK", SUCCESS_HTML)
    } else {
        ("HTTP/1.1 404 Not Found", NOT_FOUND_HTML)
    };
    let response = format!(
        "{status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;

    Ok(matches.then_some(callback))
}

fn extract_request_target(request: &str) -> AppResult<&str> {
    let first = request
        .lines()
        .next()
        .ok_or_else(|| "SYSTEM_ERROR: auth redirect malformed request".to_string())?;
    let mut parts = first.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let target = parts.next().unwrap_or_default();
    if method != "GET" || !target.starts_with('/') {
        return Err("SYSTEM_ERROR: auth redirect must be GET".into());
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn free_redirect_uri() -> Url {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).expect("bind free port");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);
        Url::parse(&format!("http://127.0.0.1:{port}/auth/callback")).expect("url")
    }

    async fn landed_url(popup: &LoopbackPopup) -> Option<Url> {
        for _ in 0..100 {
            if let Ok(Some(url)) = popup.current_url() {
                return Some(url);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }

    #[derive(Default)]
    struct CountingLauncher(AtomicUsize);

    impl BrowserLauncher for CountingLauncher {
        fn launch(&self, _url: &Url) -> AppResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingLauncher;

    impl BrowserLauncher for FailingLauncher {
        fn launch(&self, _url: &Url) -> AppResult<()> {
            Err("SYSTEM_ERROR: no browser".into())
        }
    }

    #[test]
    fn extract_request_target_requires_get() {
        assert_eq!(
            extract_request_target("GET /auth/callback?x=1 HTTP/1.1\r\n").expect("target"),
            "/auth/callback?x=1"
        );
        assert!(extract_request_target("POST /auth/callback HTTP/1.1\r\n").is_err());
        assert!(extract_request_target("").is_err());
    }

    #[tokio::test]
    async fn redirect_becomes_readable_after_callback() {
        let redirect_uri = free_redirect_uri();
        let authorize = Url::parse("https://login.example.com/authorize").expect("url");
        let launcher = CountingLauncher::default();
        let popup = LoopbackPopup::open(&authorize, &redirect_uri, &launcher, Duration::from_secs(5))
            .expect("open popup");
        assert_eq!(launcher.0.load(Ordering::SeqCst), 1);
        assert_eq!(popup.current_url(), Err(WindowAccessError::CrossOrigin));

        let client = reqwest::Client::new();
        let stray = client
            .get(redirect_uri.join("/favicon.ico").expect("join"))
            .send()
            .await
            .expect("stray request");
        assert_eq!(stray.status(), reqwest::StatusCode::NOT_FOUND);

        let mut callback = redirect_uri.clone();
        callback.set_query(Some("id_token=abc&state=s"));
        let response = client.get(callback).send().await.expect("callback");
        assert!(response.status().is_success());

        let landed = landed_url(&popup).await.expect("landed");
        assert_eq!(landed.path(), "/auth/callback");
        assert!(landed.query_pairs().any(|(k, v)| k == "id_token" && v == "abc"));
        assert!(!popup.is_closed());
    }

    #[tokio::test]
    async fn idle_connection_does_not_block_callback() {
        let redirect_uri = free_redirect_uri();
        let authorize = Url::parse("https://login.example.com/authorize").expect("url");
        let popup = LoopbackPopup::open(
            &authorize,
            &redirect_uri,
            &CountingLauncher::default(),
            Duration::from_secs(60),
        )
        .expect("open popup");

        let port = redirect_uri.port().expect("port");
        let _idle = TcpStream::connect(("127.0.0.1", port))
            .await
            .expect("idle connect");
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut callback = redirect_uri.clone();
        callback.set_query(Some("id_token=abc"));
        let response = tokio::time::timeout(
            Duration::from_secs(10),
            reqwest::Client::new().get(callback).send(),
        )
        .await
        .expect("callback served before popup timeout")
        .expect("callback");
        assert!(response.status().is_success());
        assert!(landed_url(&popup).await.is_some());
    }

    #[tokio::test]
    async fn close_marks_window_closed() {
        let redirect_uri = free_redirect_uri();
        let authorize = Url::parse("https://login.example.com/authorize").expect("url");
        let popup = LoopbackPopup::open(
            &authorize,
            &redirect_uri,
            &CountingLauncher::default(),
            Duration::from_secs(5),
        )
        .expect("open popup");
        popup.close();
        assert!(popup.is_closed());
        assert_eq!(popup.current_url(), Ok(None));
    }

    #[tokio::test]
    async fn launcher_failure_is_reported() {
        let redirect_uri = free_redirect_uri();
        let authorize = Url::parse("https://login.example.com/authorize").expect("url");
        let result =
            LoopbackPopup::open(&authorize, &redirect_uri, &FailingLauncher, Duration::from_secs(5));
        assert!(result.is_err());
    }
}
