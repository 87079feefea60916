#![allow(dead_code)]

use std::ffi::OsString;
use std::sync::{Mutex, MutexGuard, OnceLock};

use composer_hub_lib::auth::window::{AuthWindow, WindowAccessError, WindowOpener};
use composer_hub_lib::shared::error::AppResult;
use tempfile::TempDir;
use url::Url;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct EnvRestore {
    saved: Vec<(&'static str, Option<OsString>)>,
}

impl EnvRestore {
    fn save_once(&mut self, key: &'static str) {
        if self.saved.iter().any(|(k, _)| *k == key) {
            return;
        }
        self.saved.push((key, std::env::var_os(key)));
    }

    fn set_var(&mut self, key: &'static str, value: impl Into<OsString>) {
        self.save_once(key);
        std::env::set_var(key, value.into());
    }

    fn remove_var(&mut self, key: &'static str) {
        self.save_once(key);
        std::env::remove_var(key);
    }
}

impl Drop for EnvRestore {
    fn drop(&mut self) {
        for (key, value) in self.saved.drain(..).rev() {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

/// Isolated HOME + data dir; env changes are serialized and restored on drop.
pub struct TestEnv {
    _lock: MutexGuard<'static, ()>,
    _env: EnvRestore,
    home: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        let lock = env_lock();
        let home = tempfile::tempdir().expect("tempdir");

        let mut env = EnvRestore::default();
        let home_os = home.path().as_os_str().to_os_string();
        env.set_var("HOME", home_os.clone());
        // Windows fallback env for `dirs`.
        env.set_var("USERPROFILE", home_os);
        env.remove_var("COMPOSER_HUB_DATA_DIR");
        env.remove_var("COMPOSER_HUB_CONFIG");
        env.remove_var("COMPOSER_CSRF_TOKEN");

        Self {
            _lock: lock,
            _env: env,
            home,
        }
    }

    pub fn set_var(&mut self, key: &'static str, value: impl Into<OsString>) {
        self._env.set_var(key, value);
    }

    pub fn home_dir(&self) -> &std::path::Path {
        self.home.path()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Serves `router` on an ephemeral localhost port and returns its base url.
pub async fn spawn_router(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opened {
    Popup,
    Frame,
}

/// A window that has already landed on `url` (or never will, when `None`).
struct LandedWindow(Option<Url>);

impl AuthWindow for LandedWindow {
    fn is_closed(&self) -> bool {
        self.0.is_none()
    }

    fn current_url(&self) -> Result<Option<Url>, WindowAccessError> {
        Ok(self.0.clone())
    }

    fn close(&self) {}
}

/// Redirects every `response_type=id_token` open to `id_token` and every other open to
/// `access_token`, recording what was opened.
pub struct FakeOpener {
    pub id_token: Option<String>,
    pub access_token: Option<String>,
    opened: Mutex<Vec<(Opened, Url)>>,
}

impl FakeOpener {
    pub fn new(id_token: Option<String>, access_token: Option<String>) -> Self {
        Self {
            id_token,
            access_token,
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn opened(&self) -> Vec<Opened> {
        self.opened
            .lock()
            .expect("opened lock")
            .iter()
            .map(|(kind, _)| *kind)
            .collect()
    }

    pub fn opened_urls(&self) -> Vec<Url> {
        self.opened
            .lock()
            .expect("opened lock")
            .iter()
            .map(|(_, url)| url.clone())
            .collect()
    }

    fn open(&self, kind: Opened, url: &Url) -> Box<dyn AuthWindow> {
        self.opened
            .lock()
            .expect("opened lock")
            .push((kind, url.clone()));
        let wants_id_token = url
            .query_pairs()
            .any(|(k, v)| k == "response_type" && v == "id_token");
        let (param, token) = if wants_id_token {
            ("id_token", self.id_token.clone())
        } else {
            ("access_token", self.access_token.clone())
        };
        let landed = token.map(|token| {
            let mut callback = Url::parse("http://localhost:3000/auth/callback").expect("url");
            callback.query_pairs_mut().append_pair(param, &token);
            callback
        });
        Box::new(LandedWindow(landed))
    }
}

impl WindowOpener for FakeOpener {
    fn open_popup(&self, url: &Url) -> AppResult<Box<dyn AuthWindow>> {
        Ok(self.open(Opened::Popup, url))
    }

    fn open_hidden_frame(&self, url: &Url) -> AppResult<Box<dyn AuthWindow>> {
        Ok(self.open(Opened::Frame, url))
    }
}
