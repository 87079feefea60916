//! Usage: Token acquisition (browser popup / embedded host), token cache and plugin-facing auth API.

mod browser;
mod extension_client;
mod host_delegated;
mod host_routes;
pub mod jwt;
mod session;
mod strategy;
pub mod token_cache;
mod urls;
pub mod window;
pub mod windows;

pub use browser::{BrowserAuthTimings, BrowserPopupAuth};
pub use extension_client::{options_from_value, ExtensionClient};
pub use host_delegated::{HostDelegatedAuth, CSRF_HEADER};
pub use host_routes::{build_router as build_host_router, HostApiState};
pub use session::AuthSession;
pub use strategy::{AccessTokenOptions, AuthClient, AuthStrategy, StrategyFuture};
pub use urls::IdentityUrls;
