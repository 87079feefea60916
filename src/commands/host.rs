//! Usage: Serve the embedded-host auth routes until Ctrl-C.

use crate::app_state::AppState;
use crate::auth::{build_host_router, AuthClient, HostApiState};
use std::net::SocketAddr;

/// The routes answer with the inner client's tokens, so it must not itself delegate to a host.
fn check_servable(auth: &AuthClient, csrf_token: &str) -> Result<(), String> {
    if csrf_token.trim().is_empty() {
        return Err("SEC_INVALID_INPUT: a csrf token is required to serve host auth routes".into());
    }
    if auth.strategy_name() == "host" {
        return Err(
            "SEC_INVALID_INPUT: host-serve requires auth.mode = \"browser\"; host mode would delegate to itself"
                .into(),
        );
    }
    Ok(())
}

pub(crate) async fn host_serve(
    state: &AppState,
    bind_addr: SocketAddr,
    csrf_token: String,
) -> Result<(), String> {
    check_servable(&state.auth, &csrf_token)?;

    let std_listener = std::net::TcpListener::bind(bind_addr)
        .map_err(|e| format!("SYSTEM_ERROR: host bind failed on {bind_addr}: {e}"))?;
    std_listener
        .set_nonblocking(true)
        .map_err(|e| format!("SYSTEM_ERROR: host listener setup failed: {e}"))?;
    let listener = tokio::net::TcpListener::from_std(std_listener)
        .map_err(|e| format!("SYSTEM_ERROR: host listener setup failed: {e}"))?;

    let router = build_host_router(HostApiState::new(&csrf_token, state.auth.clone()));
    tracing::info!(bind_addr = %bind_addr, "host auth routes listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await
        .map_err(|e| format!("SYSTEM_ERROR: host server failed: {e}"))
}
