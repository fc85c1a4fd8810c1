//! Browser chat surface: one HTML page plus a small JSON/SSE API.

mod error;
mod markdown;
mod page;
mod routes;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::chat::Assistant;
use crate::session::SessionStore;

pub use error::WebError;
pub use page::{PageRenderer, TurnView};

pub const SESSION_COOKIE: &str = "bytechat_session";

#[derive(Clone)]
pub struct AppState {
    pub assistant: Arc<Assistant>,
    pub sessions: Arc<SessionStore>,
    pub page: Arc<PageRenderer>,
}

impl AppState {
    pub fn new(assistant: Arc<Assistant>, sessions: Arc<SessionStore>) -> Result<Self> {
        Ok(Self {
            assistant,
            sessions,
            page: Arc::new(PageRenderer::new()?),
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/healthz", get(routes::healthz))
        .route("/api/history", get(routes::history))
        .route("/api/messages", post(routes::post_message))
        .route("/api/reply", post(routes::reply))
        .route("/api/reset", post(routes::reset))
        .with_state(state)
}

/// Serve until ctrl-c or `shutdown` fires. Idle sessions are swept in the background.
pub async fn serve(
    addr: &str,
    state: AppState,
    idle_secs: u64,
    shutdown: CancellationToken,
) -> Result<()> {
    let sweep_every = Duration::from_secs(idle_secs.clamp(1, 60));
    let sweeper = state
        .sessions
        .clone()
        .spawn_sweeper(sweep_every, shutdown.clone());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!("ByteChat listening on http://{}", listener.local_addr()?);

    let stop = shutdown.clone();
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("ctrl-c received, shutting down"),
                _ = stop.cancelled() => {}
            }
        })
        .await
        .context("http server")?;

    shutdown.cancel();
    let _ = sweeper.await;
    Ok(())
}
