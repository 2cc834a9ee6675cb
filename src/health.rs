//! Liveness endpoint for hosting platforms that health-check the process over HTTP.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const ALIVE_BODY: &str = "Bot is running";

async fn alive() -> &'static str {
    ALIVE_BODY
}

pub fn router() -> Router {
    Router::new().route("/", get(alive))
}

/// Bind `addr` and serve until `cancel` fires.
pub async fn serve(addr: SocketAddr, cancel: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind liveness endpoint to {addr}"))?;
    serve_on(listener, cancel).await
}

async fn serve_on(listener: TcpListener, cancel: CancellationToken) -> Result<()> {
    info!("Liveness endpoint listening on {}", listener.local_addr()?);
    axum::serve(listener, router())
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("Liveness server error")?;
    info!("Liveness endpoint stopped");
    Ok(())
}
