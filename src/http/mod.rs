//! HTTP API server for external control
//!
//! This module provides a small REST API around a running session:
//! - POST /session/enable - Start listening
//! - POST /session/disable - Stop listening and cancel playback
//! - GET /session/status - Query session and connection statistics
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Serve the control API until `shutdown` fires
pub async fn serve(bind: &str, port: u16, state: AppState, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind((bind, port))
        .await
        .with_context(|| format!("Failed to bind HTTP server to {}:{}", bind, port))?;

    info!("HTTP control API listening on {}:{}", bind, port);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server failed")
}
