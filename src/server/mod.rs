//! Web front end (axum).
//!
//! - `GET  /`        - persona, topic labels and domain keywords
//! - `POST /chat`    - `{ user_name, user_input }` → `{ response }`
//! - `GET  /models`  - active and available generation models
//! - `POST /models`  - `{ model }` switches the active model
//! - `GET  /health`  - liveness

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::{get, post};
use tracing::info;

use crate::config::BackendConfig;
use crate::desk::Desk;
use handlers::AppState;

pub fn router(desk: Arc<Desk>, backend: BackendConfig) -> Router {
    let state = AppState {
        desk,
        backend: Arc::new(backend),
    };

    Router::new()
        .route("/", get(handlers::index))
        .route("/chat", post(handlers::chat))
        .route("/models", get(handlers::list_models).post(handlers::select_model))
        .route("/health", get(handlers::health))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO)),
        )
        .with_state(state)
}

/// Serve until Ctrl+C.
pub async fn serve(bind: &str, desk: Arc<Desk>, backend: BackendConfig) -> Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address: {bind}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("{} listening on http://{addr}", desk.persona());

    axum::serve(listener, router(desk, backend))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("web server failed")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
}
