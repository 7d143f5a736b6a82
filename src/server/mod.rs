//! HTTP adapter exposing background removal over multipart uploads
//!
//! Routes:
//! - `POST /api/remove` with a multipart `file` field, answered with a PNG
//! - `GET /health`

pub mod error;
pub mod handlers;

use crate::{
    config::ServerConfig,
    error::{RemovalError, Result},
    processor::RemovalSession,
};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

pub use error::ApiError;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<RemovalSession>,
    pub started_at: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(session: Arc<RemovalSession>) -> Self {
        Self {
            session,
            started_at: Instant::now(),
        }
    }
}

/// Build the application router
///
/// Upload size is bounded by `config.max_upload_bytes`; larger bodies get 413.
pub fn router(session: Arc<RemovalSession>, config: &ServerConfig) -> Router {
    Router::new()
        .route("/api/remove", post(handlers::remove_handler))
        .route("/health", get(handlers::health_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState::new(session))
}

/// Bind `config.bind` and serve until Ctrl-C
///
/// # Errors
/// - Address cannot be bound
/// - Server loop fails
pub async fn serve(session: Arc<RemovalSession>, config: &ServerConfig) -> Result<()> {
    let listener = TcpListener::bind(config.bind).await.map_err(|e| {
        RemovalError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to bind {}: {e}", config.bind),
        ))
    })?;
    serve_on(listener, session, config).await
}

/// Serve on an already bound listener
///
/// # Errors
/// - Server loop fails
pub async fn serve_on(
    listener: TcpListener,
    session: Arc<RemovalSession>,
    config: &ServerConfig,
) -> Result<()> {
    let local_addr = listener.local_addr()?;
    let model_name = session.descriptor().name().to_string();
    let app = router(session, config);

    tracing::info!("🚀 Background removal server listening on http://{}", local_addr);
    tracing::info!("📋 Model: {}", model_name);
    tracing::info!("📋 Available endpoints:");
    tracing::info!("  POST /api/remove  - Remove image background (multipart field 'file')");
    tracing::info!("  GET  /health      - Health check");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
