//! HTTP server setup and routing

use crate::state::AppContext;
use axum::{
    routing::{delete, get, post},
    Router,
};
use scribe_common::{Error, Result};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the full application router.
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(super::handlers::health))
        .route("/create", post(super::handlers::create))
        // Transcript document
        .route("/agenda/:minutes_id", get(super::handlers::get_agenda))
        .route("/agenda", post(super::handlers::update_agenda))
        .route("/meeting/:minutes_id", get(super::handlers::get_meeting))
        .route("/meeting", post(super::handlers::update_meeting))
        .route("/glossary/:minutes_id", get(super::handlers::get_glossary))
        .route("/glossary", post(super::handlers::update_glossary))
        .route("/track_minutes", post(super::handlers::track_minutes))
        .route("/topic", delete(super::handlers::delete_topic))
        // Chat and retrieval
        .route("/chat/:chat_history_id", get(super::handlers::get_chat_history))
        .route("/chat/clear", post(super::handlers::clear_chat))
        .route("/query/document", post(super::handlers::query_document))
        .route("/query/web", post(super::handlers::query_web))
        .route("/summarise", post(super::handlers::summarise))
        .route("/document", delete(super::handlers::delete_document))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        // The meeting frontend runs on its own origin
        .layer(CorsLayer::permissive())
}

/// Bind and serve until the shutdown future resolves.
pub async fn run(
    port: u16,
    app: Router,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Config(format!("failed to bind to {}: {}", addr, e)))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Internal(format!("server error: {}", e)))?;
    Ok(())
}
