// HTTP API
// JSON routes over a shared RagEngine

mod error;
mod handlers;


use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::engine::RagEngine;

pub use error::ApiError;
pub use handlers::USER_ID_HEADER;

pub fn router(engine: Arc<RagEngine>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/admin/config",
            get(handlers::get_config).post(handlers::update_config),
        )
        .route(
            "/api/admin/ab-test",
            get(handlers::get_ab_test).post(handlers::save_ab_test),
        )
        .route(
            "/api/admin/rate-limits/limited-users",
            get(handlers::limited_users),
        )
        .route(
            "/api/admin/rate-limits/overrides",
            post(handlers::set_override),
        )
        .route("/api/admin/cleanup", post(handlers::run_cleanup))
        .route("/api/embeddings/brand", post(handlers::vectorize_brand))
        .route("/api/feedback", post(handlers::submit_feedback))
        .route("/api/rag/context", post(handlers::rag_context))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

/// Serve the API on `settings.server` until the task is cancelled
#[inline]
pub async fn serve(engine: Arc<RagEngine>) -> crate::Result<()> {
    let address = engine.settings().server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    info!("Listening on http://{}", address);
    axum::serve(listener, router(engine))
        .await
        .context("HTTP server stopped")?;
    Ok(())
}
