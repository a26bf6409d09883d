//! HTTP server wiring: routes, middleware, and listener setup.

use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers;
use crate::config::Config;
use crate::pipeline::Pipeline;
use crate::store::JobStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    pub store: Arc<JobStore>,
    pub config: Arc<Config>,
}

/// Build the router. Kept separate from the listener so tests can drive it
/// with `tower::ServiceExt::oneshot`.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    // Leave multipart framing headroom above the payload cap; oversized
    // media still gets the 413 from submission validation.
    let body_limit = state.config.ingest.max_upload_bytes as usize + 1024 * 1024;

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/analyses", post(handlers::submit_url))
        .route("/api/analyses/upload", post(handlers::submit_upload))
        .route("/api/analyses/:id", get(handlers::get_job))
        .route("/api/analyses/:id/summary", post(handlers::generate_summary))
        .route(
            "/api/analyses/:id/topics/:topic_id/flashcards",
            post(handlers::generate_flashcards),
        )
        .route("/api/analyses/:id/materialize", post(handlers::materialize))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
}

/// Bind and serve until the process exits.
pub async fn serve(state: AppState) -> Result<()> {
    let addr = format!(
        "{}:{}",
        state.config.server.host, state.config.server.port
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
