//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::server::routes::{
    generate_from_url_handler, generate_handler, health_handler, upload_image_handler,
    webhook_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub config: Arc<Config>,
}

/// Build the axum application with all routes and middleware.
pub fn build_app(pool: PgPool, config: Config) -> Router {
    let state = AppState {
        db_pool: pool,
        config: Arc::new(config),
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/workflow-webhook", post(webhook_handler))
        .route("/api/content/generate", post(generate_handler))
        .route("/api/content/generate-from-url", post(generate_from_url_handler))
        .route("/api/images", post(upload_image_handler))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
