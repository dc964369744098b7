//! Axum router setup.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::post;
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::auth::auth_middleware;
use crate::config::ServerConfig;
use crate::handlers::{blobs, sync, users};
use crate::storage::Storage;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(storage: Storage, config: ServerConfig) -> Router {
    let max_body = config.max_body_bytes();
    let state = AppState {
        storage,
        config: Arc::new(config),
    };

    Router::new()
        .route("/api/user/register", post(users::register))
        .route("/api/user/login", post(users::login))
        .route("/api/user/test", post(users::status))
        .route("/api/items/sync", post(sync::sync))
        .route("/api/blobs/upload", post(blobs::upload))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(max_body))
        .layer(RequestBodyLimitLayer::new(max_body))
        .with_state(state)
}
