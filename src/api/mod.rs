//! HTTP API: webhook ingress, health and stats endpoints

pub mod health;
pub mod webhooks;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;

use crate::server::AppState;

/// Global request body limit
const BODY_LIMIT: usize = 50 * 1024 * 1024;

/// Build the full API router
pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(webhooks::routes(&state))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(axum::Extension(state))
}
