//! Health and discovery endpoints

use std::sync::Arc;

use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::Serialize;

use crate::server::AppState;

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Advertised webhook URLs
#[derive(Debug, Serialize)]
struct WebhookUrls {
    principal: String,
    callback: String,
}

/// Simple health check (for load balancers)
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// The URLs gateways and the helpdesk should be pointed at
async fn webhook_urls(Extension(state): Extension<Arc<AppState>>) -> Json<WebhookUrls> {
    Json(WebhookUrls {
        principal: state.config.principal_url(),
        callback: state.config.callback_url(),
    })
}

/// Create health routes
pub fn routes() -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/webhook-url", get(webhook_urls))
}
