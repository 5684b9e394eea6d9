//! Webhook ingress
//!
//! Both webhooks only validate, unwrap and enqueue: processing happens in the
//! queue consumers, so gateways and the helpdesk get an answer immediately
//! and never see downstream errors.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::queue::{SUBJECT_CALLBACK, SUBJECT_PRINCIPAL};
use crate::server::AppState;

/// Webhook routes get a larger body limit than the rest of the API
const WEBHOOK_BODY_LIMIT: usize = 500 * 1024 * 1024;

/// Some gateways wrap the real payload under a top-level `body` key
fn unwrap_body(payload: Value) -> Value {
    match payload {
        Value::Object(mut map) if map.contains_key("body") => {
            map.remove("body").unwrap_or(Value::Null)
        }
        other => other,
    }
}

async fn enqueue(state: &AppState, subject: &'static str, payload: Value) -> impl IntoResponse {
    let payload = unwrap_body(payload);
    let bytes = match serde_json::to_vec(&payload) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "failed to serialize webhook payload");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "accepted": false })),
            );
        }
    };

    match state.queue.publish(subject, bytes).await {
        Ok(()) => {
            debug!(subject, "webhook enqueued");
            (
                StatusCode::OK,
                Json(json!({ "accepted": true, "queued": subject })),
            )
        }
        Err(e) => {
            error!(subject, error = %e, "failed to enqueue webhook");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "accepted": false })),
            )
        }
    }
}

/// Gateway (provider) webhook
async fn ingest_principal(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    enqueue(&state, SUBJECT_PRINCIPAL, payload).await
}

/// Helpdesk callback webhook
async fn ingest_callback(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    enqueue(&state, SUBJECT_CALLBACK, payload).await
}

/// Current credit-ledger counters, for operational inspection
async fn ticket_stats(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    Json(state.ledger.snapshot())
}

/// Create webhook routes under the configured webhook name
pub fn routes(state: &AppState) -> Router {
    let name = &state.config.webhook_name;
    Router::new()
        .route(&format!("/{name}"), post(ingest_principal))
        .route(&format!("/{name}/callback"), post(ingest_callback))
        .route(&format!("/{name}/ticket-stats"), get(ticket_stats))
        .layer(DefaultBodyLimit::max(WEBHOOK_BODY_LIMIT))
}
