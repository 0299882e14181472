//! HTTP server for the provider webhook.
//!
//! Two routes under `/webhooks/whatsapp`: the GET verification handshake and
//! the POST message intake, plus a `/health` probe. Content-level problems
//! never surface as 4xx/5xx; the provider always gets a 202 with a summary.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use tracing::info;

use super::webhook::WebhookService;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub webhook: Arc<WebhookService>,
}

/// Build the router for the webhook endpoints
pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/webhooks/whatsapp", get(verify).post(receive))
        .route("/health", get(health))
        .with_state(ctx)
}

/// Run the HTTP server until the process is stopped
pub async fn run(bind: &str, ctx: AppContext) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind webhook server to {}", bind))?;

    info!(%bind, "Webhook server listening");
    axum::serve(listener, router(ctx))
        .await
        .context("Webhook server failed")
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok", "service": "zapgasto" }))
}

/// GET verification handshake: echo the challenge on success, 403 otherwise.
/// Query keys are dotted (`hub.mode`), so a plain map extractor is used.
async fn verify(
    State(ctx): State<AppContext>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let mode = params.get("hub.mode").map(|s| s.as_str()).unwrap_or("");
    let token = params
        .get("hub.verify_token")
        .map(|s| s.as_str())
        .unwrap_or("");
    let challenge = params
        .get("hub.challenge")
        .map(|s| s.as_str())
        .unwrap_or("");

    if ctx.webhook.verify(mode, token) {
        (StatusCode::OK, challenge.to_string())
    } else {
        (StatusCode::FORBIDDEN, "Verification failed".to_string())
    }
}

/// POST intake: always 202 with the processing summary.
async fn receive(State(ctx): State<AppContext>, Json(payload): Json<Value>) -> impl IntoResponse {
    let report = ctx.webhook.process(&payload).await;
    info!(
        received = report.received,
        queued = report.queued,
        valid = report.valid,
        errors = report.errors.len(),
        "Webhook payload processed"
    );
    (StatusCode::ACCEPTED, Json(report))
}
