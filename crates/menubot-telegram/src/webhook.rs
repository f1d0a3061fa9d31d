//! HTTP endpoints: Telegram's webhook plus small admin/diagnostic routes.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use menubot_core::{
    config::WEBHOOK_PATH,
    security::{verify_webhook_secret, SECRET_TOKEN_HEADER},
};

use crate::router::AppState;

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route(WEBHOOK_PATH, post(receive_update).get(webhook_probe))
        .route("/set_webhook", get(set_webhook))
        .route("/delete_webhook", get(delete_webhook))
        .route("/info", get(info))
        .with_state(state)
}

async fn index() -> &'static str {
    "Telegram menu bot is running! 🤖"
}

async fn webhook_probe() -> &'static str {
    "Telegram bot webhook is working! ✅"
}

/// Telegram retries any non-2xx delivery, so once the caller is verified the
/// answer is always `200`, whatever happened to the update.
async fn receive_update(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let presented = headers
        .get(SECRET_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    if !verify_webhook_secret(state.webhook_secret.as_deref(), presented) {
        tracing::warn!("webhook call with missing or wrong secret token");
        return status(StatusCode::UNAUTHORIZED, "unauthorized");
    }

    state.processor.process_bytes(&body).await;
    Json(json!({"status": "ok"})).into_response()
}

async fn set_webhook(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if !admin_allowed(&state, &headers) {
        return status(StatusCode::UNAUTHORIZED, "unauthorized");
    }
    let Some(url) = public_webhook_url(&state, &headers) else {
        return error(
            StatusCode::BAD_REQUEST,
            "cannot determine the public URL; set PUBLIC_URL (or WEBHOOK_SECRET to allow the Host header)",
        );
    };

    // Replace, don't stack: clear whatever was registered before.
    if let Err(e) = state.registrar.delete_webhook().await {
        tracing::warn!(error = %e, "deleteWebhook before setWebhook failed");
    }
    match state
        .registrar
        .set_webhook(&url, state.webhook_secret.as_deref())
        .await
    {
        Ok(()) => {
            tracing::info!(webhook_url = %url, "webhook registered");
            Json(json!({"status": "success", "webhook_url": url})).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "setWebhook failed");
            error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

async fn delete_webhook(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if !admin_allowed(&state, &headers) {
        return status(StatusCode::UNAUTHORIZED, "unauthorized");
    }
    match state.registrar.delete_webhook().await {
        Ok(()) => {
            tracing::info!("webhook deleted");
            Json(json!({"status": "success"})).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "deleteWebhook failed");
            error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

async fn info(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let uptime_secs = Utc::now()
        .signed_duration_since(state.started_at)
        .num_seconds()
        .max(0);
    Json(json!({
        "bot": "Telegram menu bot",
        "status": "active",
        "features": ["Menu navigation", "Echo messages", "Webhook support"],
        "endpoints": {
            "webhook": WEBHOOK_PATH,
            "set_webhook": "/set_webhook",
            "delete_webhook": "/delete_webhook",
            "info": "/info",
        },
        "menu_states": state.processor.menu().state_count(),
        "sessions": state.processor.sessions().len().await,
        "started_at": state.started_at.to_rfc3339(),
        "uptime_secs": uptime_secs,
    }))
}

/// Admin routes take the webhook secret in the same header Telegram uses,
/// never in the query string (which ends up in access logs).
fn admin_allowed(state: &AppState, headers: &HeaderMap) -> bool {
    let presented = headers
        .get(SECRET_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    verify_webhook_secret(state.webhook_secret.as_deref(), presented)
}

/// `PUBLIC_URL` first. The `Host` header is only trusted on authenticated
/// calls: without a secret anyone could point the webhook elsewhere.
fn public_webhook_url(state: &AppState, headers: &HeaderMap) -> Option<String> {
    if let Some(base) = &state.public_url {
        return Some(format!("{base}{WEBHOOK_PATH}"));
    }
    state.webhook_secret.as_ref()?;
    let host = headers.get(header::HOST)?.to_str().ok()?.trim();
    if host.is_empty() {
        return None;
    }
    Some(format!("https://{host}{WEBHOOK_PATH}"))
}

fn status(code: StatusCode, status: &str) -> Response {
    (code, Json(json!({"status": status}))).into_response()
}

fn error(code: StatusCode, message: &str) -> Response {
    (code, Json(json!({"status": "error", "message": message}))).into_response()
}
