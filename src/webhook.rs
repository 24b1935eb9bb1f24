//! Facebook Messenger webhook server for capturing the recipient PSID

use crate::config::Settings;
use crate::db::JobStore;
use crate::error::Result;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

/// Shared state for webhook handlers
#[derive(Clone)]
pub struct AppState {
    /// Store for captured PSIDs
    pub store: Arc<JobStore>,
    /// Runtime settings
    pub settings: Arc<Settings>,
}

/// Error response carrying an HTTP status and detail message
pub struct AppError {
    status: StatusCode,
    detail: String,
}

impl AppError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "detail": self.detail }));
        (self.status, body).into_response()
    }
}

/// Build the axum router with all webhook routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook", get(verify_webhook))
        .route("/webhook", post(receive_webhook))
        .with_state(state)
}

/// Bind and serve the webhook server until shutdown.
pub async fn serve(settings: Settings, store: JobStore) -> Result<()> {
    let bind = settings.webhook_bind.clone();
    let state = AppState {
        store: Arc::new(store),
        settings: Arc::new(settings),
    };
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!("Webhook server listening on {}", bind);
    axum::serve(listener, router).await?;
    Ok(())
}

/// GET /health — liveness probe
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /webhook — Facebook webhook verification endpoint
async fn verify_webhook(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> std::result::Result<String, AppError> {
    let mode = params.get("hub.mode").map(String::as_str);
    let verify_token = params.get("hub.verify_token").map(String::as_str);
    let challenge = params.get("hub.challenge").cloned().unwrap_or_default();

    if mode != Some("subscribe") {
        return Err(AppError::new(StatusCode::BAD_REQUEST, "Invalid hub.mode"));
    }

    let Some(ref expected) = state.settings.facebook_webhook_verify_token else {
        return Err(AppError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "FACEBOOK_WEBHOOK_VERIFY_TOKEN is not configured",
        ));
    };

    if verify_token != Some(expected.as_str()) {
        return Err(AppError::new(StatusCode::FORBIDDEN, "Verify token mismatch"));
    }

    tracing::info!("Webhook verification completed successfully.");
    Ok(challenge)
}

/// POST /webhook — receive Messenger events and capture sender PSIDs
async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> std::result::Result<Json<serde_json::Value>, AppError> {
    let signature = headers
        .get("X-Hub-Signature-256")
        .and_then(|v| v.to_str().ok());
    validate_signature(
        state.settings.facebook_app_secret.as_deref(),
        signature,
        &body,
    )?;

    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::new(StatusCode::BAD_REQUEST, format!("Invalid JSON payload: {}", e)))?;

    let mut captured: Vec<String> = Vec::new();
    for event in messaging_events(&payload) {
        let sender_id = event
            .pointer("/sender/id")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or("");
        if sender_id.is_empty() {
            continue;
        }
        state.store.upsert_facebook_psid(sender_id).map_err(|e| {
            AppError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;
        captured.push(sender_id.to_string());
    }

    captured.sort();
    captured.dedup();
    if !captured.is_empty() {
        tracing::info!("Captured PSID(s): {}", captured.join(", "));
    }

    Ok(Json(serde_json::json!({
        "ok": true,
        "captured_psids": captured,
    })))
}

/// Validate the `X-Hub-Signature-256` header when an app secret is configured.
fn validate_signature(
    app_secret: Option<&str>,
    signature_header: Option<&str>,
    raw_body: &[u8],
) -> std::result::Result<(), AppError> {
    let Some(secret) = app_secret else {
        return Ok(());
    };

    let Some(received) = signature_header.and_then(|h| h.strip_prefix("sha256=")) else {
        return Err(AppError::new(
            StatusCode::FORBIDDEN,
            "Missing or invalid X-Hub-Signature-256 header",
        ));
    };

    let received_bytes = hex::decode(received)
        .map_err(|_| AppError::new(StatusCode::FORBIDDEN, "Signature mismatch"))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| {
        AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "Invalid app secret")
    })?;
    mac.update(raw_body);
    mac.verify_slice(&received_bytes)
        .map_err(|_| AppError::new(StatusCode::FORBIDDEN, "Signature mismatch"))
}

/// Extract messaging-like events from a webhook payload.
fn messaging_events(payload: &serde_json::Value) -> Vec<&serde_json::Value> {
    let mut events = Vec::new();
    let entries = payload
        .get("entry")
        .and_then(|v| v.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default();

    for entry in entries {
        for key in ["messaging", "standby"] {
            if let Some(items) = entry.get(key).and_then(|v| v.as_array()) {
                events.extend(items.iter().filter(|item| item.is_object()));
            }
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_signature_accepted() {
        let body = br#"{"entry": []}"#;
        let header = sign("app-secret", body);
        assert!(validate_signature(Some("app-secret"), Some(&header), body).is_ok());
    }

    #[test]
    fn test_signature_rejected_on_mismatch() {
        let body = br#"{"entry": []}"#;
        let header = sign("other-secret", body);
        assert!(validate_signature(Some("app-secret"), Some(&header), body).is_err());
    }

    #[test]
    fn test_signature_rejected_when_header_missing() {
        assert!(validate_signature(Some("app-secret"), None, b"{}").is_err());
        assert!(validate_signature(Some("app-secret"), Some("md5=abc"), b"{}").is_err());
    }

    #[test]
    fn test_signature_skipped_without_secret() {
        assert!(validate_signature(None, None, b"{}").is_ok());
    }

    #[test]
    fn test_messaging_events_extraction() {
        let payload = json!({
            "entry": [
                { "messaging": [ { "sender": { "id": "111" } } ] },
                { "standby": [ { "sender": { "id": "222" } }, "not-an-object" ] },
                { "other": [ { "sender": { "id": "333" } } ] },
            ]
        });

        let events = messaging_events(&payload);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].pointer("/sender/id").unwrap(), "111");
        assert_eq!(events[1].pointer("/sender/id").unwrap(), "222");
    }

    #[test]
    fn test_messaging_events_empty_payload() {
        assert!(messaging_events(&json!({})).is_empty());
        assert!(messaging_events(&json!({"entry": "bad"})).is_empty());
    }
}
