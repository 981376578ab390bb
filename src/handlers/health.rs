// src/handlers/health.rs

use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;

use crate::session::SessionRegistry;

/// Liveness check.
pub async fn health(State(registry): State<SessionRegistry>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "sessions": registry.count().await,
    }))
}
