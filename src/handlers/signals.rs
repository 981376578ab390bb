// src/handlers/signals.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    error::AppError, models::violation::SignalEnvelope, state::AppState, utils::jwt::Claims,
};

/// Ingests one raw proctoring signal from the browser or the native shell.
///
/// Signals arriving after the session ended are accepted and ignored.
pub async fn ingest_signal(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(envelope): Json<SignalEnvelope>,
) -> Result<impl IntoResponse, AppError> {
    let handle = state.registry.get(id, &claims.sub).await?;
    Ok(Json(handle.ingest_signal(envelope).await?))
}
