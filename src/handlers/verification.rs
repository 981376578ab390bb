// src/handlers/verification.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    models::{session::UpdateChallengeRequest, submission::Target},
    state::AppState,
    utils::jwt::Claims,
};

/// Stores what the learner has typed so far.
pub async fn update_challenge(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((id, target)): Path<(Uuid, String)>,
    Json(payload): Json<UpdateChallengeRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let handle = state.registry.get(id, &claims.sub).await?;
    let challenge = handle
        .update_challenge(Target::parse(&target), payload.entered)
        .await?;
    Ok(Json(challenge))
}

/// Confirms the entered code.
///
/// A wrong code is not an HTTP error: the response carries
/// `outcome: "mismatch"` and the challenge with `error: true`.
/// A failed submission returns 502 and the challenge stays open for a retry.
pub async fn confirm_challenge(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((id, target)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, AppError> {
    let handle = state.registry.get(id, &claims.sub).await?;
    let outcome = handle.confirm_challenge(Target::parse(&target)).await?;
    Ok(Json(outcome))
}

pub async fn cancel_challenge(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((id, target)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, AppError> {
    let handle = state.registry.get(id, &claims.sub).await?;
    if handle.cancel_challenge(Target::parse(&target)).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!(
            "No active verification challenge for '{}'",
            target
        )))
    }
}
