// src/handlers/session.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, ClientError},
    models::{section::RecordAnswerRequest, session::CreateSessionRequest},
    state::AppState,
    utils::jwt::Claims,
};

/// Opens a session for the authenticated student.
///
/// * Fetches exam content and proctoring policy from the content provider.
/// * Spawns the session actor; the session starts in `not_started`.
/// * Refuses a second session for the same exam (409).
pub async fn create_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let definition = state
        .content
        .fetch_exam(&payload.exam_id)
        .await
        .map_err(|e| match e {
            ClientError::Status(404) => AppError::NotFound("Exam not found".to_string()),
            other => other.into(),
        })?;

    let handle = state
        .registry
        .create(
            &claims.sub,
            definition,
            payload.native_shell,
            state.collaborators(),
        )
        .await?;

    let snapshot = handle.snapshot().await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// Full session snapshot, including countdown and open challenges.
pub async fn get_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let handle = state.registry.get(id, &claims.sub).await?;
    Ok(Json(handle.snapshot().await?))
}

/// Enters the exam: starts immediately inside the window, otherwise waits.
pub async fn start_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let handle = state.registry.get(id, &claims.sub).await?;
    handle.join().await?;
    Ok(Json(handle.snapshot().await?))
}

/// Saves an answer. Always 200; `accepted: false` when the write was dropped.
pub async fn record_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((id, question_id)): Path<(Uuid, String)>,
    Json(payload): Json<RecordAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let handle = state.registry.get(id, &claims.sub).await?;
    let outcome = handle.record_answer(question_id, payload.payload).await?;
    Ok(Json(outcome))
}

/// Requests a section lock; returns a challenge or `already_locked`.
pub async fn request_section_lock(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((id, section_id)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, AppError> {
    let handle = state.registry.get(id, &claims.sub).await?;
    Ok(Json(handle.request_section_lock(section_id).await?))
}

pub async fn request_final_submit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let handle = state.registry.get(id, &claims.sub).await?;
    Ok(Json(handle.request_final_submit().await?))
}

/// Violation log and risk profile of a session.
pub async fn get_violations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let handle = state.registry.get(id, &claims.sub).await?;
    Ok(Json(handle.violations().await?))
}
