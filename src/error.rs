// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::models::{session::SessionState, submission::Target};

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    // 500 Internal Server Error
    #[error("internal server error: {0}")]
    InternalServerError(String),

    // 400 Bad Request
    #[error("bad request: {0}")]
    BadRequest(String),

    // 401 Unauthorized
    #[error("unauthorized: {0}")]
    AuthError(String),

    // 404 Not Found
    #[error("not found: {0}")]
    NotFound(String),

    // 409 Conflict (invalid state transition, duplicate session)
    #[error("conflict: {0}")]
    Conflict(String),

    // 502 Bad Gateway (upstream submission/content API failed, retryable)
    #[error("bad gateway: {0}")]
    BadGateway(String),
}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::BadGateway(msg) => {
                tracing::warn!("Upstream failure: {}", msg);
                (StatusCode::BAD_GATEWAY, msg)
            }
        };
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

/// Attempted mutation against an invalid state.
/// A contract violation by the caller; never crashes the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("cannot {action} while session is {state}")]
    InvalidTransition {
        state: SessionState,
        action: &'static str,
    },

    #[error("section '{0}' is locked")]
    SectionLocked(String),

    #[error("unknown section '{0}'")]
    UnknownSection(String),

    #[error("unknown question '{0}'")]
    UnknownQuestion(String),

    #[error("no active verification challenge for '{0}'")]
    NoActiveChallenge(Target),

    #[error("exam window is closed")]
    WindowClosed,

    #[error("exam window has not opened yet")]
    WindowNotOpen,
}

/// Failure talking to an external collaborator over HTTP.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("{0}")]
    Unavailable(String),
}

/// Error returned by controller operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    State(#[from] StateError),

    /// Submission path: surfaced to the learner, who may retry.
    #[error("submission failed: {0}")]
    Network(#[from] ClientError),
}

impl From<StateError> for AppError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::UnknownSection(_) | StateError::UnknownQuestion(_) => {
                AppError::NotFound(err.to_string())
            }
            _ => AppError::Conflict(err.to_string()),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::State(state) => state.into(),
            SessionError::Network(client) => AppError::BadGateway(format!(
                "Submission could not be delivered, please retry: {}",
                client
            )),
        }
    }
}

impl From<ClientError> for AppError {
    fn from(err: ClientError) -> Self {
        AppError::BadGateway(err.to_string())
    }
}
