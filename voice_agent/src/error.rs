use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use llm_core::LlmError;
use serde::Serialize;
use thiserror::Error;
use tts_core::{PlaybackError, SessionError};

/// Why one utterance failed. Every variant ends that utterance only.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("token source failed: {0}")]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error("playback task failed: {0}")]
    Worker(String),
}

/// Errors returned by the HTTP control surface
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Pipeline queue is full")]
    QueueFull,

    #[error("Internal server error: {0}")]
    InternalError(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::QueueFull => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Pipeline queue is full, try again later".to_string(),
            ),
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}
