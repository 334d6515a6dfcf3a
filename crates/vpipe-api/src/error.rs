//! API error types.

use std::sync::atomic::{AtomicBool, Ordering};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use vpipe_media::TransformKind;
use vpipe_models::VideoId;
use vpipe_worker::WorkerError;

pub type ApiResult<T> = Result<T, ApiError>;

static HIDE_INTERNAL_DETAILS: AtomicBool = AtomicBool::new(false);

/// Replace internal error details with generic text in responses.
///
/// Set once at startup from [`ApiConfig::is_production`](crate::ApiConfig::is_production).
pub fn hide_internal_details(hide: bool) {
    HIDE_INTERNAL_DETAILS.store(hide, Ordering::Relaxed);
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Video not found")]
    VideoNotFound(VideoId),

    #[error("Processed video not found")]
    ProcessedVideoNotFound(VideoId),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Transform failed: {detail}")]
    TransformFailed { stage: TransformKind, detail: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::VideoNotFound(_) | ApiError::ProcessedVideoNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TransformFailed { .. } | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::VideoNotFound(_) => "video_not_found",
            ApiError::ProcessedVideoNotFound(_) => "processed_video_not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Validation(_) => "validation_error",
            ApiError::Conflict(_) => "conflict",
            ApiError::TransformFailed { .. } => "transform_failed",
            ApiError::Internal(_) => "internal_error",
        }
    }

    /// Client-facing detail text.
    fn public_detail(&self, hide_internal: bool) -> String {
        match self {
            ApiError::Internal(_) if hide_internal => "An internal error occurred".to_string(),
            ApiError::TransformFailed { stage, .. } if hide_internal => {
                format!("Processing failed at the {} stage", stage)
            }
            _ => self.to_string(),
        }
    }
}

impl From<WorkerError> for ApiError {
    fn from(e: WorkerError) -> Self {
        match e {
            WorkerError::Validation(msg) => ApiError::Validation(msg),
            WorkerError::NotFound(id) => ApiError::VideoNotFound(id),
            WorkerError::NoProcessedArtifact(id) => ApiError::ProcessedVideoNotFound(id),
            WorkerError::PipelineFailed { stage, source } => ApiError::TransformFailed {
                stage,
                detail: source.to_string(),
            },
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let detail = self.public_detail(HIDE_INTERNAL_DETAILS.load(Ordering::Relaxed));

        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        }

        let body = ErrorResponse {
            detail,
            code: Some(self.code().to_string()),
        };

        (status, Json(body)).into_response()
    }
}
