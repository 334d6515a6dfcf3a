//! Record store error types.

use thiserror::Error;

use vpipe_models::VideoId;

/// Result type for record store operations.
pub type RecordResult<T> = Result<T, RecordError>;

/// Errors that can occur while reading or writing video records.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Video {0} not found")]
    NotFound(VideoId),

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Record file is corrupt: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RecordError {
    pub fn invalid_filename(msg: impl Into<String>) -> Self {
        Self::InvalidFilename(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RecordError::NotFound(_))
    }
}
