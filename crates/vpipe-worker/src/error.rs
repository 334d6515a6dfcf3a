//! Worker error types.

use thiserror::Error;

use vpipe_media::{MediaError, TransformKind};
use vpipe_models::{FilenameError, VideoId};
use vpipe_records::RecordError;
use vpipe_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Video {0} not found")]
    NotFound(VideoId),

    #[error("Processed video for {0} not found")]
    NoProcessedArtifact(VideoId),

    #[error("Pipeline stage {stage} failed: {source}")]
    PipelineFailed {
        stage: TransformKind,
        #[source]
        source: MediaError,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Record store error: {0}")]
    Records(RecordError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),
}

impl WorkerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn pipeline_failed(stage: TransformKind, source: MediaError) -> Self {
        Self::PipelineFailed { stage, source }
    }

    /// True for both "no such video" and "nothing processed yet".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            WorkerError::NotFound(_) | WorkerError::NoProcessedArtifact(_)
        )
    }

    /// Stage that aborted the run, if this is a pipeline failure.
    pub fn failed_stage(&self) -> Option<TransformKind> {
        match self {
            WorkerError::PipelineFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

impl From<RecordError> for WorkerError {
    fn from(e: RecordError) -> Self {
        match e {
            RecordError::NotFound(id) => WorkerError::NotFound(id),
            RecordError::InvalidFilename(msg) => WorkerError::Validation(msg),
            other => WorkerError::Records(other),
        }
    }
}

impl From<FilenameError> for WorkerError {
    fn from(e: FilenameError) -> Self {
        WorkerError::Validation(e.to_string())
    }
}

impl From<validator::ValidationErrors> for WorkerError {
    fn from(e: validator::ValidationErrors) -> Self {
        WorkerError::Validation(e.to_string())
    }
}
