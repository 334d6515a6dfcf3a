//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

use crate::transform::TransformKind;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while invoking the transcoder.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found: {0}")]
    FfmpegNotFound(String),

    #[error("{stage} stage failed with {}", describe_exit(.exit_code))]
    TransformFailed {
        stage: TransformKind,
        exit_code: Option<i32>,
        stderr: Option<String>,
    },

    #[error("{stage} stage timed out after {secs} seconds")]
    Timeout { stage: TransformKind, secs: u64 },

    #[error("Input file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

impl MediaError {
    /// Create a transform failure error.
    pub fn transform_failed(
        stage: TransformKind,
        exit_code: Option<i32>,
        stderr: Option<String>,
    ) -> Self {
        Self::TransformFailed {
            stage,
            exit_code,
            stderr,
        }
    }

    /// Create an invalid arguments error.
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments(message.into())
    }

    /// Exit code reported by the tool, when it ran to completion.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            MediaError::TransformFailed { exit_code, .. } => *exit_code,
            _ => None,
        }
    }

    /// Stage the error belongs to, when it came from a tool run.
    pub fn stage(&self) -> Option<TransformKind> {
        match self {
            MediaError::TransformFailed { stage, .. } | MediaError::Timeout { stage, .. } => {
                Some(*stage)
            }
            _ => None,
        }
    }
}
