//! Structured run logging.

use tracing::{error, info, warn, Span};

use vpipe_models::VideoId;

/// Logger for one operation on one video.
///
/// Every line carries `video_id` and `operation`, so a run can be followed
/// through the log with a single filter.
#[derive(Debug, Clone)]
pub struct RunLogger {
    video_id: VideoId,
    operation: &'static str,
}

impl RunLogger {
    pub fn new(video_id: VideoId, operation: &'static str) -> Self {
        Self {
            video_id,
            operation,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            video_id = %self.video_id,
            operation = self.operation,
            "Run started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            video_id = %self.video_id,
            operation = self.operation,
            "Run progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            video_id = %self.video_id,
            operation = self.operation,
            "Run warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            video_id = %self.video_id,
            operation = self.operation,
            "Run failed: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            video_id = %self.video_id,
            operation = self.operation,
            "Run completed: {}", message
        );
    }

    pub fn video_id(&self) -> VideoId {
        self.video_id
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Span to instrument the whole run with.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "run",
            video_id = %self.video_id,
            operation = self.operation
        )
    }
}
