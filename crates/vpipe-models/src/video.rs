//! Video record models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Store-assigned identifier of an uploaded video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(pub i64);

impl VideoId {
    /// Get the inner integer.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for VideoId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl FromStr for VideoId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Self)
    }
}

/// Persisted association between a video and its filenames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    /// Unique video ID
    pub id: VideoId,

    /// Sanitized name of the uploaded blob
    pub original_filename: String,

    /// Latest completed artifact, if any run has finished
    #[serde(default)]
    pub processed_filename: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl VideoRecord {
    /// Create a record with no processed artifact.
    pub fn new(id: VideoId, original_filename: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            original_filename: original_filename.into(),
            processed_filename: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True once a run has completed for this record.
    pub fn is_processed(&self) -> bool {
        self.processed_filename.is_some()
    }
}
