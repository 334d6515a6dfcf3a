//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Storage, transcoder and retention settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root directory of the blob store
    pub storage_root: PathBuf,
    /// JSON record file; `None` keeps records in memory
    pub records_path: Option<PathBuf>,
    /// FFmpeg binary, as a path or a name on PATH
    pub ffmpeg_path: String,
    /// Per-invocation transcoder timeout
    pub ffmpeg_timeout: Duration,
    /// Reclaim a video's lineage once its last download completes
    pub reclaim_after_download: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("./data"),
            records_path: Some(PathBuf::from("./data/videos.json")),
            ffmpeg_path: "ffmpeg".to_string(),
            ffmpeg_timeout: Duration::from_secs(3600), // 1 hour
            reclaim_after_download: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            storage_root: std::env::var("STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_root),
            records_path: match std::env::var("RECORDS_PATH") {
                Ok(path) if path.trim().is_empty() => None,
                Ok(path) => Some(PathBuf::from(path)),
                Err(_) => defaults.records_path,
            },
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),
            ffmpeg_timeout: Duration::from_secs(
                std::env::var("FFMPEG_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            reclaim_after_download: std::env::var("RECLAIM_AFTER_DOWNLOAD")
                .ok()
                .and_then(|s| parse_bool(&s))
                .unwrap_or(true),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
