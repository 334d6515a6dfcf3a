//! Shared data models for the vpipe video pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Video records and their identifiers
//! - Validated pipeline configuration
//! - Artifact stage tags
//! - Upload filename sanitizing

pub mod artifact;
pub mod config;
pub mod utils;
pub mod video;

// Re-export common types
pub use artifact::ArtifactStage;
pub use config::{
    PipelineConfig, DEFAULT_BITRATE_KBPS, DEFAULT_CODEC, DEFAULT_CRF, DEFAULT_RESOLUTION,
    DEFAULT_VOLUME_GAIN_DB, MAX_CRF,
};
pub use utils::{
    sanitize_filename, split_extension, truncate_keeping_extension, FilenameError, MAX_FILENAME_LEN,
};
pub use video::{VideoId, VideoRecord};
