//! Blob key layout.
//!
//! Every file a video owns lives under a prefix derived from its id, so a
//! video's lineage can be reclaimed without touching anyone else's files:
//!
//! - `uploads/{id}/{original_filename}`
//! - `processed/{id}/{artifact_name}`

use vpipe_models::VideoId;

pub const UPLOADS_DIR: &str = "uploads";
pub const PROCESSED_DIR: &str = "processed";

pub fn upload_prefix(id: VideoId) -> String {
    format!("{}/{}", UPLOADS_DIR, id)
}

pub fn processed_prefix(id: VideoId) -> String {
    format!("{}/{}", PROCESSED_DIR, id)
}

pub fn upload_key(id: VideoId, filename: &str) -> String {
    format!("{}/{}", upload_prefix(id), filename)
}

pub fn processed_key(id: VideoId, artifact_name: &str) -> String {
    format!("{}/{}", processed_prefix(id), artifact_name)
}

/// Both prefixes that make up a video's lineage.
pub fn lineage_prefixes(id: VideoId) -> [String; 2] {
    [upload_prefix(id), processed_prefix(id)]
}
