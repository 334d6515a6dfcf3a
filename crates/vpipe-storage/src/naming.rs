//! Artifact namer.
//!
//! Names look like `{stage}_{base}_{millis}{ext}`. The millisecond clock
//! component is the only thing separating two runs over the same source:
//! two calls for the same filename and stage within one millisecond return
//! the same name. Callers that can race on one prefix must serialize (the
//! worker does, with a per-video lock).

use chrono::{DateTime, Utc};

use vpipe_models::{split_extension, ArtifactStage, MAX_FILENAME_LEN};

/// Name an artifact of `stage` derived from `original_filename`, using the wall clock.
pub fn artifact_name(original_filename: &str, stage: ArtifactStage) -> String {
    artifact_name_at(original_filename, stage, Utc::now())
}

/// Name an artifact using an explicit timestamp.
pub fn artifact_name_at(
    original_filename: &str,
    stage: ArtifactStage,
    at: DateTime<Utc>,
) -> String {
    let (base, ext) = split_extension(original_filename);
    let name = format!("{}_{}_{}", stage, base, at.timestamp_millis());
    if name.len() + ext.len() <= MAX_FILENAME_LEN {
        return format!("{}{}", name, ext);
    }

    // Too long for the record column: shorten the base, keep tag, clock and extension.
    let suffix = format!("_{}{}", at.timestamp_millis(), ext);
    let prefix = format!("{}_", stage);
    let room = MAX_FILENAME_LEN.saturating_sub(prefix.len() + suffix.len());
    format!("{}{}{}", prefix, truncate_on_char_boundary(base, room), suffix)
}

fn truncate_on_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
