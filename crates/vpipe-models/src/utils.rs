//! Filename helpers shared by the upload path and the artifact namer.

use thiserror::Error;

/// Maximum stored filename length (the record column is bounded).
pub const MAX_FILENAME_LEN: usize = 150;

/// Errors that can occur while sanitizing an uploaded filename.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilenameError {
    #[error("No selected file")]
    Empty,

    #[error("Filename '{0}' has no usable characters")]
    NothingLeft(String),
}

/// Reduce an uploaded filename to a safe, flat ASCII name.
///
/// Path separators become spaces, runs of whitespace become `_`, anything
/// outside `[A-Za-z0-9_.-]` is dropped, and leading/trailing `.`/`_` are
/// stripped. Names longer than [`MAX_FILENAME_LEN`] are shortened from the
/// base, keeping the extension.
pub fn sanitize_filename(raw: &str) -> Result<String, FilenameError> {
    if raw.trim().is_empty() {
        return Err(FilenameError::Empty);
    }

    let flattened: String = raw
        .chars()
        .filter(|c| c.is_ascii())
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == '_');

    if cleaned.is_empty() {
        return Err(FilenameError::NothingLeft(raw.to_string()));
    }

    Ok(truncate_keeping_extension(cleaned, MAX_FILENAME_LEN))
}

/// Split `name` into base and extension (with the leading dot).
///
/// A dot in first position does not start an extension, so `.env` has none.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

/// Shorten `name` to at most `max` bytes by trimming the base.
pub fn truncate_keeping_extension(name: &str, max: usize) -> String {
    if name.len() <= max {
        return name.to_string();
    }
    let (base, ext) = split_extension(name);
    if ext.len() >= max {
        return name[..max].to_string();
    }
    // Sanitized names are ASCII, so byte slicing is on char boundaries.
    format!("{}{}", &base[..max - ext.len()], ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_plain_name() {
        assert_eq!(sanitize_filename("clip.mp4").unwrap(), "clip.mp4");
    }

    #[test]
    fn test_sanitize_strips_paths_and_spaces() {
        assert_eq!(
            sanitize_filename("../../etc/my holiday.mp4").unwrap(),
            "etc_my_holiday.mp4"
        );
        assert_eq!(sanitize_filename("C:\\videos\\a b.mov").unwrap(), "C_videos_a_b.mov");
    }

    #[test]
    fn test_sanitize_drops_non_ascii() {
        assert_eq!(sanitize_filename("vidéo ünïcode.mkv").unwrap(), "vido_ncode.mkv");
    }

    #[test]
    fn test_sanitize_rejects_empty() {
        assert_eq!(sanitize_filename("   "), Err(FilenameError::Empty));
        assert!(matches!(
            sanitize_filename("../.."),
            Err(FilenameError::NothingLeft(_))
        ));
    }

    #[test]
    fn test_sanitize_truncates_long_names() {
        let long = format!("{}.mp4", "a".repeat(300));
        let name = sanitize_filename(&long).unwrap();
        assert_eq!(name.len(), MAX_FILENAME_LEN);
        assert!(name.ends_with(".mp4"));
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("clip.mp4"), ("clip", ".mp4"));
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_extension("noext"), ("noext", ""));
        assert_eq!(split_extension(".env"), (".env", ""));
    }
}
