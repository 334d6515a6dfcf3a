//! Pipeline configuration.
//!
//! Built once at the request boundary from an untyped JSON body. Missing
//! fields take the defaults below; [`PipelineConfig::validated`] runs the
//! range checks so the orchestrator never sees an out-of-range value.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default video codec (H.265)
pub const DEFAULT_CODEC: &str = "libx265";
/// Default scale expression; `-2` keeps the aspect ratio with an even width
pub const DEFAULT_RESOLUTION: &str = "-2:480";
/// Default audio gain in dB
pub const DEFAULT_VOLUME_GAIN_DB: f64 = 5.0;
/// Default target video bitrate in kbit/s
pub const DEFAULT_BITRATE_KBPS: u32 = 1000;
/// Default CRF (Constant Rate Factor)
pub const DEFAULT_CRF: u8 = 28;

/// Highest CRF accepted by libx264/libx265
pub const MAX_CRF: u8 = 51;
/// Largest gain magnitude accepted, in dB
pub const MAX_VOLUME_GAIN_DB: f64 = 60.0;

static CODEC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]{0,31}$").expect("valid codec regex"));

static RESOLUTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(-1|-2|[1-9][0-9]{0,4}):(-1|-2|[1-9][0-9]{0,4})$").expect("valid resolution regex")
});

/// Requested transformations for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct PipelineConfig {
    /// Video codec (e.g., "libx265", "libx264")
    #[serde(default = "default_codec")]
    #[validate(custom(function = "validate_codec"))]
    pub codec: String,

    /// Scale expression `W:H`; one axis may be `-1`/`-2` to keep aspect
    #[serde(default = "default_resolution")]
    #[validate(custom(function = "validate_resolution"))]
    pub resolution: String,

    /// Audio gain in dB
    #[serde(default = "default_volume_gain", alias = "volume")]
    #[validate(custom(function = "validate_volume_gain"))]
    pub volume_gain: f64,

    /// Target video bitrate in kbit/s
    #[serde(default = "default_bitrate_kbps")]
    #[validate(range(min = 1, max = 100_000))]
    pub bitrate_kbps: u32,

    /// Constant Rate Factor (quality, 0-51, lower is better)
    #[serde(default = "default_crf")]
    #[validate(range(max = MAX_CRF))]
    pub crf: u8,

    /// Drop all container metadata on the final encode
    #[serde(default)]
    pub strip_metadata: bool,
}

fn default_codec() -> String {
    DEFAULT_CODEC.to_string()
}
fn default_resolution() -> String {
    DEFAULT_RESOLUTION.to_string()
}
fn default_volume_gain() -> f64 {
    DEFAULT_VOLUME_GAIN_DB
}
fn default_bitrate_kbps() -> u32 {
    DEFAULT_BITRATE_KBPS
}
fn default_crf() -> u8 {
    DEFAULT_CRF
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            codec: default_codec(),
            resolution: default_resolution(),
            volume_gain: default_volume_gain(),
            bitrate_kbps: default_bitrate_kbps(),
            crf: default_crf(),
            strip_metadata: false,
        }
    }
}

impl PipelineConfig {
    /// Run every range check, returning the config unchanged when it passes.
    pub fn validated(self) -> Result<Self, ValidationErrors> {
        self.validate()?;
        Ok(self)
    }
}

fn invalid(code: &'static str, message: impl Into<Cow<'static, str>>) -> ValidationError {
    ValidationError::new(code).with_message(message.into())
}

fn validate_codec(codec: &str) -> Result<(), ValidationError> {
    if CODEC_RE.is_match(codec) {
        Ok(())
    } else {
        Err(invalid("codec", format!("unsupported codec identifier '{}'", codec)))
    }
}

fn validate_resolution(resolution: &str) -> Result<(), ValidationError> {
    let Some(caps) = RESOLUTION_RE.captures(resolution) else {
        return Err(invalid(
            "resolution",
            format!("resolution '{}' must look like W:H", resolution),
        ));
    };

    // Both axes as sentinels leaves ffmpeg nothing to scale to.
    if caps[1].starts_with('-') && caps[2].starts_with('-') {
        return Err(invalid(
            "resolution",
            "at most one axis may be an aspect-preserving sentinel",
        ));
    }
    Ok(())
}

fn validate_volume_gain(gain: f64) -> Result<(), ValidationError> {
    if gain.is_finite() && gain.abs() <= MAX_VOLUME_GAIN_DB {
        Ok(())
    } else {
        Err(invalid(
            "volume_gain",
            format!("volume gain must be within ±{} dB", MAX_VOLUME_GAIN_DB),
        ))
    }
}
