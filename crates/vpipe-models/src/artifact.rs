//! Artifact stage tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag embedded in every artifact filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStage {
    /// Output still being written by the transcoder
    Temp,
    /// Codec re-encode
    Processed,
    /// Last stage of a multi-stage pipeline
    FinalProcessed,
    /// Bitrate/CRF re-encode
    FinalEncoded,
    /// Resolution change
    Lowres,
    /// Audio gain
    Boosted,
}

impl ArtifactStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactStage::Temp => "temp",
            ArtifactStage::Processed => "processed",
            ArtifactStage::FinalProcessed => "final_processed",
            ArtifactStage::FinalEncoded => "final_encoded",
            ArtifactStage::Lowres => "lowres",
            ArtifactStage::Boosted => "boosted",
        }
    }
}

impl fmt::Display for ArtifactStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
