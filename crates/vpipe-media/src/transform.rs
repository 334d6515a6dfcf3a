//! Typed transcoder stages and the invoker seam.
//!
//! [`Transformer`] is the boundary the pipeline talks to: one call per
//! stage, over an input path and an output path, resolving only when the
//! external process has exited. [`FfmpegTransformer`] is the production
//! implementation; tests substitute their own.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use vpipe_models::{ArtifactStage, PipelineConfig};

use crate::command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Name of a transcoder stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    Scale,
    Recode,
    Gain,
    BitrateEncode,
}

impl TransformKind {
    /// Pipeline order: scale before re-encoding, gain before the final encode.
    pub const PIPELINE_ORDER: [TransformKind; 4] = [
        TransformKind::Scale,
        TransformKind::Recode,
        TransformKind::Gain,
        TransformKind::BitrateEncode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransformKind::Scale => "scale",
            TransformKind::Recode => "recode",
            TransformKind::Gain => "gain",
            TransformKind::BitrateEncode => "bitrate_encode",
        }
    }

    /// Tag used when naming this stage's output.
    pub fn artifact_stage(&self) -> ArtifactStage {
        match self {
            TransformKind::Scale => ArtifactStage::Lowres,
            TransformKind::Recode => ArtifactStage::Processed,
            TransformKind::Gain => ArtifactStage::Boosted,
            TransformKind::BitrateEncode => ArtifactStage::FinalEncoded,
        }
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One stage with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    Scale {
        resolution: String,
    },
    Recode {
        codec: String,
    },
    Gain {
        db: f64,
    },
    BitrateEncode {
        codec: String,
        bitrate_kbps: u32,
        crf: u8,
        strip_metadata: bool,
    },
}

impl Transform {
    /// Build the stage of `kind` from an already validated config.
    pub fn from_config(kind: TransformKind, config: &PipelineConfig) -> Self {
        match kind {
            TransformKind::Scale => Transform::Scale {
                resolution: config.resolution.clone(),
            },
            TransformKind::Recode => Transform::Recode {
                codec: config.codec.clone(),
            },
            TransformKind::Gain => Transform::Gain {
                db: config.volume_gain,
            },
            TransformKind::BitrateEncode => Transform::BitrateEncode {
                codec: config.codec.clone(),
                bitrate_kbps: config.bitrate_kbps,
                crf: config.crf,
                strip_metadata: config.strip_metadata,
            },
        }
    }

    pub fn kind(&self) -> TransformKind {
        match self {
            Transform::Scale { .. } => TransformKind::Scale,
            Transform::Recode { .. } => TransformKind::Recode,
            Transform::Gain { .. } => TransformKind::Gain,
            Transform::BitrateEncode { .. } => TransformKind::BitrateEncode,
        }
    }

    /// Append this stage's flags to `cmd`.
    pub fn apply(&self, cmd: FfmpegCommand) -> FfmpegCommand {
        match self {
            Transform::Scale { resolution } => cmd.video_filter(format!("scale={}", resolution)),
            Transform::Recode { codec } => cmd.video_codec(codec),
            Transform::Gain { db } => cmd.audio_filter(format!("volume={}dB", db)),
            Transform::BitrateEncode {
                codec,
                bitrate_kbps,
                crf,
                strip_metadata,
            } => {
                let cmd = cmd
                    .video_codec(codec)
                    .video_bitrate_kbps(*bitrate_kbps)
                    .crf(*crf);
                if *strip_metadata {
                    cmd.strip_metadata()
                } else {
                    cmd
                }
            }
        }
    }
}

/// Invokes one transform, writing exactly one new file at `output`.
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Run `transform` from `input` to `output`. Never mutates `input`.
    async fn invoke(&self, transform: &Transform, input: &Path, output: &Path) -> MediaResult<()>;
}

/// Transformer backed by the FFmpeg CLI.
#[derive(Debug, Clone)]
pub struct FfmpegTransformer {
    runner: FfmpegRunner,
}

impl FfmpegTransformer {
    /// Resolve `binary` on PATH and build a transformer around it.
    pub fn new(binary: impl AsRef<Path>) -> MediaResult<Self> {
        let resolved = check_ffmpeg(binary)?;
        Ok(Self {
            runner: FfmpegRunner::new(resolved),
        })
    }

    /// Use a binary path as-is, without a PATH lookup.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            runner: FfmpegRunner::new(binary),
        }
    }

    /// Kill any single invocation running longer than `secs`.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.runner = self.runner.with_timeout(secs);
        self
    }

    pub fn binary(&self) -> &Path {
        self.runner.binary()
    }
}

#[async_trait]
impl Transformer for FfmpegTransformer {
    async fn invoke(&self, transform: &Transform, input: &Path, output: &Path) -> MediaResult<()> {
        if !tokio::fs::try_exists(input).await.unwrap_or(false) {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }
        if input == output {
            return Err(MediaError::invalid_arguments(format!(
                "{} would overwrite its own input {}",
                transform.kind(),
                input.display()
            )));
        }
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let stage = transform.kind();
        let cmd = transform.apply(FfmpegCommand::new(input, output));
        self.runner.run(&cmd, stage).await?;

        info!(
            stage = %stage,
            input = %input.display(),
            output = %output.display(),
            "Transform complete"
        );
        Ok(())
    }
}
