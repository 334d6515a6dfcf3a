//! FFmpeg CLI wrapper for pipeline transforms.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - A runner that waits for exit, captures the stderr tail, and enforces a timeout
//! - Typed pipeline stages and the `Transformer` seam the orchestrator calls

pub mod command;
pub mod error;
pub mod transform;

pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use transform::{FfmpegTransformer, Transform, TransformKind, Transformer};
