//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::transform::TransformKind;

/// Number of stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// How long to keep draining stderr after the process has exited.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// FFmpeg log level; only errors reach stderr.
const LOG_LEVEL: &str = "error";

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path
    output: PathBuf,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
        }
    }

    /// Add an output argument (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set audio filter.
    pub fn audio_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter:a").output_arg(filter)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set video bitrate in kbit/s.
    pub fn video_bitrate_kbps(self, kbps: u32) -> Self {
        self.output_arg("-b:v").output_arg(format!("{}k", kbps))
    }

    /// Set CRF (quality).
    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    /// Drop all global and stream metadata.
    pub fn strip_metadata(self) -> Self {
        self.output_arg("-map_metadata").output_arg("-1")
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(LOG_LEVEL.to_string());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with a per-invocation timeout.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    /// FFmpeg binary
    binary: PathBuf,
    /// Timeout in seconds
    timeout_secs: Option<u64>,
}

impl FfmpegRunner {
    /// Create a runner for the given binary.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout_secs: None,
        }
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Binary this runner spawns.
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Run an FFmpeg command for `stage`, returning once the process has exited.
    pub async fn run(&self, cmd: &FfmpegCommand, stage: TransformKind) -> MediaResult<()> {
        let args = cmd.build_args();
        debug!(stage = %stage, "Running FFmpeg: {} {}", self.binary.display(), args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::invalid_arguments("stderr not captured"))?;
        let mut reader = BufReader::new(stderr).lines();

        let mut stderr_handle = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            while let Ok(Some(line)) = reader.next_line().await {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            tail.into_iter().collect::<Vec<_>>().join("\n")
        });

        let start = Instant::now();
        let result = self.wait_for_completion(&mut child, stage).await;
        // A forked grandchild can hold the pipe open long after ffmpeg is gone.
        let stderr_tail = if matches!(result, Err(MediaError::Timeout { .. })) {
            stderr_handle.abort();
            String::new()
        } else {
            match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, &mut stderr_handle).await {
                Ok(joined) => joined.unwrap_or_default(),
                Err(_) => {
                    warn!(stage = %stage, "Stderr still open after FFmpeg exited, dropping it");
                    stderr_handle.abort();
                    String::new()
                }
            }
        };

        metrics::histogram!("vpipe_ffmpeg_duration_seconds", "stage" => stage.as_str())
            .record(start.elapsed().as_secs_f64());

        match result {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(MediaError::transform_failed(
                stage,
                status.code(),
                (!stderr_tail.is_empty()).then_some(stderr_tail),
            )),
            Err(e) => Err(e),
        }
    }

    /// Wait for the child, killing and reaping it if the timeout elapses.
    async fn wait_for_completion(
        &self,
        child: &mut Child,
        stage: TransformKind,
    ) -> MediaResult<std::process::ExitStatus> {
        let Some(timeout_secs) = self.timeout_secs else {
            return Ok(child.wait().await?);
        };

        match tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait()).await {
            Ok(status) => Ok(status?),
            Err(_) => {
                warn!(
                    stage = %stage,
                    "FFmpeg timed out after {} seconds, killing process", timeout_secs
                );
                // kill() also waits, so the process is reaped before we return.
                if let Err(e) = child.kill().await {
                    warn!(stage = %stage, "Failed to kill timed out FFmpeg: {}", e);
                }
                Err(MediaError::Timeout {
                    stage,
                    secs: timeout_secs,
                })
            }
        }
    }
}

/// Resolve the FFmpeg binary, either a path or a name looked up on PATH.
pub fn check_ffmpeg(binary: impl AsRef<Path>) -> MediaResult<PathBuf> {
    let binary = binary.as_ref();
    which::which(binary).map_err(|_| MediaError::FfmpegNotFound(binary.display().to_string()))
}
