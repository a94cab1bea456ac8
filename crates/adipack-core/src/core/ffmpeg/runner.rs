//! FFmpeg Runner Module
//!
//! Executes ffprobe/ffmpeg as child processes.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{FFmpegError, FFmpegInfo, FFmpegResult, MediaProbe};

/// Upper bound for a single ffprobe/ffmpeg invocation
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// FFmpeg Runner for probing and frame capture
#[derive(Clone)]
pub struct FFmpegRunner {
    info: Arc<FFmpegInfo>,
    timeout: Duration,
}

impl FFmpegRunner {
    /// Create a new FFmpegRunner from detected FFmpeg installation
    pub fn new(info: FFmpegInfo) -> Self {
        Self {
            info: Arc::new(info),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Override the per-command timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the FFmpeg info
    pub fn info(&self) -> &FFmpegInfo {
        &self.info
    }

    async fn run(&self, cmd: &mut tokio::process::Command) -> FFmpegResult<std::process::Output> {
        cmd.kill_on_drop(true);
        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(output) => output.map_err(FFmpegError::ProcessError),
            Err(_) => Err(FFmpegError::Timeout),
        }
    }
}

fn ensure_input_exists(input: &Path) -> FFmpegResult<()> {
    if !input.is_file() {
        return Err(FFmpegError::InvalidInput(format!(
            "Input file does not exist: {}",
            input.display()
        )));
    }
    Ok(())
}

#[async_trait]
impl MediaProbe for FFmpegRunner {
    async fn probe(&self, input: &Path) -> FFmpegResult<String> {
        ensure_input_exists(input)?;

        // Run ffprobe with JSON output
        let output = self
            .run(
                tokio::process::Command::new(&self.info.ffprobe_path)
                    .args([
                        "-v",
                        "quiet",
                        "-print_format",
                        "json",
                        "-show_format",
                        "-show_streams",
                    ])
                    .arg(input),
            )
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FFmpegError::ProbeError(format!("FFprobe failed: {}", stderr.trim())));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn extract_frame(&self, input: &Path, offset_secs: u64) -> FFmpegResult<Vec<u8>> {
        ensure_input_exists(input)?;

        // -ss before -i for fast seeking; PNG goes to stdout
        let output = self
            .run(
                tokio::process::Command::new(&self.info.ffmpeg_path)
                    .args(["-v", "error", "-ss", &offset_secs.to_string(), "-i"])
                    .arg(input)
                    .args([
                        "-frames:v",
                        "1",
                        "-f",
                        "image2pipe",
                        "-vcodec",
                        "png",
                        "pipe:1",
                    ]),
            )
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FFmpegError::ExecutionFailed(format!(
                "Frame extraction failed: {}",
                stderr.trim()
            )));
        }

        // Seeking past the last frame exits cleanly with nothing on stdout
        if output.stdout.is_empty() {
            return Err(FFmpegError::ExecutionFailed(format!(
                "No frame available at {}s",
                offset_secs
            )));
        }

        Ok(output.stdout)
    }
}
