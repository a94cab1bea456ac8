//! FFmpeg Integration Module
//!
//! Wraps the `ffprobe`/`ffmpeg` command-line tools behind the [`MediaProbe`]
//! trait so the pipeline can probe containers and capture single frames
//! without caring how that happens.

mod detection;
mod runner;

use std::path::Path;

use async_trait::async_trait;

pub use detection::*;
pub use runner::FFmpegRunner;

/// FFmpeg-related error types
#[derive(Debug, thiserror::Error)]
pub enum FFmpegError {
    #[error("FFmpeg not found. Install FFmpeg or set ADIPACK_FFMPEG / ADIPACK_FFPROBE.")]
    NotFound,

    #[error("FFmpeg execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Invalid input file: {0}")]
    InvalidInput(String),

    #[error("FFprobe error: {0}")]
    ProbeError(String),

    #[error("Process error: {0}")]
    ProcessError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Timeout: operation took too long")]
    Timeout,
}

pub type FFmpegResult<T> = Result<T, FFmpegError>;

/// Media probing and frame capture capability.
///
/// Implementations must be safe to call concurrently; the thumbnail stage
/// issues several `extract_frame` calls at once.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Raw ffprobe-style JSON (`format` + `streams` sections) for a media file.
    async fn probe(&self, input: &Path) -> FFmpegResult<String>;

    /// Capture a single frame at `offset_secs` and return it PNG-encoded.
    async fn extract_frame(&self, input: &Path, offset_secs: u64) -> FFmpegResult<Vec<u8>>;
}
