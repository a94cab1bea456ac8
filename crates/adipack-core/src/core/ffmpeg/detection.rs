//! FFmpeg Detection Module
//!
//! Locates the `ffmpeg` and `ffprobe` binaries used for probing and frame capture.
//! Lookup order: explicit environment override, common install directories,
//! then the system PATH.

use std::path::{Path, PathBuf};
use std::process::Command;

use super::{FFmpegError, FFmpegResult};

/// Environment variable overriding the ffmpeg binary location
pub const FFMPEG_PATH_ENV: &str = "ADIPACK_FFMPEG";

/// Environment variable overriding the ffprobe binary location
pub const FFPROBE_PATH_ENV: &str = "ADIPACK_FFPROBE";

/// Information about detected FFmpeg installation
#[derive(Debug, Clone)]
pub struct FFmpegInfo {
    /// Path to ffmpeg binary
    pub ffmpeg_path: PathBuf,
    /// Path to ffprobe binary
    pub ffprobe_path: PathBuf,
    /// FFmpeg version string
    pub version: String,
}

/// Detect FFmpeg on this machine.
pub fn detect_system_ffmpeg() -> FFmpegResult<FFmpegInfo> {
    let ffmpeg_path = locate_binary("ffmpeg", std::env::var_os(FFMPEG_PATH_ENV).map(PathBuf::from))?;
    let ffprobe_path =
        locate_binary("ffprobe", std::env::var_os(FFPROBE_PATH_ENV).map(PathBuf::from))?;

    let version = get_ffmpeg_version(&ffmpeg_path)?;
    tracing::debug!(
        "Using ffmpeg {} at {} (ffprobe at {})",
        version,
        ffmpeg_path.display(),
        ffprobe_path.display()
    );

    Ok(FFmpegInfo {
        ffmpeg_path,
        ffprobe_path,
        version,
    })
}

/// Find a binary, preferring an explicit override.
fn locate_binary(name: &str, override_path: Option<PathBuf>) -> FFmpegResult<PathBuf> {
    if let Some(path) = override_path {
        if path.is_file() {
            return Ok(path);
        }
        tracing::warn!(
            "Configured {} path does not exist: {}",
            name,
            path.display()
        );
        return Err(FFmpegError::NotFound);
    }

    let binary_name = binary_file_name(name);

    // Try common locations first
    for dir in get_common_ffmpeg_paths() {
        let candidate = dir.join(&binary_name);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    // Fall back to PATH search using `where` (Windows) or `which` (Unix)
    #[cfg(target_os = "windows")]
    let lookup = "where";
    #[cfg(not(target_os = "windows"))]
    let lookup = "which";

    let output = Command::new(lookup)
        .arg(name)
        .output()
        .map_err(|_| FFmpegError::NotFound)?;

    if output.status.success() {
        let path_str = String::from_utf8_lossy(&output.stdout);
        if let Some(first_line) = path_str.lines().next().filter(|l| !l.trim().is_empty()) {
            return Ok(PathBuf::from(first_line.trim()));
        }
    }

    Err(FFmpegError::NotFound)
}

fn binary_file_name(name: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

/// Get common FFmpeg installation paths for the current platform
fn get_common_ffmpeg_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    #[cfg(target_os = "windows")]
    {
        paths.push(PathBuf::from(r"C:\ffmpeg\bin"));
        paths.push(PathBuf::from(r"C:\Program Files\ffmpeg\bin"));

        // Chocolatey installation
        if let Ok(programdata) = std::env::var("ProgramData") {
            paths.push(PathBuf::from(programdata).join("chocolatey").join("bin"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        // Homebrew paths
        paths.push(PathBuf::from("/opt/homebrew/bin"));
        paths.push(PathBuf::from("/usr/local/bin"));
    }

    #[cfg(target_os = "linux")]
    {
        paths.push(PathBuf::from("/usr/bin"));
        paths.push(PathBuf::from("/usr/local/bin"));
        paths.push(PathBuf::from("/snap/bin"));
    }

    paths
}

/// Get FFmpeg version string
fn get_ffmpeg_version(ffmpeg_path: &Path) -> FFmpegResult<String> {
    let output = Command::new(ffmpeg_path)
        .arg("-version")
        .output()
        .map_err(FFmpegError::ProcessError)?;

    if !output.status.success() {
        return Err(FFmpegError::ExecutionFailed(
            "Failed to get FFmpeg version".to_string(),
        ));
    }

    parse_version_output(&String::from_utf8_lossy(&output.stdout))
}

/// Parse version from first line: "ffmpeg version X.X.X ..."
fn parse_version_output(output: &str) -> FFmpegResult<String> {
    let first_line = output
        .lines()
        .next()
        .filter(|l| !l.trim().is_empty())
        .ok_or_else(|| FFmpegError::ParseError("Could not parse FFmpeg version".to_string()))?;

    Ok(first_line
        .strip_prefix("ffmpeg version ")
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or(first_line)
        .to_string())
}
