//! adipack Core Type Definitions
//!
//! Small value types shared by several pipeline stages.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{CoreError, CoreResult};

// =============================================================================
// ID Types
// =============================================================================

/// Submission unique identifier (ULID)
pub type SubmissionId = String;

/// Creates a new submission ID
pub fn new_submission_id() -> SubmissionId {
    ulid::Ulid::new().to_string()
}

// =============================================================================
// Time Types
// =============================================================================

/// Time in seconds (floating point)
pub type TimeSec = f64;

// =============================================================================
// Artifacts
// =============================================================================

/// Bytes to be stored somewhere: either already in memory or in a local file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArtifactSource {
    Bytes(Vec<u8>),
    File(PathBuf),
}

impl ArtifactSource {
    /// Loads the artifact into memory.
    ///
    /// A missing local file is reported as [`CoreError::ArtifactNotFound`]
    /// so callers can tell it apart from other I/O failures.
    pub async fn read(&self) -> CoreResult<Vec<u8>> {
        match self {
            ArtifactSource::Bytes(bytes) => Ok(bytes.clone()),
            ArtifactSource::File(path) => match tokio::fs::read(path).await {
                Ok(bytes) => Ok(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(CoreError::ArtifactNotFound(path.display().to_string()))
                }
                Err(e) => Err(CoreError::IoError(e)),
            },
        }
    }

    /// Local path, if the artifact lives on disk.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ArtifactSource::File(path) => Some(path),
            ArtifactSource::Bytes(_) => None,
        }
    }
}

/// The original media file as it goes into the package.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaArtifact {
    /// Entry name inside the package (the original file name)
    pub file_name: String,
    /// Local path of the media file
    pub path: PathBuf,
}

impl MediaArtifact {
    /// Builds an artifact from a local path, using its file name as entry name.
    pub fn from_path(path: impl Into<PathBuf>) -> CoreResult<Self> {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                CoreError::ValidationError(format!(
                    "Media path has no file name: {}",
                    path.display()
                ))
            })?;
        Ok(Self { file_name, path })
    }
}
