//! Pipeline Module
//!
//! Sequences the stages for one submission:
//! staging -> inspect -> thumbnails -> describe -> assemble -> publish.
//!
//! Scratch files live in a per-submission temp directory that is removed
//! when the run ends, whatever the outcome. Objects already published when
//! a later upload fails are left in place.

mod cancel;
mod packager;

pub use cancel::*;
pub use packager::*;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::core::adi::DescriptiveFields;
use crate::core::assets::{ProbeResult, DEFAULT_THUMBNAIL_PREFIX};
use crate::core::fs::validate_flat_name;
use crate::core::package::DEFAULT_PACKAGE_NAME;
use crate::core::settings::{StorageSettings, DEFAULT_DESCRIPTOR_KEY};
use crate::core::storage::{PublishedArtifact, Publisher};
use crate::core::{new_submission_id, ArtifactSource, CoreError, MediaArtifact, SubmissionId};

/// Subdirectory of the scratch dir that holds staged media
const STAGED_MEDIA_DIR: &str = "media";

// =============================================================================
// Submission
// =============================================================================

/// Where the media of a submission comes from
#[derive(Clone, Debug)]
pub enum MediaSource {
    /// A file that already exists locally
    Path(PathBuf),
    /// Uploaded bytes plus the original file name
    Bytes { file_name: String, bytes: Vec<u8> },
}

/// One packaging request
#[derive(Clone, Debug)]
pub struct Submission {
    pub media: MediaSource,
    pub fields: DescriptiveFields,
}

impl Submission {
    pub fn new(media: MediaSource, fields: DescriptiveFields) -> Self {
        Self { media, fields }
    }
}

// =============================================================================
// Stages & Errors
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Staging,
    Inspect,
    Thumbnails,
    Describe,
    Assemble,
    Publish,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Staging => "staging",
            Stage::Inspect => "inspect",
            Stage::Thumbnails => "thumbnails",
            Stage::Describe => "describe",
            Stage::Assemble => "assemble",
            Stage::Publish => "publish",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed run and the stage it failed in
#[derive(Error, Debug)]
#[error("{stage} stage failed: {error}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub error: CoreError,
}

impl PipelineError {
    pub fn new(stage: Stage, error: CoreError) -> Self {
        Self { stage, error }
    }
}

// =============================================================================
// Output
// =============================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutput {
    pub submission_id: SubmissionId,
    pub package: PublishedArtifact,
    pub descriptor: Option<PublishedArtifact>,
    pub thumbnails: Vec<PublishedArtifact>,
    pub probe: ProbeResult,
    pub descriptor_xml: String,
}

/// Object layout and optional uploads
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishOptions {
    pub package_key: String,
    pub descriptor_key: String,
    pub thumbnail_prefix: String,
    pub upload_descriptor: bool,
    pub upload_thumbnails: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            package_key: DEFAULT_PACKAGE_NAME.to_string(),
            descriptor_key: DEFAULT_DESCRIPTOR_KEY.to_string(),
            thumbnail_prefix: DEFAULT_THUMBNAIL_PREFIX.to_string(),
            upload_descriptor: true,
            upload_thumbnails: false,
        }
    }
}

impl From<&StorageSettings> for PublishOptions {
    fn from(storage: &StorageSettings) -> Self {
        Self {
            package_key: storage.package_key.clone(),
            descriptor_key: storage.descriptor_key.clone(),
            thumbnail_prefix: storage.thumbnail_prefix.clone(),
            upload_descriptor: storage.upload_descriptor,
            upload_thumbnails: storage.upload_thumbnails,
        }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

pub struct Pipeline {
    packager: Packager,
    publisher: Arc<Publisher>,
    options: PublishOptions,
    scratch_root: Option<PathBuf>,
}

impl Pipeline {
    pub fn new(packager: Packager, publisher: Arc<Publisher>) -> Self {
        Self {
            packager,
            publisher,
            options: PublishOptions::default(),
            scratch_root: None,
        }
    }

    pub fn with_options(mut self, options: PublishOptions) -> Self {
        self.options = options;
        self
    }

    /// Create per-submission scratch dirs under `root` instead of the
    /// system temp dir.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn packager(&self) -> &Packager {
        &self.packager
    }

    /// Run every stage for `submission`.
    pub async fn run(
        &self,
        submission: Submission,
        cancel: &CancelToken,
    ) -> Result<PipelineOutput, PipelineError> {
        let submission_id = new_submission_id();
        info!("Submission {} started", submission_id);

        let result = self.run_stages(&submission_id, submission, cancel).await;
        match &result {
            Ok(output) => info!(
                "Submission {} published to {}",
                submission_id, output.package.url
            ),
            Err(e) => warn!("Submission {} failed: {}", submission_id, e),
        }
        result
    }

    async fn run_stages(
        &self,
        submission_id: &SubmissionId,
        submission: Submission,
        cancel: &CancelToken,
    ) -> Result<PipelineOutput, PipelineError> {
        checkpoint(cancel, Stage::Staging)?;
        let mut builder = tempfile::Builder::new();
        builder.prefix("adipack-");
        let scratch = match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| PipelineError::new(Stage::Staging, e.into()))?;
        let media = stage_media(submission.media, scratch.path())
            .await
            .map_err(|e| PipelineError::new(Stage::Staging, e))?;

        let prepared = self
            .packager
            .prepare(
                &media,
                &submission.fields,
                &scratch.path().join(DEFAULT_PACKAGE_NAME),
                cancel,
            )
            .await?;

        checkpoint(cancel, Stage::Publish)?;
        info!("Publishing submission {}", submission_id);

        let mut uploads = vec![(
            prepared.package.source().clone(),
            self.options.package_key.clone(),
        )];
        if self.options.upload_descriptor {
            uploads.push((
                ArtifactSource::Bytes(prepared.descriptor_xml.clone().into_bytes()),
                self.options.descriptor_key.clone(),
            ));
        }
        if self.options.upload_thumbnails {
            for thumbnail in &prepared.thumbnails {
                uploads.push((
                    ArtifactSource::Bytes(thumbnail.bytes.clone()),
                    thumbnail.storage_key(&self.options.thumbnail_prefix),
                ));
            }
        }

        let mut published = try_join_all(
            uploads
                .iter()
                .map(|(source, key)| self.publisher.publish(source.clone(), key)),
        )
        .await
        .map_err(|e| PipelineError::new(Stage::Publish, e))?
        .into_iter();

        let package = published.next().ok_or_else(|| {
            PipelineError::new(
                Stage::Publish,
                CoreError::Internal("Package upload produced no result".to_string()),
            )
        })?;
        let descriptor = if self.options.upload_descriptor {
            published.next()
        } else {
            None
        };
        let thumbnails: Vec<PublishedArtifact> = published.collect();

        Ok(PipelineOutput {
            submission_id: submission_id.clone(),
            package,
            descriptor,
            thumbnails,
            probe: prepared.probe,
            descriptor_xml: prepared.descriptor_xml,
        })
    }
}

/// Resolve the submission's media to a local file inside or outside `scratch`.
async fn stage_media(source: MediaSource, scratch: &Path) -> Result<MediaArtifact, CoreError> {
    match source {
        MediaSource::Path(path) => MediaArtifact::from_path(path),
        MediaSource::Bytes { file_name, bytes } => {
            validate_flat_name(&file_name, "media file name").map_err(CoreError::ValidationError)?;
            let dir = scratch.join(STAGED_MEDIA_DIR);
            tokio::fs::create_dir_all(&dir).await?;
            let path = dir.join(&file_name);
            tokio::fs::write(&path, &bytes).await?;
            tracing::debug!("Staged {} ({} bytes)", path.display(), bytes.len());
            Ok(MediaArtifact { file_name, path })
        }
    }
}
