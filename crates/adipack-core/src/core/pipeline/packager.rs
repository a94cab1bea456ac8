//! Local part of the pipeline: inspect, capture, describe, assemble.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use super::{CancelToken, PipelineError, Stage};
use crate::core::adi::{DescriptiveFields, Descriptor, DescriptorSynthesizer};
use crate::core::assets::{MediaInspector, ProbeResult, ThumbnailArtifact, ThumbnailGenerator};
use crate::core::ffmpeg::MediaProbe;
use crate::core::package::{ArchiveAssembler, Package};
use crate::core::settings::PackagerSettings;
use crate::core::{CoreError, MediaArtifact};

/// Everything produced before publication
#[derive(Clone, Debug)]
pub struct PreparedPackage {
    pub probe: ProbeResult,
    pub descriptor: Descriptor,
    pub descriptor_xml: String,
    pub thumbnails: Vec<ThumbnailArtifact>,
    pub package: Package,
}

/// Runs the local stages for one media file
#[derive(Clone)]
pub struct Packager {
    inspector: MediaInspector,
    thumbnails: ThumbnailGenerator,
    synthesizer: DescriptorSynthesizer,
    assembler: ArchiveAssembler,
}

impl Packager {
    pub fn new(probe: Arc<dyn MediaProbe>) -> Self {
        Self {
            inspector: MediaInspector::new(Arc::clone(&probe)),
            thumbnails: ThumbnailGenerator::new(probe),
            synthesizer: DescriptorSynthesizer::default(),
            assembler: ArchiveAssembler::new(),
        }
    }

    pub fn from_settings(probe: Arc<dyn MediaProbe>, settings: &PackagerSettings) -> Self {
        let mut packager = Self::new(probe);
        packager.thumbnails = packager
            .thumbnails
            .with_interval(settings.thumbnails.interval_secs)
            .with_concurrency(settings.thumbnails.concurrency);
        packager.synthesizer = DescriptorSynthesizer::new(settings.ams_template());
        packager
    }

    pub fn with_thumbnails(mut self, thumbnails: ThumbnailGenerator) -> Self {
        self.thumbnails = thumbnails;
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: DescriptorSynthesizer) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    pub async fn inspect(&self, input: &Path) -> Result<ProbeResult, PipelineError> {
        self.inspector
            .inspect(input)
            .await
            .map_err(|e| PipelineError::new(Stage::Inspect, e))
    }

    pub fn describe(&self, fields: &DescriptiveFields, probe: &ProbeResult) -> Descriptor {
        self.synthesizer.synthesize(fields, probe)
    }

    /// Inspect, capture, describe and assemble `media` into a zip at `out`.
    pub async fn prepare(
        &self,
        media: &MediaArtifact,
        fields: &DescriptiveFields,
        out: &Path,
        cancel: &CancelToken,
    ) -> Result<PreparedPackage, PipelineError> {
        checkpoint(cancel, Stage::Inspect)?;
        info!("Inspecting {}", media.path.display());
        let probe = self.inspect(&media.path).await?;
        info!(
            "Probed {}: {:.3}s, {} stream(s)",
            media.file_name,
            probe.duration_seconds,
            probe.streams.len()
        );

        checkpoint(cancel, Stage::Thumbnails)?;
        let thumbnails = self
            .thumbnails
            .generate(&media.path, probe.duration_seconds)
            .await
            .map_err(|e| PipelineError::new(Stage::Thumbnails, e))?;
        info!("Captured {} thumbnail(s)", thumbnails.len());

        checkpoint(cancel, Stage::Describe)?;
        let descriptor = self.describe(fields, &probe);
        let descriptor_xml = descriptor
            .to_xml()
            .map_err(|e| PipelineError::new(Stage::Describe, e))?;
        info!(
            "Synthesized descriptor with {} App_Data entries",
            descriptor.app_data().count()
        );

        checkpoint(cancel, Stage::Assemble)?;
        let assembler = self.assembler.clone();
        let media = media.clone();
        let out: PathBuf = out.to_path_buf();
        let (package, descriptor, thumbnails) = tokio::task::spawn_blocking(move || {
            let package = assembler.assemble_to(&out, &descriptor, &media, &thumbnails);
            (package, descriptor, thumbnails)
        })
        .await
        .map_err(|e| {
            PipelineError::new(
                Stage::Assemble,
                CoreError::Internal(format!("Assemble task failed: {}", e)),
            )
        })?;
        let package = package.map_err(|e| PipelineError::new(Stage::Assemble, e))?;

        Ok(PreparedPackage {
            probe,
            descriptor,
            descriptor_xml,
            thumbnails,
            package,
        })
    }
}

pub(crate) fn checkpoint(cancel: &CancelToken, stage: Stage) -> Result<(), PipelineError> {
    cancel.check().map_err(|e| PipelineError::new(stage, e))
}
