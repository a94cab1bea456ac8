//! Archive Assembler
//!
//! Lays out a submission's artifacts in a package: the descriptor first,
//! then the media file under its original name, then each thumbnail.

use std::path::Path;

use crate::core::adi::Descriptor;
use crate::core::assets::ThumbnailArtifact;
use crate::core::{CoreResult, MediaArtifact};

use super::{Package, PackageBuilder, DESCRIPTOR_ENTRY_NAME};

#[derive(Clone, Debug, Default)]
pub struct ArchiveAssembler;

impl ArchiveAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Build the package in memory.
    pub fn assemble(
        &self,
        descriptor: &Descriptor,
        media: &MediaArtifact,
        thumbnails: &[ThumbnailArtifact],
    ) -> CoreResult<Package> {
        self.builder(descriptor, media, thumbnails)?.finalize()
    }

    /// Build the package as a local file at `path`.
    pub fn assemble_to(
        &self,
        path: &Path,
        descriptor: &Descriptor,
        media: &MediaArtifact,
        thumbnails: &[ThumbnailArtifact],
    ) -> CoreResult<Package> {
        let package = self.builder(descriptor, media, thumbnails)?.finalize_to(path)?;
        tracing::info!(
            "Assembled package {} ({} entries, {} bytes)",
            path.display(),
            package.entry_names().len(),
            package.size_bytes()
        );
        Ok(package)
    }

    fn builder(
        &self,
        descriptor: &Descriptor,
        media: &MediaArtifact,
        thumbnails: &[ThumbnailArtifact],
    ) -> CoreResult<PackageBuilder> {
        let xml = descriptor.to_xml()?;

        let mut builder = PackageBuilder::new();
        builder.add_bytes(DESCRIPTOR_ENTRY_NAME, xml.into_bytes())?;
        builder.add_file(media.file_name.as_str(), &media.path)?;
        for thumbnail in thumbnails {
            builder.add_bytes(thumbnail.key.as_str(), thumbnail.bytes.clone())?;
        }
        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::adi::{DescriptiveFields, DescriptorSynthesizer};
    use crate::core::assets::{ProbeResult, StreamInfo};
    use crate::core::CoreError;

    fn descriptor() -> Descriptor {
        let fields = DescriptiveFields::new("Pilot", "Pilot", "short", "long");
        let probe = ProbeResult {
            format_name: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
            duration_seconds: 125.0,
            bit_rate_bps: Some(1_000_000),
            streams: vec![StreamInfo::video("h264", Some(1920), Some(1080))],
        };
        DescriptorSynthesizer::default().synthesize(&fields, &probe)
    }

    fn media(dir: &Path) -> MediaArtifact {
        let path = dir.join("pilot.mp4");
        std::fs::write(&path, b"fake mp4 payload").unwrap();
        MediaArtifact::from_path(path).unwrap()
    }

    #[test]
    fn test_entries_in_descriptor_media_thumbnail_order() {
        let dir = tempfile::tempdir().unwrap();
        let media = media(dir.path());
        let thumbnails = vec![
            ThumbnailArtifact::new(0, b"png0".to_vec()),
            ThumbnailArtifact::new(60, b"png60".to_vec()),
            ThumbnailArtifact::new(120, b"png120".to_vec()),
        ];

        let package = ArchiveAssembler::new()
            .assemble(&descriptor(), &media, &thumbnails)
            .unwrap();

        let names: Vec<String> = package.entries().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(
            names,
            [
                "adi.xml",
                "pilot.mp4",
                "thumbnail_0.png",
                "thumbnail_60.png",
                "thumbnail_120.png"
            ]
        );
    }

    #[test]
    fn test_package_round_trip_preserves_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let media = media(dir.path());
        let descriptor = descriptor();
        let thumbnails = vec![ThumbnailArtifact::new(0, vec![1, 2, 3, 4])];

        let out = dir.path().join("output.zip");
        let package = ArchiveAssembler::new()
            .assemble_to(&out, &descriptor, &media, &thumbnails)
            .unwrap();
        let entries = package.entries().unwrap();

        let xml = String::from_utf8(entries[0].bytes.clone()).unwrap();
        assert_eq!(Descriptor::from_xml(&xml).unwrap(), descriptor);
        assert_eq!(entries[1].bytes, b"fake mp4 payload");
        assert_eq!(entries[2].bytes, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_missing_media_fails_without_archive() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaArtifact {
            file_name: "gone.mp4".to_string(),
            path: dir.path().join("gone.mp4"),
        };
        let out = dir.path().join("output.zip");

        let err = ArchiveAssembler::new()
            .assemble_to(&out, &descriptor(), &media, &[])
            .unwrap_err();
        assert!(matches!(err, CoreError::ArchiveWriteFailed(_)));
        assert!(!out.exists());
    }

    #[test]
    fn test_media_named_like_descriptor_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut media = media(dir.path());
        media.file_name = "adi.xml".to_string();

        let err = ArchiveAssembler::new()
            .assemble(&descriptor(), &media, &[])
            .unwrap_err();
        assert!(matches!(err, CoreError::ArchiveWriteFailed(_)));
    }

    #[test]
    fn test_media_name_with_colon_is_kept_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let mut media = media(dir.path());
        media.file_name = "Episode 01: Pilot.mp4".to_string();

        let package = ArchiveAssembler::new()
            .assemble(&descriptor(), &media, &[])
            .unwrap();

        let entries = package.entries().unwrap();
        assert_eq!(entries[1].name, "Episode 01: Pilot.mp4");
        assert_eq!(entries[1].bytes, b"fake mp4 payload");
    }
}
