//! End-to-end pipeline tests
//!
//! Run the full stage sequence against a scripted probe and an in-memory
//! object store, so neither ffmpeg nor network access is needed.

use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::core::adi::{DescriptiveFields, Descriptor};
use crate::core::assets::ThumbnailGenerator;
use crate::core::ffmpeg::{FFmpegError, FFmpegResult, MediaProbe};
use crate::core::pipeline::{
    CancelToken, MediaSource, Packager, Pipeline, PipelineOutput, PublishOptions, Stage,
    Submission,
};
use crate::core::storage::{MemoryStore, PublisherConfig, Publisher, RetryPolicy, StoreError};
use crate::core::CoreError;

const BUCKET: &str = "media-bucket";

struct ScriptedMedia {
    duration: f64,
    fail_frame_at: Option<u64>,
    probe_calls: AtomicUsize,
    frame_calls: AtomicUsize,
}

impl ScriptedMedia {
    fn new(duration: f64) -> Arc<Self> {
        Arc::new(Self {
            duration,
            fail_frame_at: None,
            probe_calls: AtomicUsize::new(0),
            frame_calls: AtomicUsize::new(0),
        })
    }

    fn failing_at(duration: f64, offset: u64) -> Arc<Self> {
        Arc::new(Self {
            duration,
            fail_frame_at: Some(offset),
            probe_calls: AtomicUsize::new(0),
            frame_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl MediaProbe for ScriptedMedia {
    async fn probe(&self, _input: &Path) -> FFmpegResult<String> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            r#"{{
                "format": {{"duration": "{}", "bit_rate": "2500000", "format_name": "mov,mp4,m4a,3gp,3g2,mj2"}},
                "streams": [
                    {{"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080}},
                    {{"codec_type": "audio", "codec_name": "aac", "channels": 2}}
                ]
            }}"#,
            self.duration
        ))
    }

    async fn extract_frame(&self, _input: &Path, offset_secs: u64) -> FFmpegResult<Vec<u8>> {
        self.frame_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_frame_at == Some(offset_secs) {
            return Err(FFmpegError::ExecutionFailed("decoder error".into()));
        }
        Ok(format!("png@{}", offset_secs).into_bytes())
    }
}

fn fields() -> DescriptiveFields {
    DescriptiveFields::new("Pilot", "Pilot (Original)", "Short", "Long")
        .with("Genre", "Drama")
        .unwrap()
}

fn submission() -> Submission {
    Submission::new(
        MediaSource::Bytes {
            file_name: "pilot.mp4".to_string(),
            bytes: b"not really an mp4".to_vec(),
        },
        fields(),
    )
}

fn pipeline(media: &Arc<ScriptedMedia>, store: &Arc<MemoryStore>) -> Pipeline {
    let probe: Arc<dyn MediaProbe> = media.clone();
    let packager = Packager::new(Arc::clone(&probe))
        .with_thumbnails(ThumbnailGenerator::new(probe).with_concurrency(2));
    let config = PublisherConfig::new(BUCKET, "us-east-1")
        .with_retry(RetryPolicy::new(3, Duration::from_millis(1)));
    let publisher = Publisher::with_store(config, store.clone()).unwrap();
    Pipeline::new(packager, Arc::new(publisher))
}

fn zip_entries(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut file = archive.by_index(i).unwrap();
            let mut data = Vec::new();
            file.read_to_end(&mut data).unwrap();
            (file.name().to_string(), data)
        })
        .collect()
}

async fn run_ok(pipeline: &Pipeline) -> PipelineOutput {
    pipeline
        .run(submission(), &CancelToken::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_full_run_publishes_package_and_descriptor() {
    let media = ScriptedMedia::new(125.5);
    let store = Arc::new(MemoryStore::new());

    let output = run_ok(&pipeline(&media, &store)).await;

    assert_eq!(
        output.package.url,
        "https://media-bucket.s3.us-east-1.amazonaws.com/output.zip"
    );
    assert_eq!(output.descriptor.as_ref().unwrap().key, "adi/adi.xml");
    assert!(output.thumbnails.is_empty());
    assert_eq!(store.keys(BUCKET), vec!["adi/adi.xml", "output.zip"]);

    let package = store.object(BUCKET, "output.zip").unwrap();
    assert_eq!(package.content_type, "application/zip");
    let entries = zip_entries(&package.bytes);
    let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
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
    assert_eq!(entries[1].1, b"not really an mp4");
    assert_eq!(entries[3].1, b"png@60");

    // The packaged, uploaded and returned descriptors are the same document
    let uploaded = store.object(BUCKET, "adi/adi.xml").unwrap().bytes;
    assert_eq!(uploaded, output.descriptor_xml.as_bytes());
    assert_eq!(entries[0].1, output.descriptor_xml.as_bytes());

    let descriptor = Descriptor::from_xml(&output.descriptor_xml).unwrap();
    assert_eq!(descriptor.ams.asset_name, "Pilot");
    assert_eq!(descriptor.value_of("Genre"), Some("Drama"));
    assert_eq!(descriptor.value_of("Duration"), Some("125.5"));
    assert_eq!(descriptor.value_of("video_Width"), Some("1920"));
    assert_eq!(descriptor.value_of("audio_Channels"), Some("2"));

    assert_eq!(output.probe.streams.len(), 2);
    assert_eq!(media.frame_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_optional_thumbnail_uploads() {
    let media = ScriptedMedia::new(90.0);
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(&media, &store).with_options(PublishOptions {
        upload_descriptor: false,
        upload_thumbnails: true,
        ..PublishOptions::default()
    });

    let output = run_ok(&pipeline).await;

    assert!(output.descriptor.is_none());
    let keys: Vec<&str> = output.thumbnails.iter().map(|t| t.key.as_str()).collect();
    assert_eq!(
        keys,
        ["thumbnails/thumbnail_0.png", "thumbnails/thumbnail_60.png"]
    );
    assert_eq!(
        store.object(BUCKET, "thumbnails/thumbnail_60.png").unwrap().bytes,
        b"png@60"
    );
    assert!(store.object(BUCKET, "adi/adi.xml").is_none());
}

#[tokio::test]
async fn test_transient_upload_failure_is_retried() {
    let media = ScriptedMedia::new(30.0);
    let store = Arc::new(MemoryStore::new());
    store.fail_next(StoreError::Unavailable("503 Slow Down".into()));

    run_ok(&pipeline(&media, &store)).await;

    // two uploads, one of them retried once
    assert_eq!(store.put_attempts(), 3);
    assert_eq!(store.keys(BUCKET).len(), 2);
}

#[tokio::test]
async fn test_cancelled_before_start_does_nothing() {
    let media = ScriptedMedia::new(30.0);
    let store = Arc::new(MemoryStore::new());
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = pipeline(&media, &store)
        .run(submission(), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Staging);
    assert!(matches!(err.error, CoreError::Cancelled(_)));
    assert_eq!(media.probe_calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.put_attempts(), 0);
}

#[tokio::test]
async fn test_expired_deadline_stops_run() {
    let media = ScriptedMedia::new(30.0);
    let store = Arc::new(MemoryStore::new());
    let cancel = CancelToken::new().with_deadline(Instant::now());

    let err = pipeline(&media, &store)
        .run(submission(), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err.error, CoreError::Cancelled(_)));
    assert_eq!(store.put_attempts(), 0);
}

#[tokio::test]
async fn test_frame_failure_names_thumbnail_stage() {
    let media = ScriptedMedia::failing_at(200.0, 120);
    let store = Arc::new(MemoryStore::new());

    let err = pipeline(&media, &store)
        .run(submission(), &CancelToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Thumbnails);
    assert!(matches!(
        err.error,
        CoreError::FrameExtractionFailed {
            offset_secs: 120,
            ..
        }
    ));
    assert_eq!(store.put_attempts(), 0);
}

fn scratch_entries(root: &Path) -> usize {
    std::fs::read_dir(root).unwrap().count()
}

#[tokio::test]
async fn test_scratch_dir_removed_after_success() {
    let scratch_root = tempfile::tempdir().unwrap();
    let media = ScriptedMedia::new(125.5);
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(&media, &store).with_scratch_root(scratch_root.path());

    run_ok(&pipeline).await;

    assert_eq!(media.probe_calls.load(Ordering::SeqCst), 1);
    assert_eq!(scratch_entries(scratch_root.path()), 0);
}

#[tokio::test]
async fn test_scratch_dir_removed_after_thumbnail_failure() {
    let scratch_root = tempfile::tempdir().unwrap();
    let media = ScriptedMedia::failing_at(200.0, 60);
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(&media, &store).with_scratch_root(scratch_root.path());

    let err = pipeline
        .run(submission(), &CancelToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Thumbnails);
    assert_eq!(scratch_entries(scratch_root.path()), 0);
}

#[tokio::test]
async fn test_missing_scratch_root_fails_staging() {
    let dir = tempfile::tempdir().unwrap();
    let media = ScriptedMedia::new(10.0);
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(&media, &store).with_scratch_root(dir.path().join("missing"));

    let err = pipeline
        .run(submission(), &CancelToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Staging);
    assert_eq!(media.probe_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_media_path_names_inspect_stage() {
    let dir = tempfile::tempdir().unwrap();
    let media = ScriptedMedia::new(30.0);
    let store = Arc::new(MemoryStore::new());

    let submission = Submission::new(MediaSource::Path(dir.path().join("gone.mp4")), fields());
    let err = pipeline(&media, &store)
        .run(submission, &CancelToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Inspect);
    assert!(matches!(err.error, CoreError::MediaUnreadable(_)));
    assert_eq!(media.probe_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invalid_upload_name_names_staging_stage() {
    let media = ScriptedMedia::new(30.0);
    let store = Arc::new(MemoryStore::new());

    let submission = Submission::new(
        MediaSource::Bytes {
            file_name: "nested/clip.mp4".to_string(),
            bytes: vec![1],
        },
        fields(),
    );
    let err = pipeline(&media, &store)
        .run(submission, &CancelToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Staging);
    assert!(matches!(err.error, CoreError::ValidationError(_)));
}

#[tokio::test]
async fn test_rejected_credentials_name_publish_stage() {
    let media = ScriptedMedia::new(30.0);
    let store = Arc::new(MemoryStore::new());
    store.fail_next(StoreError::Denied("403 SignatureDoesNotMatch".into()));

    let err = pipeline(&media, &store)
        .run(submission(), &CancelToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Publish);
    assert!(matches!(err.error, CoreError::CredentialsUnavailable(_)));
    assert!(err.to_string().starts_with("publish stage failed"));
}

#[tokio::test]
async fn test_packager_builds_local_package_without_publisher() {
    let dir = tempfile::tempdir().unwrap();
    let media_path = dir.path().join("pilot.mp4");
    std::fs::write(&media_path, b"bytes").unwrap();
    let media = crate::core::MediaArtifact::from_path(&media_path).unwrap();

    let probe: Arc<dyn MediaProbe> = ScriptedMedia::new(59.9);
    let out = dir.path().join("out").join("pilot.zip");
    let prepared = Packager::new(probe)
        .prepare(&media, &fields(), &out, &CancelToken::new())
        .await
        .unwrap();

    assert!(out.is_file());
    assert_eq!(prepared.thumbnails.len(), 1);
    assert_eq!(
        prepared.package.entry_names(),
        ["adi.xml", "pilot.mp4", "thumbnail_0.png"]
    );
}
