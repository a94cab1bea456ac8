//! Thumbnail Generation Module
//!
//! Captures one PNG still per fixed interval of the source media.
//! Captures run concurrently on a bounded pool; the result is always
//! ordered by ascending offset.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::core::ffmpeg::MediaProbe;
use crate::core::{CoreError, CoreResult, TimeSec};

/// Default spacing between captures, in seconds
pub const DEFAULT_THUMBNAIL_INTERVAL_SECS: u64 = 60;

/// Default key prefix when thumbnails are stored directly in object storage
pub const DEFAULT_THUMBNAIL_PREFIX: &str = "thumbnails";

/// Upper bound on concurrent captures
pub const MAX_CAPTURE_CONCURRENCY: usize = 16;

/// Most captures a single media may need (a week at the default interval)
pub const MAX_THUMBNAIL_COUNT: u64 = 10_080;

/// One capture per CPU, within `1..=MAX_CAPTURE_CONCURRENCY`
pub fn default_capture_concurrency() -> usize {
    num_cpus::get().clamp(1, MAX_CAPTURE_CONCURRENCY)
}

/// A captured preview image
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailArtifact {
    /// Flat entry name, `thumbnail_{offset}.png`
    pub key: String,
    /// Capture offset in whole seconds
    pub timestamp_seconds: u64,
    /// PNG-encoded image
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl ThumbnailArtifact {
    pub fn new(timestamp_seconds: u64, bytes: Vec<u8>) -> Self {
        Self {
            key: thumbnail_key(timestamp_seconds),
            timestamp_seconds,
            bytes,
        }
    }

    /// Object storage key under `prefix` (e.g. `thumbnails/thumbnail_60.png`)
    pub fn storage_key(&self, prefix: &str) -> String {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            self.key.clone()
        } else {
            format!("{}/{}", prefix, self.key)
        }
    }
}

/// Entry name for a capture at `offset_secs`
pub fn thumbnail_key(offset_secs: u64) -> String {
    format!("thumbnail_{}.png", offset_secs)
}

/// Capture offsets for a media of `duration_sec`: `0, interval, 2*interval, ...`
/// up to and including `floor(duration_sec)`.
pub fn thumbnail_offsets(duration_sec: TimeSec, interval_secs: u64) -> CoreResult<Vec<u64>> {
    if !duration_sec.is_finite() || duration_sec < 0.0 {
        return Err(CoreError::ValidationError(format!(
            "Invalid media duration: {}",
            duration_sec
        )));
    }
    if interval_secs == 0 {
        return Err(CoreError::ValidationError(
            "Thumbnail interval must be at least 1 second".to_string(),
        ));
    }

    let last = duration_sec.floor() as u64;
    let count = last / interval_secs + 1;
    if count > MAX_THUMBNAIL_COUNT {
        return Err(CoreError::ValidationError(format!(
            "Media duration {}s needs {} thumbnails, limit is {}",
            duration_sec, count, MAX_THUMBNAIL_COUNT
        )));
    }
    Ok((0..=last).step_by(interval_secs as usize).collect())
}

/// Thumbnail generator bound to a probing backend
#[derive(Clone)]
pub struct ThumbnailGenerator {
    probe: Arc<dyn MediaProbe>,
    interval_secs: u64,
    concurrency: usize,
}

impl ThumbnailGenerator {
    /// Create a generator with the default interval and one worker per CPU
    pub fn new(probe: Arc<dyn MediaProbe>) -> Self {
        Self {
            probe,
            interval_secs: DEFAULT_THUMBNAIL_INTERVAL_SECS,
            concurrency: default_capture_concurrency(),
        }
    }

    /// Override the capture interval
    pub fn with_interval(mut self, interval_secs: u64) -> Self {
        self.interval_secs = interval_secs.max(1);
        self
    }

    /// Override the number of concurrent captures
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, MAX_CAPTURE_CONCURRENCY);
        self
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    /// Capture every thumbnail for `input`.
    ///
    /// All-or-nothing: the first failed capture aborts the outstanding ones
    /// and is returned as [`CoreError::FrameExtractionFailed`].
    pub async fn generate(
        &self,
        input: &Path,
        duration_sec: TimeSec,
    ) -> CoreResult<Vec<ThumbnailArtifact>> {
        let offsets = thumbnail_offsets(duration_sec, self.interval_secs)?;
        tracing::info!(
            "Capturing {} thumbnail(s) from {} ({} concurrent)",
            offsets.len(),
            input.display(),
            self.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for offset in offsets.iter().copied() {
            let probe = Arc::clone(&self.probe);
            let semaphore = Arc::clone(&semaphore);
            let input: PathBuf = input.to_path_buf();

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| CoreError::Internal(format!("Capture pool closed: {}", e)))?;

                tracing::debug!("Capturing frame at {}s", offset);
                let bytes = probe.extract_frame(&input, offset).await.map_err(|e| {
                    CoreError::FrameExtractionFailed {
                        offset_secs: offset,
                        reason: e.to_string(),
                    }
                })?;
                Ok::<_, CoreError>(ThumbnailArtifact::new(offset, bytes))
            });
        }

        let mut artifacts = Vec::with_capacity(offsets.len());
        while let Some(joined) = tasks.join_next().await {
            let result = joined
                .map_err(|e| CoreError::Internal(format!("Capture task failed: {}", e)))
                .and_then(|r| r);

            match result {
                Ok(artifact) => artifacts.push(artifact),
                Err(e) => {
                    tasks.abort_all();
                    tracing::warn!("Thumbnail capture aborted: {}", e);
                    return Err(e);
                }
            }
        }

        artifacts.sort_by_key(|a| a.timestamp_seconds);
        Ok(artifacts)
    }
}
