//! Media Inspector
//!
//! Turns raw ffprobe JSON into a [`ProbeResult`].

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use super::{CodecType, ProbeResult, StreamInfo};
use crate::core::ffmpeg::MediaProbe;
use crate::core::{CoreError, CoreResult};

// =============================================================================
// FFprobe JSON Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct FFprobeOutput {
    #[serde(default)]
    streams: Vec<FFprobeStream>,
    format: Option<FFprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FFprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    channels: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct FFprobeFormat {
    duration: Option<Scalar>,
    format_name: Option<String>,
    bit_rate: Option<Scalar>,
}

/// ffprobe prints most numbers as strings, some wrappers emit real numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(f64),
}

impl Scalar {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Text(s) => s.trim().parse().ok(),
            Scalar::Number(n) => Some(*n),
        }
    }

    fn as_u64(&self) -> Option<u64> {
        match self {
            Scalar::Text(s) => s.trim().parse().ok(),
            Scalar::Number(n) if n.is_finite() && *n >= 0.0 => Some(*n as u64),
            Scalar::Number(_) => None,
        }
    }
}

// =============================================================================
// Inspector
// =============================================================================

/// Read-only probe of a media file
#[derive(Clone)]
pub struct MediaInspector {
    probe: Arc<dyn MediaProbe>,
}

impl MediaInspector {
    pub fn new(probe: Arc<dyn MediaProbe>) -> Self {
        Self { probe }
    }

    /// Probe `input` and return its container/stream metadata.
    ///
    /// Fails with [`CoreError::MediaUnreadable`] when the file cannot be
    /// probed or carries no usable container metadata (including duration).
    pub async fn inspect(&self, input: &Path) -> CoreResult<ProbeResult> {
        if !input.is_file() {
            return Err(CoreError::MediaUnreadable(format!(
                "File not found: {}",
                input.display()
            )));
        }

        let raw = self
            .probe
            .probe(input)
            .await
            .map_err(|e| CoreError::MediaUnreadable(format!("{}: {}", input.display(), e)))?;

        let result = parse_probe_output(&raw)?;
        tracing::debug!(
            "Probed {}: format={}, duration={}s, streams={}",
            input.display(),
            result.format_name,
            result.duration_seconds,
            result.streams.len()
        );
        Ok(result)
    }
}

/// Parse FFprobe JSON output into a [`ProbeResult`]
pub fn parse_probe_output(json: &str) -> CoreResult<ProbeResult> {
    let output: FFprobeOutput = serde_json::from_str(json).map_err(|e| {
        CoreError::MediaUnreadable(format!("Failed to parse ffprobe output: {}", e))
    })?;

    let format = output
        .format
        .ok_or_else(|| CoreError::MediaUnreadable("No container metadata".to_string()))?;

    let duration_seconds = format
        .duration
        .as_ref()
        .and_then(Scalar::as_f64)
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| CoreError::MediaUnreadable("Duration unavailable".to_string()))?;

    let streams = output
        .streams
        .into_iter()
        .map(|stream| {
            let codec_type = CodecType::from_label(stream.codec_type.as_deref());
            let is_video = codec_type == CodecType::Video;
            let is_audio = codec_type == CodecType::Audio;
            StreamInfo {
                codec_name: stream.codec_name.unwrap_or_default(),
                width: stream.width.filter(|_| is_video),
                height: stream.height.filter(|_| is_video),
                channels: stream.channels.filter(|_| is_audio),
                codec_type,
            }
        })
        .collect();

    Ok(ProbeResult {
        format_name: format.format_name.unwrap_or_default(),
        duration_seconds,
        bit_rate_bps: format.bit_rate.as_ref().and_then(Scalar::as_u64),
        streams,
    })
}
