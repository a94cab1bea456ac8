//! Probe result types

use serde::{Deserialize, Serialize};

use crate::core::TimeSec;

/// Elementary stream kind as reported by the probe.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CodecType {
    Video,
    Audio,
    /// Any other kind; keeps the probe's label (`subtitle`, `data`, ...)
    Other(String),
}

impl CodecType {
    /// Label used when naming descriptor entries (`video`, `audio`, `subtitle`, ...).
    pub fn label(&self) -> &str {
        match self {
            CodecType::Video => "video",
            CodecType::Audio => "audio",
            CodecType::Other(label) => label,
        }
    }

    pub(crate) fn from_label(label: Option<&str>) -> Self {
        match label {
            Some("video") => CodecType::Video,
            Some("audio") => CodecType::Audio,
            Some(other) if !other.is_empty() => CodecType::Other(other.to_string()),
            _ => CodecType::Other("unknown".to_string()),
        }
    }
}

/// One elementary stream of the container.
///
/// `width`/`height` are only populated for video and `channels` only for
/// audio; anything the probe did not report stays `None`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    pub codec_type: CodecType,
    /// Codec name (e.g., "h264", "aac"), empty when unknown
    pub codec_name: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub channels: Option<u32>,
}

impl StreamInfo {
    pub fn video(codec: impl Into<String>, width: Option<u32>, height: Option<u32>) -> Self {
        Self {
            codec_type: CodecType::Video,
            codec_name: codec.into(),
            width,
            height,
            channels: None,
        }
    }

    pub fn audio(codec: impl Into<String>, channels: Option<u32>) -> Self {
        Self {
            codec_type: CodecType::Audio,
            codec_name: codec.into(),
            width: None,
            height: None,
            channels,
        }
    }
}

/// Technical metadata of a media file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    /// Container format (e.g., "mov,mp4,m4a,3gp,3g2,mj2")
    pub format_name: String,
    /// Duration in seconds, always finite and >= 0
    pub duration_seconds: TimeSec,
    /// Overall bitrate in bits/s (if known)
    pub bit_rate_bps: Option<u64>,
    /// Streams in container order
    pub streams: Vec<StreamInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_type_labels() {
        assert_eq!(CodecType::from_label(Some("video")), CodecType::Video);
        assert_eq!(CodecType::from_label(Some("audio")), CodecType::Audio);
        assert_eq!(
            CodecType::from_label(Some("subtitle")).label(),
            "subtitle"
        );
        assert_eq!(CodecType::from_label(None).label(), "unknown");
        assert_eq!(CodecType::from_label(Some("")).label(), "unknown");
    }

    #[test]
    fn test_probe_result_serializes_camel_case() {
        let probe = ProbeResult {
            format_name: "mp4".into(),
            duration_seconds: 1.5,
            bit_rate_bps: None,
            streams: vec![StreamInfo::audio("aac", Some(2))],
        };
        let json = serde_json::to_value(&probe).unwrap();
        assert_eq!(json["formatName"], "mp4");
        assert_eq!(json["durationSeconds"], 1.5);
        assert!(json["bitRateBps"].is_null());
        assert_eq!(json["streams"][0]["codecName"], "aac");
    }
}
