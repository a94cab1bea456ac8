//! Descriptor Synthesizer
//!
//! Pure mapping from descriptive fields + probe result to a [`Descriptor`].

use serde::{Deserialize, Serialize};

use super::{
    AppData, Ams, DescriptiveFields, Descriptor, APP_DATA_BITRATE, APP_DATA_DURATION,
    APP_DATA_FORMAT,
};
use crate::core::assets::{CodecType, ProbeResult};

/// Constant part of the `AMS` header
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmsTemplate {
    pub provider_id: String,
    pub version_major: String,
    pub version_minor: String,
    pub product: String,
}

impl Default for AmsTemplate {
    fn default() -> Self {
        Self {
            provider_id: "provider_id".to_string(),
            version_major: "1".to_string(),
            version_minor: "1".to_string(),
            product: "VOD".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct DescriptorSynthesizer {
    template: AmsTemplate,
}

impl DescriptorSynthesizer {
    pub fn new(template: AmsTemplate) -> Self {
        Self { template }
    }

    /// Build the descriptor. Same input, same output, no I/O.
    pub fn synthesize(&self, fields: &DescriptiveFields, probe: &ProbeResult) -> Descriptor {
        let ams = Ams {
            provider_id: self.template.provider_id.clone(),
            asset_name: fields.title().to_string(),
            version_major: self.template.version_major.clone(),
            version_minor: self.template.version_minor.clone(),
            product: self.template.product.clone(),
        };

        let user_fields = fields.iter().map(|(k, v)| AppData::new(k, v)).collect();

        let mut media = vec![
            AppData::new(APP_DATA_DURATION, probe.duration_seconds.to_string()),
            AppData::new(APP_DATA_BITRATE, optional(probe.bit_rate_bps)),
            AppData::new(APP_DATA_FORMAT, probe.format_name.as_str()),
        ];

        for stream in &probe.streams {
            let label = stream.codec_type.label();
            media.push(AppData::new(
                format!("{label}_Codec"),
                stream.codec_name.as_str(),
            ));
            match stream.codec_type {
                CodecType::Video => {
                    media.push(AppData::new("video_Width", optional(stream.width)));
                    media.push(AppData::new("video_Height", optional(stream.height)));
                }
                CodecType::Audio => {
                    media.push(AppData::new("audio_Channels", optional(stream.channels)));
                }
                CodecType::Other(_) => {}
            }
        }

        Descriptor {
            ams,
            fields: user_fields,
            media,
        }
    }
}

/// Unknown values render as an empty string so the schema shape never changes
fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::assets::StreamInfo;

    fn probe() -> ProbeResult {
        ProbeResult {
            format_name: "mov,mp4,m4a,3gp,3g2,mj2".into(),
            duration_seconds: 10.5,
            bit_rate_bps: Some(4_500_000),
            streams: vec![
                StreamInfo::video("h264", Some(1920), Some(1080)),
                StreamInfo::audio("aac", Some(2)),
            ],
        }
    }

    fn fields() -> DescriptiveFields {
        DescriptiveFields::new("Episode 01", "Episodio 01", "Short", "Long")
    }

    fn names(descriptor: &Descriptor) -> Vec<&str> {
        descriptor.app_data().map(|d| d.name.as_str()).collect()
    }

    #[test]
    fn test_entry_order() {
        let descriptor = DescriptorSynthesizer::default().synthesize(&fields(), &probe());
        assert_eq!(
            names(&descriptor),
            vec![
                "Title",
                "Original_Title",
                "Summary_Short",
                "Summary_Long",
                "Duration",
                "Bitrate",
                "Format",
                "video_Codec",
                "video_Width",
                "video_Height",
                "audio_Codec",
                "audio_Channels",
            ]
        );
    }

    #[test]
    fn test_stream_facts() {
        let descriptor = DescriptorSynthesizer::default().synthesize(&fields(), &probe());
        assert_eq!(descriptor.value_of("video_Codec"), Some("h264"));
        assert_eq!(descriptor.value_of("video_Width"), Some("1920"));
        assert_eq!(descriptor.value_of("video_Height"), Some("1080"));
        assert_eq!(descriptor.value_of("audio_Codec"), Some("aac"));
        assert_eq!(descriptor.value_of("audio_Channels"), Some("2"));
        assert_eq!(descriptor.value_of("audio_Width"), None);
        assert_eq!(descriptor.value_of("audio_Height"), None);
        assert_eq!(descriptor.value_of("video_Channels"), None);
    }

    #[test]
    fn test_container_facts() {
        let descriptor = DescriptorSynthesizer::default().synthesize(&fields(), &probe());
        assert_eq!(descriptor.value_of("Duration"), Some("10.5"));
        assert_eq!(descriptor.value_of("Bitrate"), Some("4500000"));
        assert_eq!(descriptor.value_of("Format"), Some("mov,mp4,m4a,3gp,3g2,mj2"));
    }

    #[test]
    fn test_asset_name_is_title_verbatim() {
        let descriptor = DescriptorSynthesizer::default().synthesize(&fields(), &probe());
        assert_eq!(descriptor.ams.asset_name, "Episode 01");
        assert_eq!(descriptor.ams.product, "VOD");

        let xml = descriptor.to_xml().unwrap();
        let parsed = Descriptor::from_xml(&xml).unwrap();
        assert_eq!(parsed.ams.asset_name, "Episode 01");
    }

    #[test]
    fn test_asset_name_with_markup_characters() {
        let fields = DescriptiveFields::new("Tom & Jerry <Special>", "x", "y", "z");
        let descriptor = DescriptorSynthesizer::default().synthesize(&fields, &probe());
        let parsed = Descriptor::from_xml(&descriptor.to_xml().unwrap()).unwrap();
        assert_eq!(parsed.ams.asset_name, "Tom & Jerry <Special>");
    }

    #[test]
    fn test_missing_attributes_serialize_empty() {
        let mut probe = probe();
        probe.bit_rate_bps = None;
        probe.streams = vec![
            StreamInfo::video("h264", None, Some(720)),
            StreamInfo::audio("opus", None),
        ];

        let descriptor = DescriptorSynthesizer::default().synthesize(&fields(), &probe);
        assert_eq!(descriptor.value_of("Bitrate"), Some(""));
        assert_eq!(descriptor.value_of("video_Width"), Some(""));
        assert_eq!(descriptor.value_of("video_Height"), Some("720"));
        assert_eq!(descriptor.value_of("audio_Channels"), Some(""));
    }

    #[test]
    fn test_other_stream_types_emit_codec_only() {
        let mut probe = probe();
        probe.streams = vec![StreamInfo {
            codec_type: CodecType::Other("subtitle".into()),
            codec_name: "mov_text".into(),
            width: None,
            height: None,
            channels: None,
        }];

        let descriptor = DescriptorSynthesizer::default().synthesize(&fields(), &probe);
        assert_eq!(descriptor.media.len(), 4);
        assert_eq!(descriptor.value_of("subtitle_Codec"), Some("mov_text"));
    }

    #[test]
    fn test_one_entry_set_per_stream() {
        let mut probe = probe();
        probe.streams.push(StreamInfo::audio("ac3", Some(6)));

        let descriptor = DescriptorSynthesizer::default().synthesize(&fields(), &probe);
        let channels: Vec<&str> = descriptor
            .app_data()
            .filter(|d| d.name == "audio_Channels")
            .map(|d| d.value.as_str())
            .collect();
        assert_eq!(channels, vec!["2", "6"]);
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let synthesizer = DescriptorSynthesizer::default();
        let fields = fields().with("Genre", "Drama").unwrap();
        let a = synthesizer.synthesize(&fields, &probe()).to_xml().unwrap();
        let b = synthesizer.synthesize(&fields, &probe()).to_xml().unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_custom_template() {
        let synthesizer = DescriptorSynthesizer::new(AmsTemplate {
            provider_id: "acme".into(),
            version_major: "2".into(),
            version_minor: "0".into(),
            product: "SVOD".into(),
        });
        let descriptor = synthesizer.synthesize(&fields(), &probe());
        assert_eq!(descriptor.ams.provider_id, "acme");
        assert_eq!(descriptor.ams.product, "SVOD");
    }
}
