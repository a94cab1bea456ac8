//! ADI document model and its canonical XML form

use std::borrow::Cow;

use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};
use serde::{Deserialize, Serialize};

use crate::core::{CoreError, CoreResult};

/// `ADI@version`
pub const ADI_VERSION: &str = "1.1";

/// `Asset@Asset_Class`
pub const ASSET_CLASS: &str = "title";

/// Names of the container-level facts; they open the media section.
pub const APP_DATA_DURATION: &str = "Duration";
pub const APP_DATA_BITRATE: &str = "Bitrate";
pub const APP_DATA_FORMAT: &str = "Format";

/// `AMS` header element
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ams {
    pub provider_id: String,
    pub asset_name: String,
    pub version_major: String,
    pub version_minor: String,
    pub product: String,
}

/// One `App_Data` name/value pair
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppData {
    pub name: String,
    pub value: String,
}

impl AppData {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// ADI 1.1 descriptor.
///
/// `fields` holds the user-supplied entries and `media` the entries derived
/// from the probe. Both keep insertion order; `fields` is always rendered
/// first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub ams: Ams,
    pub fields: Vec<AppData>,
    pub media: Vec<AppData>,
}

impl Descriptor {
    /// Every `App_Data` entry in document order
    pub fn app_data(&self) -> impl Iterator<Item = &AppData> {
        self.fields.iter().chain(self.media.iter())
    }

    /// Value of the first entry called `name`
    pub fn value_of(&self, name: &str) -> Option<&str> {
        self.app_data()
            .find(|d| d.name == name)
            .map(|d| d.value.as_str())
    }

    /// Render the canonical XML text (declaration, no indentation).
    pub fn to_xml(&self) -> CoreResult<String> {
        let mut writer = Writer::new(Vec::new());

        write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        write(
            &mut writer,
            Event::Start(BytesStart::new("ADI").with_attributes([attr("version", ADI_VERSION)])),
        )?;
        write(
            &mut writer,
            Event::Start(
                BytesStart::new("Asset").with_attributes([attr("Asset_Class", ASSET_CLASS)]),
            ),
        )?;
        write(&mut writer, Event::Start(BytesStart::new("Metadata")))?;

        write(
            &mut writer,
            Event::Empty(BytesStart::new("AMS").with_attributes([
                attr("Provider_ID", &self.ams.provider_id),
                attr("Asset_Name", &self.ams.asset_name),
                attr("Version_Major", &self.ams.version_major),
                attr("Version_Minor", &self.ams.version_minor),
                attr("Product", &self.ams.product),
            ])),
        )?;

        for data in self.app_data() {
            write(
                &mut writer,
                Event::Empty(
                    BytesStart::new("App_Data")
                        .with_attributes([attr("Name", &data.name), attr("Value", &data.value)]),
                ),
            )?;
        }

        write(&mut writer, Event::End(BytesEnd::new("Metadata")))?;
        write(&mut writer, Event::End(BytesEnd::new("Asset")))?;
        write(&mut writer, Event::End(BytesEnd::new("ADI")))?;

        String::from_utf8(writer.into_inner())
            .map_err(|e| CoreError::Internal(format!("Descriptor is not UTF-8: {}", e)))
    }

    /// Parse a descriptor previously produced by [`to_xml`](Self::to_xml).
    ///
    /// The media section starts at the last `Duration`, `Bitrate`, `Format`
    /// run; everything before it is a user field.
    pub fn from_xml(xml: &str) -> CoreResult<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut saw_root = false;
        let mut ams: Option<Ams> = None;
        let mut entries: Vec<AppData> = Vec::new();

        loop {
            let event = reader
                .read_event()
                .map_err(|e| invalid(format!("Malformed XML: {}", e)))?;

            match event {
                Event::Start(e) | Event::Empty(e) => match e.name().as_ref() {
                    b"ADI" => {
                        let version = required_attr(&e, "version")?;
                        if version != ADI_VERSION {
                            return Err(invalid(format!("Unsupported ADI version {}", version)));
                        }
                        saw_root = true;
                    }
                    b"Asset" => {
                        let class = required_attr(&e, "Asset_Class")?;
                        if class != ASSET_CLASS {
                            return Err(invalid(format!("Unexpected Asset_Class {}", class)));
                        }
                    }
                    b"AMS" => {
                        ams = Some(Ams {
                            provider_id: required_attr(&e, "Provider_ID")?,
                            asset_name: required_attr(&e, "Asset_Name")?,
                            version_major: required_attr(&e, "Version_Major")?,
                            version_minor: required_attr(&e, "Version_Minor")?,
                            product: required_attr(&e, "Product")?,
                        });
                    }
                    b"App_Data" => {
                        entries.push(AppData::new(
                            required_attr(&e, "Name")?,
                            required_attr(&e, "Value")?,
                        ));
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }

        if !saw_root {
            return Err(invalid("Missing ADI root element".to_string()));
        }
        let ams = ams.ok_or_else(|| invalid("Missing AMS element".to_string()))?;

        let split = media_section_start(&entries).unwrap_or(entries.len());
        let media = entries.split_off(split);

        Ok(Self {
            ams,
            fields: entries,
            media,
        })
    }
}

fn media_section_start(entries: &[AppData]) -> Option<usize> {
    entries.windows(3).rposition(|w| {
        w[0].name == APP_DATA_DURATION && w[1].name == APP_DATA_BITRATE && w[2].name == APP_DATA_FORMAT
    })
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> CoreResult<()> {
    writer
        .write_event(event)
        .map_err(|e| CoreError::Internal(format!("Failed to write descriptor XML: {}", e)))
}

/// Attribute with standard escaping plus character references for tab, CR
/// and LF so they survive attribute-value normalization in other parsers.
/// Characters XML 1.0 cannot carry at all are dropped.
fn attr<'a>(key: &'a str, value: &str) -> Attribute<'a> {
    let value: String = value.chars().filter(|&c| is_xml_char(c)).collect();
    let escaped = quick_xml::escape::escape(&value)
        .replace('\t', "&#9;")
        .replace('\n', "&#10;")
        .replace('\r', "&#13;");
    Attribute {
        key: QName(key.as_bytes()),
        value: Cow::Owned(escaped.into_bytes()),
    }
}

fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{FFFD}' | '\u{10000}'..)
}

fn required_attr(element: &BytesStart<'_>, key: &str) -> CoreResult<String> {
    let element_name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
    let attribute = element
        .try_get_attribute(key)
        .map_err(|e| invalid(format!("Bad attribute on {}: {}", element_name, e)))?
        .ok_or_else(|| invalid(format!("{} is missing {}", element_name, key)))?;

    attribute
        .unescape_value()
        .map(|v| v.into_owned())
        .map_err(|e| invalid(format!("Bad {} value on {}: {}", key, element_name, e)))
}

fn invalid(message: String) -> CoreError {
    CoreError::ValidationError(format!("Invalid ADI descriptor: {}", message))
}
