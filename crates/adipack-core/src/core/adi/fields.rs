//! Descriptive fields supplied with a submission

use serde::{Deserialize, Serialize};

use crate::core::{CoreError, CoreResult};

pub const FIELD_TITLE: &str = "Title";
pub const FIELD_ORIGINAL_TITLE: &str = "Original_Title";
pub const FIELD_SUMMARY_SHORT: &str = "Summary_Short";
pub const FIELD_SUMMARY_LONG: &str = "Summary_Long";

/// Keys every submission must carry, in descriptor order
pub const REQUIRED_FIELDS: [&str; 4] = [
    FIELD_TITLE,
    FIELD_ORIGINAL_TITLE,
    FIELD_SUMMARY_SHORT,
    FIELD_SUMMARY_LONG,
];

/// Ordered, key-unique bag of descriptive fields.
///
/// The four required keys always exist. Extra keys keep insertion order so
/// the generated descriptor is reproducible.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(String, String)>", into = "Vec<(String, String)>")]
pub struct DescriptiveFields {
    entries: Vec<(String, String)>,
}

impl DescriptiveFields {
    pub fn new(
        title: impl Into<String>,
        original_title: impl Into<String>,
        summary_short: impl Into<String>,
        summary_long: impl Into<String>,
    ) -> Self {
        Self {
            entries: vec![
                (FIELD_TITLE.to_string(), title.into()),
                (FIELD_ORIGINAL_TITLE.to_string(), original_title.into()),
                (FIELD_SUMMARY_SHORT.to_string(), summary_short.into()),
                (FIELD_SUMMARY_LONG.to_string(), summary_long.into()),
            ],
        }
    }

    /// Builds a bag from arbitrary pairs, validating the required keys.
    ///
    /// Duplicate keys collapse onto the first occurrence's position with the
    /// last value.
    pub fn from_pairs<I, K, V>(pairs: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut fields = Self { entries: Vec::new() };
        for (key, value) in pairs {
            fields.insert(key, value)?;
        }

        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|k| fields.get(k).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(CoreError::ValidationError(format!(
                "Missing required descriptive field(s): {}",
                missing.join(", ")
            )));
        }

        Ok(fields)
    }

    /// Insert or replace a field. Replacing keeps the original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> CoreResult<()> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "Descriptive field name is empty".to_string(),
            ));
        }

        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> CoreResult<Self> {
        self.insert(key, value)?;
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The asset title; always present.
    pub fn title(&self) -> &str {
        self.get(FIELD_TITLE).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TryFrom<Vec<(String, String)>> for DescriptiveFields {
    type Error = CoreError;

    fn try_from(pairs: Vec<(String, String)>) -> Result<Self, Self::Error> {
        Self::from_pairs(pairs)
    }
}

impl From<DescriptiveFields> for Vec<(String, String)> {
    fn from(fields: DescriptiveFields) -> Self {
        fields.entries
    }
}
