//! Settings Persistence
//!
//! Packager settings with:
//! - Serde defaults for every section (partial files are fine)
//! - Tolerant normalization instead of hard validation failures
//! - Environment overlay for the storage target
//! - Atomic file writes (temp file + rename)
//!
//! Default location: {config_dir}/adipack/settings.json

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::adi::AmsTemplate;
use crate::core::assets::{
    default_capture_concurrency, DEFAULT_THUMBNAIL_INTERVAL_SECS, DEFAULT_THUMBNAIL_PREFIX,
    MAX_CAPTURE_CONCURRENCY,
};
use crate::core::fs::atomic_write_json_pretty;
use crate::core::package::DEFAULT_PACKAGE_NAME;
use crate::core::storage::{
    PublisherConfig, RetryPolicy, StorageCredentials, DEFAULT_BASE_DELAY_MS,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_STORAGE_DOMAIN, DEFAULT_STORAGE_TIMEOUT_SECS,
};
use crate::core::{CoreError, CoreResult};

/// Settings schema version
pub const SETTINGS_VERSION: u32 = 1;

/// Settings file name
pub const SETTINGS_FILE: &str = "settings.json";

/// Directory under the platform config dir
pub const SETTINGS_DIR: &str = "adipack";

pub const BUCKET_ENV: &str = "AWS_S3_BUCKET_NAME";
pub const REGION_ENV: &str = "AWS_REGION";
pub const ENDPOINT_ENV: &str = "AWS_ENDPOINT_URL";

/// Default object key of the uploaded descriptor
pub const DEFAULT_DESCRIPTOR_KEY: &str = "adi/adi.xml";

/// Packager settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PackagerSettings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub thumbnails: ThumbnailSettings,

    #[serde(default)]
    pub descriptor: DescriptorSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

impl Default for PackagerSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            thumbnails: ThumbnailSettings::default(),
            descriptor: DescriptorSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

impl PackagerSettings {
    /// Clamp and repair values so the settings are always usable.
    pub fn normalize(&mut self) {
        self.version = SETTINGS_VERSION;

        self.thumbnails.interval_secs = self.thumbnails.interval_secs.max(1);
        self.thumbnails.concurrency = self.thumbnails.concurrency.clamp(1, MAX_CAPTURE_CONCURRENCY);

        let defaults = DescriptorSettings::default();
        normalize_text(&mut self.descriptor.provider_id, &defaults.provider_id);
        normalize_text(&mut self.descriptor.version_major, &defaults.version_major);
        normalize_text(&mut self.descriptor.version_minor, &defaults.version_minor);
        normalize_text(&mut self.descriptor.product, &defaults.product);

        let storage = &mut self.storage;
        storage.bucket = storage.bucket.trim().to_string();
        storage.region = storage.region.trim().to_string();
        normalize_text(&mut storage.storage_domain, DEFAULT_STORAGE_DOMAIN);
        storage.storage_domain = storage.storage_domain.trim_matches('.').to_string();
        storage.endpoint = storage
            .endpoint
            .take()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());
        normalize_key(&mut storage.package_key, DEFAULT_PACKAGE_NAME);
        normalize_key(&mut storage.descriptor_key, DEFAULT_DESCRIPTOR_KEY);
        storage.thumbnail_prefix = storage.thumbnail_prefix.trim().trim_matches('/').to_string();
        storage.max_attempts = storage.max_attempts.clamp(1, 10);
        storage.base_delay_ms = storage.base_delay_ms.min(60_000);
        storage.timeout_secs = storage.timeout_secs.clamp(1, 3600);
    }

    /// Overlay the storage target from environment variables read via `lookup`.
    pub fn apply_env_overlay<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(bucket) = read(BUCKET_ENV) {
            self.storage.bucket = bucket;
        }
        if let Some(region) = read(REGION_ENV) {
            self.storage.region = region;
        }
        if let Some(endpoint) = read(ENDPOINT_ENV) {
            self.storage.endpoint = Some(endpoint);
        }
    }

    /// AMS header values for the descriptor
    pub fn ams_template(&self) -> AmsTemplate {
        AmsTemplate {
            provider_id: self.descriptor.provider_id.clone(),
            version_major: self.descriptor.version_major.clone(),
            version_minor: self.descriptor.version_minor.clone(),
            product: self.descriptor.product.clone(),
        }
    }

    /// Publisher configuration for these settings and `credentials`
    pub fn publisher_config(&self, credentials: Option<StorageCredentials>) -> PublisherConfig {
        let storage = &self.storage;
        PublisherConfig {
            bucket: storage.bucket.clone(),
            region: storage.region.clone(),
            storage_domain: storage.storage_domain.clone(),
            endpoint: storage.endpoint.clone(),
            credentials,
            retry: RetryPolicy::new(
                storage.max_attempts,
                Duration::from_millis(storage.base_delay_ms),
            ),
            timeout: Duration::from_secs(storage.timeout_secs),
        }
    }
}

fn normalize_text(value: &mut String, fallback: &str) {
    let trimmed = value.trim();
    *value = if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    };
}

fn normalize_key(value: &mut String, fallback: &str) {
    let trimmed = value.trim().trim_start_matches('/');
    *value = if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    };
}

/// Thumbnail capture settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailSettings {
    /// Seconds between captures
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Concurrent captures
    #[serde(default = "default_capture_concurrency")]
    pub concurrency: usize,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            concurrency: default_capture_concurrency(),
        }
    }
}

fn default_interval_secs() -> u64 {
    DEFAULT_THUMBNAIL_INTERVAL_SECS
}

/// Constant AMS header values
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct DescriptorSettings {
    pub provider_id: String,
    pub version_major: String,
    pub version_minor: String,
    pub product: String,
}

impl Default for DescriptorSettings {
    fn default() -> Self {
        let template = AmsTemplate::default();
        Self {
            provider_id: template.provider_id,
            version_major: template.version_major,
            version_minor: template.version_minor,
            product: template.product,
        }
    }
}

/// Object storage target and upload behavior
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorageSettings {
    #[serde(default)]
    pub bucket: String,

    #[serde(default)]
    pub region: String,

    #[serde(default = "default_storage_domain")]
    pub storage_domain: String,

    /// S3-compatible endpoint override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default = "default_package_key")]
    pub package_key: String,

    #[serde(default = "default_descriptor_key")]
    pub descriptor_key: String,

    #[serde(default = "default_thumbnail_prefix")]
    pub thumbnail_prefix: String,

    /// Also upload the descriptor as a standalone object
    #[serde(default = "default_true")]
    pub upload_descriptor: bool,

    /// Also upload each thumbnail as a standalone object
    #[serde(default)]
    pub upload_thumbnails: bool,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: String::new(),
            storage_domain: default_storage_domain(),
            endpoint: None,
            package_key: default_package_key(),
            descriptor_key: default_descriptor_key(),
            thumbnail_prefix: default_thumbnail_prefix(),
            upload_descriptor: true,
            upload_thumbnails: false,
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_storage_domain() -> String {
    DEFAULT_STORAGE_DOMAIN.to_string()
}

fn default_package_key() -> String {
    DEFAULT_PACKAGE_NAME.to_string()
}

fn default_descriptor_key() -> String {
    DEFAULT_DESCRIPTOR_KEY.to_string()
}

fn default_thumbnail_prefix() -> String {
    DEFAULT_THUMBNAIL_PREFIX.to_string()
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}

fn default_timeout_secs() -> u64 {
    DEFAULT_STORAGE_TIMEOUT_SECS
}

// =============================================================================
// Settings Manager
// =============================================================================

/// Loads and saves settings at one path
#[derive(Debug, Clone)]
pub struct SettingsManager {
    settings_path: PathBuf,
}

impl SettingsManager {
    pub fn new(settings_path: impl Into<PathBuf>) -> Self {
        Self {
            settings_path: settings_path.into(),
        }
    }

    /// Manager for the per-user default location, if the platform has one
    pub fn default_location() -> Option<Self> {
        dirs::config_dir().map(|dir| Self::new(dir.join(SETTINGS_DIR).join(SETTINGS_FILE)))
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    /// Load settings, failing if the file is missing or malformed.
    pub fn load_strict(&self) -> CoreResult<PackagerSettings> {
        let content = std::fs::read_to_string(&self.settings_path).map_err(|e| {
            CoreError::ValidationError(format!(
                "Failed to read settings file {}: {}",
                self.settings_path.display(),
                e
            ))
        })?;

        let mut settings: PackagerSettings = serde_json::from_str(&content)?;
        settings.normalize();
        Ok(settings)
    }

    /// Load settings, falling back to defaults when the file is missing or broken.
    pub fn load(&self) -> PackagerSettings {
        if !self.settings_path.exists() {
            info!("Settings file not found, using defaults");
            return PackagerSettings::default();
        }

        match self.load_strict() {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to load settings, using defaults: {}", e);
                PackagerSettings::default()
            }
        }
    }

    /// Normalize and persist `settings` atomically. Returns what was written.
    pub fn save(&self, settings: &PackagerSettings) -> CoreResult<PackagerSettings> {
        let mut normalized = settings.clone();
        normalized.normalize();
        atomic_write_json_pretty(&self.settings_path, &normalized)?;
        info!("Settings saved to {}", self.settings_path.display());
        Ok(normalized)
    }
}

/// Resolve settings the way the command line does: an explicit file must
/// load cleanly; otherwise the per-user file is used if present; otherwise
/// defaults. The environment overlay is applied last.
pub fn resolve_settings<F>(explicit: Option<&Path>, lookup: F) -> CoreResult<PackagerSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = match explicit {
        Some(path) => SettingsManager::new(path).load_strict()?,
        None => SettingsManager::default_location()
            .map(|m| m.load())
            .unwrap_or_default(),
    };
    settings.apply_env_overlay(lookup);
    settings.normalize();
    Ok(settings)
}
