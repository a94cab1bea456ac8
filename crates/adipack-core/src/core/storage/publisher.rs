//! Publisher
//!
//! Uploads artifacts to the configured bucket with bounded retries and
//! hands back the public URL of each stored object.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use reqwest::Url;

use super::{
    content_type_for, parse_endpoint, path_style_location, signing, ObjectStore, S3Store,
    StorageCredentials,
};
use crate::core::{ArtifactSource, CoreError, CoreResult};

/// Domain of the public S3 endpoint
pub const DEFAULT_STORAGE_DOMAIN: &str = "amazonaws.com";

/// Total attempts per operation (first try included)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (milliseconds)
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Default HTTP timeout per request (seconds)
pub const DEFAULT_STORAGE_TIMEOUT_SECS: u64 = 300;

// =============================================================================
// Configuration
// =============================================================================

/// Bounded exponential backoff for transient storage failures
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay after the failed attempt number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Everything the publisher needs to reach its bucket
#[derive(Clone, Debug)]
pub struct PublisherConfig {
    pub bucket: String,
    pub region: String,
    pub storage_domain: String,
    /// S3-compatible endpoint override (path-style addressing)
    pub endpoint: Option<String>,
    pub credentials: Option<StorageCredentials>,
    pub retry: RetryPolicy,
    pub timeout: Duration,
}

impl PublisherConfig {
    pub fn new(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
            storage_domain: DEFAULT_STORAGE_DOMAIN.to_string(),
            endpoint: None,
            credentials: None,
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(DEFAULT_STORAGE_TIMEOUT_SECS),
        }
    }

    pub fn with_credentials(mut self, credentials: StorageCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    fn validate_target(&self) -> CoreResult<()> {
        if self.bucket.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "Storage bucket is not configured".to_string(),
            ));
        }
        if self.region.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "Storage region is not configured".to_string(),
            ));
        }
        Ok(())
    }
}

/// A stored object and where to find it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedArtifact {
    pub bucket: String,
    pub key: String,
    pub url: String,
}

/// Public URL of an object: `https://{bucket}.s3.{region}.{domain}/{key}`
pub fn object_url(bucket: &str, region: &str, storage_domain: &str, key: &str) -> String {
    format!(
        "https://{}.s3.{}.{}/{}",
        bucket,
        region,
        storage_domain,
        signing::uri_encode(key, false)
    )
}

// =============================================================================
// Publisher
// =============================================================================

pub struct Publisher {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    region: String,
    storage_domain: String,
    endpoint: Option<Url>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("storage_domain", &self.storage_domain)
            .field("endpoint", &self.endpoint.as_ref().map(Url::as_str))
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Publisher {
    /// Build a publisher backed by [`S3Store`].
    ///
    /// Fails up front with `CredentialsUnavailable` when no credentials are
    /// configured, so nothing is processed only to fail at upload time.
    pub fn new(config: PublisherConfig) -> CoreResult<Self> {
        config.validate_target()?;
        let credentials = config.credentials.clone().ok_or_else(|| {
            CoreError::CredentialsUnavailable(
                "No storage credentials configured (AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY)"
                    .to_string(),
            )
        })?;

        let mut store = S3Store::new(
            credentials,
            config.region.clone(),
            config.storage_domain.clone(),
            config.timeout,
        )?;
        if let Some(endpoint) = &config.endpoint {
            store = store.with_endpoint(endpoint)?;
        }

        Self::with_store(config, Arc::new(store))
    }

    /// Build a publisher on top of any [`ObjectStore`].
    pub fn with_store(config: PublisherConfig, store: Arc<dyn ObjectStore>) -> CoreResult<Self> {
        config.validate_target()?;
        let endpoint = config.endpoint.as_deref().map(parse_endpoint).transpose()?;
        Ok(Self {
            store,
            bucket: config.bucket,
            region: config.region,
            storage_domain: config.storage_domain,
            endpoint,
            retry: config.retry,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Public URL for `key`. Pure; does not check the object exists.
    ///
    /// With an endpoint override this is the path-style URL the object was
    /// written to.
    pub fn url_for(&self, key: &str) -> String {
        match &self.endpoint {
            Some(endpoint) => path_style_location(endpoint, &self.bucket, key).url,
            None => object_url(&self.bucket, &self.region, &self.storage_domain, key),
        }
    }

    /// Upload `source` under `key`, retrying transient failures.
    pub async fn publish(&self, source: ArtifactSource, key: &str) -> CoreResult<PublishedArtifact> {
        validate_key(key)?;
        let body = source.read().await?;
        let content_type = content_type_for(key);
        let size = body.len();

        self.execute_with_retry("upload", key, || {
            let store = Arc::clone(&self.store);
            let body = body.clone();
            async move {
                store
                    .put_object(&self.bucket, key, body, content_type)
                    .await
                    .map_err(CoreError::from)
            }
        })
        .await?;

        let url = self.url_for(key);
        info!("Published {} ({} bytes) to {}", key, size, url);

        Ok(PublishedArtifact {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            url,
        })
    }

    /// Read an object back, retrying transient failures.
    pub async fn fetch(&self, key: &str) -> CoreResult<Vec<u8>> {
        validate_key(key)?;
        self.execute_with_retry("download", key, || {
            let store = Arc::clone(&self.store);
            async move {
                store
                    .get_object(&self.bucket, key)
                    .await
                    .map_err(CoreError::from)
            }
        })
        .await
    }

    async fn execute_with_retry<F, Fut, T>(&self, operation: &str, key: &str, f: F) -> CoreResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = CoreResult<T>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);

        for attempt in 0..max_attempts {
            debug!("Storage {} {} attempt {}", operation, key, attempt + 1);
            match f().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !e.is_retryable() || attempt + 1 == max_attempts {
                        return Err(e);
                    }

                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "Storage {} of {} attempt {} failed, retrying in {}ms: {}",
                        operation,
                        key,
                        attempt + 1,
                        delay.as_millis(),
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(CoreError::Internal(format!(
            "Storage {} of {} failed after {} attempts",
            operation, key, max_attempts
        )))
    }
}

fn validate_key(key: &str) -> CoreResult<()> {
    if key.trim().is_empty() {
        return Err(CoreError::ValidationError("Object key is empty".to_string()));
    }
    if key.starts_with('/') {
        return Err(CoreError::ValidationError(format!(
            "Object key must not start with '/': {}",
            key
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::{MemoryStore, StoreError};

    fn fast_config() -> PublisherConfig {
        PublisherConfig::new("media-bucket", "us-east-1")
            .with_retry(RetryPolicy::new(3, Duration::from_millis(1)))
    }

    fn publisher(store: &Arc<MemoryStore>) -> Publisher {
        Publisher::with_store(fast_config(), store.clone()).unwrap()
    }

    #[test]
    fn test_url_for_is_pure_formula() {
        let store = Arc::new(MemoryStore::new());
        let publisher = publisher(&store);
        assert_eq!(
            publisher.url_for("output.zip"),
            "https://media-bucket.s3.us-east-1.amazonaws.com/output.zip"
        );
        assert_eq!(
            publisher.url_for("thumbnails/thumbnail_60.png"),
            "https://media-bucket.s3.us-east-1.amazonaws.com/thumbnails/thumbnail_60.png"
        );
        assert_eq!(store.put_attempts(), 0);
    }

    #[tokio::test]
    async fn test_endpoint_override_urls_match_stored_location() {
        let store = Arc::new(MemoryStore::new());
        let config = fast_config().with_endpoint("http://localhost:9000/");
        let publisher = Publisher::with_store(config, store.clone()).unwrap();

        assert_eq!(
            publisher.url_for("output.zip"),
            "http://localhost:9000/media-bucket/output.zip"
        );

        let published = publisher
            .publish(ArtifactSource::Bytes(vec![1]), "thumbnails/thumbnail_0.png")
            .await
            .unwrap();
        assert_eq!(
            published.url,
            "http://localhost:9000/media-bucket/thumbnails/thumbnail_0.png"
        );

        let s3 = S3Store::new(
            StorageCredentials::new("AKIDEXAMPLE", "secret"),
            "us-east-1",
            DEFAULT_STORAGE_DOMAIN,
            Duration::from_secs(5),
        )
        .unwrap()
        .with_endpoint("http://localhost:9000/")
        .unwrap();
        assert_eq!(
            s3.location("media-bucket", "output.zip").url,
            publisher.url_for("output.zip")
        );
    }

    #[test]
    fn test_invalid_endpoint_rejected_by_publisher() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let config = fast_config().with_endpoint("not a url");
        let err = Publisher::with_store(config, store).unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }

    #[test]
    fn test_new_without_credentials_fails_eagerly() {
        let err = Publisher::new(PublisherConfig::new("b", "us-east-1")).unwrap_err();
        assert!(matches!(err, CoreError::CredentialsUnavailable(_)));
    }

    #[test]
    fn test_missing_bucket_rejected() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let err = Publisher::with_store(PublisherConfig::new(" ", "us-east-1"), store).unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }

    #[test]
    fn test_retry_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_publish_bytes() {
        let store = Arc::new(MemoryStore::new());
        let published = publisher(&store)
            .publish(ArtifactSource::Bytes(b"<ADI/>".to_vec()), "adi/adi.xml")
            .await
            .unwrap();

        assert_eq!(published.bucket, "media-bucket");
        assert_eq!(published.key, "adi/adi.xml");
        let stored = store.object("media-bucket", "adi/adi.xml").unwrap();
        assert_eq!(stored.bytes, b"<ADI/>");
        assert_eq!(stored.content_type, "application/xml");
    }

    #[tokio::test]
    async fn test_two_transient_failures_then_success_takes_three_attempts() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next(StoreError::Unavailable("503 Slow Down".into()));
        store.fail_next(StoreError::Unavailable("connection reset".into()));

        let published = publisher(&store)
            .publish(ArtifactSource::Bytes(vec![1, 2, 3]), "output.zip")
            .await
            .unwrap();

        assert_eq!(store.put_attempts(), 3);
        assert_eq!(published.key, "output.zip");
        assert!(store.object("media-bucket", "output.zip").is_some());
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let store = Arc::new(MemoryStore::new());
        for _ in 0..5 {
            store.fail_next(StoreError::Unavailable("503".into()));
        }

        let err = publisher(&store)
            .publish(ArtifactSource::Bytes(vec![1]), "output.zip")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::StorageUnavailable(_)));
        assert_eq!(store.put_attempts(), 3);
    }

    #[tokio::test]
    async fn test_denied_is_not_retried() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next(StoreError::Denied("403 InvalidAccessKeyId".into()));

        let err = publisher(&store)
            .publish(ArtifactSource::Bytes(vec![1]), "output.zip")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::CredentialsUnavailable(_)));
        assert_eq!(store.put_attempts(), 1);
    }

    #[tokio::test]
    async fn test_missing_local_file_is_artifact_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());

        let err = publisher(&store)
            .publish(ArtifactSource::File(dir.path().join("output.zip")), "output.zip")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ArtifactNotFound(_)));
        assert_eq!(store.put_attempts(), 0);
    }

    #[tokio::test]
    async fn test_fetch_round_trip_and_missing_object() {
        let store = Arc::new(MemoryStore::new());
        let publisher = publisher(&store);
        publisher
            .publish(ArtifactSource::Bytes(b"zip".to_vec()), "output.zip")
            .await
            .unwrap();

        assert_eq!(publisher.fetch("output.zip").await.unwrap(), b"zip");
        let err = publisher.fetch("missing.zip").await.unwrap_err();
        assert!(matches!(err, CoreError::StorageRejected(_)));
    }

    #[tokio::test]
    async fn test_invalid_key_rejected() {
        let store = Arc::new(MemoryStore::new());
        let err = publisher(&store)
            .publish(ArtifactSource::Bytes(vec![]), "/output.zip")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }
}
