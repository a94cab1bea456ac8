//! Object Storage Module
//!
//! Durable publication of artifacts to S3-compatible object storage.
//!
//! [`ObjectStore`] is the seam to the backend: [`S3Store`] talks to the S3
//! REST API with Signature V4, [`MemoryStore`] keeps objects in process.
//! [`Publisher`] sits on top and owns bucket, region, retries and URLs.

mod credentials;
mod memory;
mod publisher;
mod s3;
pub mod signing;

pub use credentials::*;
pub use memory::*;
pub use publisher::*;
pub use s3::*;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::CoreError;

// =============================================================================
// Store Errors
// =============================================================================

/// Backend-level failure classes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Authentication or authorization rejected (401/403)
    #[error("Access denied: {0}")]
    Denied(String),

    /// Transient failure: network, timeout, throttling or server error
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Object does not exist
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Request refused for any other reason
    #[error("Request rejected: {0}")]
    Rejected(String),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Denied(msg) => CoreError::CredentialsUnavailable(msg),
            StoreError::Unavailable(msg) => CoreError::StorageUnavailable(msg),
            StoreError::NotFound(key) => {
                CoreError::StorageRejected(format!("Object not found: {}", key))
            }
            StoreError::Rejected(msg) => CoreError::StorageRejected(msg),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Object Store Trait
// =============================================================================

/// Minimal object storage backend
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `bucket`/`key`, replacing any existing object
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> StoreResult<()>;

    /// Read the object at `bucket`/`key`
    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>>;
}

/// Content type sent with an upload, chosen by key extension
pub fn content_type_for(key: &str) -> &'static str {
    let ext = key
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "zip" => "application/zip",
        "xml" => "application/xml",
        "png" => "image/png",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}
