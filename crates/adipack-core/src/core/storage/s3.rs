//! S3 REST backend

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use tracing::debug;

use super::signing::{self, SigningRequest, AMZ_DATE_FORMAT};
use super::{ObjectStore, StorageCredentials, StoreError, StoreResult};
use crate::core::{CoreError, CoreResult};

/// Longest error body echoed back in an error message
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Where a single object lives on the wire
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectLocation {
    pub url: String,
    /// `Host` header value (with port when not the scheme default)
    pub host: String,
    /// Encoded path that is signed
    pub canonical_uri: String,
}

/// [`ObjectStore`] over the S3 REST API.
///
/// Uses virtual-hosted addressing (`{bucket}.s3.{region}.{domain}`) unless
/// an endpoint override is set, in which case path-style addressing against
/// that endpoint is used (MinIO, LocalStack and friends).
pub struct S3Store {
    client: reqwest::Client,
    credentials: StorageCredentials,
    region: String,
    storage_domain: String,
    endpoint: Option<Url>,
}

impl std::fmt::Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store")
            .field("region", &self.region)
            .field("storage_domain", &self.storage_domain)
            .field("endpoint", &self.endpoint.as_ref().map(Url::as_str))
            .finish_non_exhaustive()
    }
}

impl S3Store {
    pub fn new(
        credentials: StorageCredentials,
        region: impl Into<String>,
        storage_domain: impl Into<String>,
        timeout: Duration,
    ) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            credentials,
            region: region.into(),
            storage_domain: storage_domain.into(),
            endpoint: None,
        })
    }

    /// Send requests to a custom S3-compatible endpoint (path-style).
    pub fn with_endpoint(mut self, endpoint: &str) -> CoreResult<Self> {
        self.endpoint = Some(parse_endpoint(endpoint)?);
        Ok(self)
    }

    pub fn location(&self, bucket: &str, key: &str) -> ObjectLocation {
        match &self.endpoint {
            Some(endpoint) => path_style_location(endpoint, bucket, key),
            None => {
                let host = format!("{}.s3.{}.{}", bucket, self.region, self.storage_domain);
                let canonical_uri = format!("/{}", signing::uri_encode(key, false));
                let url = format!("https://{}{}", host, canonical_uri);
                ObjectLocation {
                    url,
                    host,
                    canonical_uri,
                }
            }
        }
    }

    async fn send(
        &self,
        method: Method,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> StoreResult<reqwest::Response> {
        let location = self.location(bucket, key);
        let payload_sha256 = signing::sha256_hex(&body);
        let amz_date = chrono::Utc::now().format(AMZ_DATE_FORMAT).to_string();

        let mut headers = vec![
            ("host".to_string(), location.host.clone()),
            ("x-amz-content-sha256".to_string(), payload_sha256.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(content_type) = content_type {
            headers.push(("content-type".to_string(), content_type.to_string()));
        }
        if let Some(token) = &self.credentials.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }

        let authorization = signing::authorization_header(
            &self.credentials,
            &self.region,
            &amz_date,
            &SigningRequest {
                method: method.as_str(),
                canonical_uri: &location.canonical_uri,
                canonical_query: "",
                headers: &headers,
                payload_sha256: &payload_sha256,
            },
        )
        .map_err(|e| StoreError::Rejected(e.to_string()))?;

        // reqwest derives Host from the URL
        let mut request = self
            .client
            .request(method.clone(), &location.url)
            .header("authorization", authorization);
        for (name, value) in headers.iter().filter(|(name, _)| name != "host") {
            request = request.header(name.as_str(), value.as_str());
        }

        debug!("S3 {} {}", method, location.url);

        let response = request.body(body).send().await.map_err(classify_transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, key, &body))
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> StoreResult<()> {
        self.send(Method::PUT, bucket, key, body, Some(content_type))
            .await?;
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>> {
        let response = self.send(Method::GET, bucket, key, Vec::new(), None).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to read object body: {}", e)))?;
        Ok(bytes.to_vec())
    }
}

/// Transport failures (DNS, connect, timeout, reset) are all transient
fn classify_transport(err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::Unavailable(format!("Request timed out: {}", err))
    } else {
        StoreError::Unavailable(format!("Network error: {}", err))
    }
}

/// Map a non-success HTTP status to a store error class
pub fn classify_status(status: StatusCode, key: &str, body: &str) -> StoreError {
    let detail: String = body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect();
    let message = if detail.is_empty() {
        format!("S3 returned {} for {}", status, key)
    } else {
        format!("S3 returned {} for {}: {}", status, key, detail)
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Denied(message),
        StatusCode::NOT_FOUND => StoreError::NotFound(key.to_string()),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            StoreError::Unavailable(message)
        }
        s if s.is_server_error() => StoreError::Unavailable(message),
        _ => StoreError::Rejected(message),
    }
}

/// Parse an endpoint override such as `http://localhost:9000`.
pub fn parse_endpoint(endpoint: &str) -> CoreResult<Url> {
    let url = Url::parse(endpoint.trim_end_matches('/')).map_err(|e| {
        CoreError::ValidationError(format!("Invalid storage endpoint {}: {}", endpoint, e))
    })?;
    if url.host_str().is_none() {
        return Err(CoreError::ValidationError(format!(
            "Storage endpoint has no host: {}",
            endpoint
        )));
    }
    Ok(url)
}

/// Path-style location `{endpoint}/{bucket}/{key}`
pub fn path_style_location(endpoint: &Url, bucket: &str, key: &str) -> ObjectLocation {
    let host = match (endpoint.host_str(), endpoint.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    };
    let base_path = endpoint.path().trim_end_matches('/');
    let canonical_uri = format!(
        "{}/{}/{}",
        base_path,
        bucket,
        signing::uri_encode(key, false)
    );
    let url = format!("{}://{}{}", endpoint.scheme(), host, canonical_uri);
    ObjectLocation {
        url,
        host,
        canonical_uri,
    }
}
