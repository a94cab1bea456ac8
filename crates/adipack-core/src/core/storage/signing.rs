//! AWS Signature Version 4 request signing for S3.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use super::StorageCredentials;
use crate::core::{CoreError, CoreResult};

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// `x-amz-date` layout
pub const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

pub const SERVICE: &str = "s3";

/// A request reduced to the parts that are signed.
///
/// `headers` are `(lowercase name, value)` pairs and must include `host`.
#[derive(Clone, Debug)]
pub struct SigningRequest<'a> {
    pub method: &'a str,
    /// Already URI-encoded path
    pub canonical_uri: &'a str,
    /// Already canonical query string (empty when there is none)
    pub canonical_query: &'a str,
    pub headers: &'a [(String, String)],
    /// Hex SHA-256 of the body
    pub payload_sha256: &'a str,
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Percent-encode everything outside `A-Za-z0-9-._~`. `/` is kept when
/// `encode_slash` is false (object key paths).
pub fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn sorted_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    let mut normalized: Vec<(String, String)> = headers
        .iter()
        .map(|(name, value)| {
            let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
            (name.trim().to_ascii_lowercase(), value)
        })
        .collect();
    normalized.sort();
    normalized
}

/// `host;x-amz-date;...`
pub fn signed_headers(headers: &[(String, String)]) -> String {
    sorted_headers(headers)
        .into_iter()
        .map(|(name, _)| name)
        .collect::<Vec<_>>()
        .join(";")
}

pub fn canonical_request(req: &SigningRequest<'_>) -> String {
    let canonical_headers: String = sorted_headers(req.headers)
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect();

    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        req.method,
        req.canonical_uri,
        req.canonical_query,
        canonical_headers,
        signed_headers(req.headers),
        req.payload_sha256
    )
}

/// `{date}/{region}/s3/aws4_request`
pub fn credential_scope(date: &str, region: &str) -> String {
    format!("{}/{}/{}/aws4_request", date, region, SERVICE)
}

pub fn string_to_sign(amz_date: &str, scope: &str, canonical_request: &str) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        sha256_hex(canonical_request.as_bytes())
    )
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> CoreResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| CoreError::Internal(format!("HMAC key rejected: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

pub fn signing_key(secret: &str, date: &str, region: &str) -> CoreResult<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, SERVICE.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

fn scope_date(amz_date: &str) -> CoreResult<&str> {
    amz_date
        .get(..8)
        .ok_or_else(|| CoreError::Internal(format!("Malformed signing timestamp: {}", amz_date)))
}

/// Hex signature for `req` at `amz_date` (`YYYYMMDDTHHMMSSZ`).
pub fn signature(
    credentials: &StorageCredentials,
    region: &str,
    amz_date: &str,
    req: &SigningRequest<'_>,
) -> CoreResult<String> {
    let date = scope_date(amz_date)?;
    let scope = credential_scope(date, region);
    let to_sign = string_to_sign(amz_date, &scope, &canonical_request(req));
    let key = signing_key(&credentials.secret_access_key, date, region)?;
    Ok(hex::encode(hmac_sha256(&key, to_sign.as_bytes())?))
}

/// Value of the `Authorization` header.
pub fn authorization_header(
    credentials: &StorageCredentials,
    region: &str,
    amz_date: &str,
    req: &SigningRequest<'_>,
) -> CoreResult<String> {
    let sig = signature(credentials, region, amz_date, req)?;
    Ok(format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM,
        credentials.access_key_id,
        credential_scope(scope_date(amz_date)?, region),
        signed_headers(req.headers),
        sig
    ))
}
