//! AWS Signature Version 4 query-string presigning
//!
//! Produces presigned URLs the same way S3 does, so URLs handed out by the
//! in-memory store have the shape clients expect.

use super::traits::StorageError;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};
use std::time::Duration;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";

/// Characters SigV4 leaves unescaped: `A-Z a-z 0-9 - _ . ~`
const QUERY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Object key paths additionally keep `/`
const PATH: &AsciiSet = &QUERY.remove(b'/');

/// Where the bucket name goes in the URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingStyle {
    /// `https://endpoint/bucket/key`
    Path,
    /// `https://bucket.endpoint/key`
    VirtualHosted,
}

/// Credentials and endpoint used for signing
#[derive(Debug, Clone)]
pub struct Signer {
    pub endpoint: Url,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub session_token: Option<String>,
    pub style: AddressingStyle,
}

impl Signer {
    /// Presign `method` on `bucket/key`, valid for `expires` from `now`
    pub fn presign(
        &self,
        method: &str,
        bucket: &str,
        key: &str,
        expires: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, StorageError> {
        let endpoint_host = self
            .endpoint
            .host_str()
            .ok_or_else(|| StorageError::Presign(format!("endpoint has no host: {}", self.endpoint)))?;

        let (host, path) = match self.style {
            AddressingStyle::Path => (
                endpoint_host.to_string(),
                format!("/{}/{}", bucket, encode_path(key)),
            ),
            AddressingStyle::VirtualHosted => (
                format!("{bucket}.{endpoint_host}"),
                format!("/{}", encode_path(key)),
            ),
        };
        let host = match self.endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host,
        };

        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let scope = format!("{}/{}/{}/aws4_request", date, self.region, SERVICE);

        let mut params = vec![
            ("X-Amz-Algorithm", ALGORITHM.to_string()),
            ("X-Amz-Credential", format!("{}/{}", self.access_key, scope)),
            ("X-Amz-Date", amz_date.clone()),
            ("X-Amz-Expires", expires.as_secs().to_string()),
            ("X-Amz-SignedHeaders", "host".to_string()),
        ];
        if let Some(token) = &self.session_token {
            params.push(("X-Amz-Security-Token", token.clone()));
        }
        params.sort_by(|a, b| a.0.cmp(b.0));

        let query_string = params
            .iter()
            .map(|(k, v)| format!("{}={}", encode_query(k), encode_query(v)))
            .collect::<Vec<_>>()
            .join("&");

        let headers = [("host".to_string(), host.clone())];
        let signed_headers = ["host".to_string()];
        let canonical_request = create_canonical_request(
            method,
            &path,
            &query_string,
            &headers,
            &signed_headers,
            "UNSIGNED-PAYLOAD",
        );
        let string_to_sign = create_string_to_sign(ALGORITHM, &amz_date, &scope, &canonical_request);
        let signing_key = derive_signing_key(&self.secret_key, &date, &self.region, SERVICE);
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        Ok(format!(
            "{}://{}{}?{}&X-Amz-Signature={}",
            self.endpoint.scheme(),
            host,
            path,
            query_string,
            signature
        ))
    }
}

fn encode_query(value: &str) -> String {
    utf8_percent_encode(value, QUERY).to_string()
}

fn encode_path(key: &str) -> String {
    utf8_percent_encode(key, PATH).to_string()
}

/// Sign a string using HMAC-SHA256
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Derive the signing key
fn derive_signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// Create the canonical request string
fn create_canonical_request(
    method: &str,
    path: &str,
    query_string: &str,
    headers: &[(String, String)],
    signed_headers: &[String],
    payload_hash: &str,
) -> String {
    let canonical_headers: String = signed_headers
        .iter()
        .filter_map(|h| {
            headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(h))
                .map(|(k, v)| format!("{}:{}\n", k.to_lowercase(), v.trim()))
        })
        .collect();

    let signed_headers_str = signed_headers.join(";");

    format!(
        "{method}\n{path}\n{query_string}\n{canonical_headers}\n{signed_headers_str}\n{payload_hash}"
    )
}

/// Create the string to sign
fn create_string_to_sign(
    algorithm: &str,
    timestamp: &str,
    scope: &str,
    canonical_request: &str,
) -> String {
    let canonical_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
    format!("{algorithm}\n{timestamp}\n{scope}\n{canonical_hash}")
}
