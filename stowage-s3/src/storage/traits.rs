//! Object store capability trait

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::TryStreamExt;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use stowage_core::ErrorCode;
use thiserror::Error;

/// Errors from storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    #[error("Bucket already exists: {0}")]
    BucketAlreadyExists(String),

    #[error("Bucket already owned by you: {0}")]
    BucketAlreadyOwnedByYou(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("No bucket given and no default bucket configured")]
    NoDefaultBucket,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Presign error: {0}")]
    Presign(String),

    #[error("{code}: {message}")]
    Service { code: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// S3 error code this error corresponds to, if any
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::BucketNotFound(_) => Some(ErrorCode::NoSuchBucket),
            Self::ObjectNotFound { .. } => Some(ErrorCode::NoSuchKey),
            Self::BucketAlreadyExists(_) => Some(ErrorCode::BucketAlreadyExists),
            Self::BucketAlreadyOwnedByYou(_) => Some(ErrorCode::BucketAlreadyOwnedByYou),
            Self::AccessDenied(_) => Some(ErrorCode::AccessDenied),
            Self::InvalidArgument(_) => Some(ErrorCode::InvalidArgument),
            Self::Service { code, .. } => code.parse().ok(),
            Self::NoDefaultBucket | Self::Presign(_) | Self::Io(_) | Self::Internal(_) => None,
        }
    }

    /// True only when the addressed object does not exist.
    ///
    /// A missing bucket is not a missing object and reports false.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ObjectNotFound { .. })
    }
}

/// Metadata supplied with an upload
#[derive(Debug, Clone, Default)]
pub struct ObjectMetadata {
    pub content_type: Option<String>,
    pub user_metadata: HashMap<String, String>,
}

/// Description of a stored object
#[derive(Debug, Clone, Serialize)]
pub struct ObjectInfo {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub content_type: Option<String>,
    pub user_metadata: HashMap<String, String>,
}

/// Result of a PUT operation
#[derive(Debug)]
pub struct PutObjectResult {
    pub etag: Option<String>,
    pub version_id: Option<String>,
}

/// Byte range of an object to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: u64,
    /// Number of bytes from `offset`; `None` reads to the end
    pub length: Option<u64>,
}

impl ByteRange {
    pub fn from_offset(offset: u64) -> Self {
        Self {
            offset,
            length: None,
        }
    }

    pub fn new(offset: u64, length: u64) -> Self {
        Self {
            offset,
            length: Some(length),
        }
    }

    /// HTTP `Range` header value, e.g. `bytes=0-4`
    pub fn to_header(&self) -> Result<String, StorageError> {
        match self.length {
            None => Ok(format!("bytes={}-", self.offset)),
            Some(0) => Err(StorageError::InvalidArgument(
                "range length must be positive".to_string(),
            )),
            Some(length) => match self.offset.checked_add(length) {
                Some(end) => Ok(format!("bytes={}-{}", self.offset, end - 1)),
                None => Ok(format!("bytes={}-", self.offset)),
            },
        }
    }

    /// Apply the range to a full object body
    pub fn slice(&self, data: &Bytes) -> Result<Bytes, StorageError> {
        let size = data.len() as u64;
        if self.offset >= size && !(size == 0 && self.offset == 0) {
            return Err(StorageError::Service {
                code: ErrorCode::InvalidRange.as_str().to_string(),
                message: format!("offset {} is beyond object size {size}", self.offset),
            });
        }
        let end = match self.length {
            Some(0) => {
                return Err(StorageError::InvalidArgument(
                    "range length must be positive".to_string(),
                ))
            }
            Some(length) => self.offset.saturating_add(length).min(size),
            None => size,
        };
        let start = usize::try_from(self.offset)
            .map_err(|_| StorageError::InvalidArgument("offset too large".to_string()))?;
        let end = usize::try_from(end)
            .map_err(|_| StorageError::InvalidArgument("range too large".to_string()))?;
        Ok(data.slice(start..end))
    }
}

/// Streaming body of a GET response
pub struct ObjectBody {
    pub content_length: Option<u64>,
    pub stream: BoxStream<'static, Result<Bytes, StorageError>>,
}

impl ObjectBody {
    pub fn from_bytes(data: Bytes) -> Self {
        Self {
            content_length: Some(data.len() as u64),
            stream: Box::pin(futures::stream::once(async move { Ok(data) })),
        }
    }

    /// Drain the whole stream into memory. The stream is dropped on return,
    /// whether or not draining succeeded.
    pub async fn into_bytes(self) -> Result<Bytes, StorageError> {
        let capacity = self
            .content_length
            .and_then(|len| usize::try_from(len).ok())
            .unwrap_or_default();
        let buf = self
            .stream
            .try_fold(BytesMut::with_capacity(capacity), |mut buf, chunk| async move {
                buf.extend_from_slice(&chunk);
                Ok(buf)
            })
            .await?;
        Ok(buf.freeze())
    }
}

impl std::fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectBody")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Capabilities of an S3-compatible storage client
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Get an object, optionally restricted to a byte range
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> Result<ObjectBody, StorageError>;

    /// Put an object whose full content is `data`
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        metadata: ObjectMetadata,
    ) -> Result<PutObjectResult, StorageError>;

    /// Download an object into a local file, returning the bytes written
    async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
    ) -> Result<u64, StorageError>;

    /// Upload a local file as an object
    async fn put_object_from_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        metadata: ObjectMetadata,
    ) -> Result<PutObjectResult, StorageError>;

    /// URL allowing a GET of the object without further credentials
    async fn presigned_get_url(
        &self,
        bucket: &str,
        key: &str,
        expires: Duration,
    ) -> Result<String, StorageError>;

    /// URL allowing a PUT of the object without further credentials
    async fn presigned_put_url(
        &self,
        bucket: &str,
        key: &str,
        expires: Duration,
    ) -> Result<String, StorageError>;

    /// Check if a bucket exists
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError>;

    /// Create a bucket
    async fn make_bucket(&self, bucket: &str) -> Result<(), StorageError>;

    /// Describe an object without fetching its content
    async fn stat_object(&self, bucket: &str, key: &str) -> Result<ObjectInfo, StorageError>;
}
