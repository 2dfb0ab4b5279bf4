//! Default-bucket facade over an [`ObjectStore`]
//!
//! [`StorageFacade`] forwards to the store it wraps, adding three things:
//! a configured default bucket for calls that name none, normalization of
//! upload payloads, and [`object_exists`](StorageFacade::object_exists), which
//! reports a missing object as `false` instead of an error.

use crate::payload::Payload;
use crate::settings::StorageSettings;
use crate::storage::{
    ByteRange, ObjectInfo, ObjectMetadata, ObjectStore, PutObjectResult, S3Store, StorageError,
};
use bytes::Bytes;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use stowage_core::{RegistryError, RegistryKey, SingletonRegistry};
use tracing::{debug, info};

/// Content type used when a write names none
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Presigned URL lifetime when none is given (7 days)
pub const DEFAULT_PRESIGN_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Longest presigned URL lifetime S3 accepts
pub const MAX_PRESIGN_EXPIRY: Duration = DEFAULT_PRESIGN_EXPIRY;

/// Options for [`StorageFacade::write_object`] and
/// [`StorageFacade::write_object_from_file`]
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub bucket: Option<String>,
    pub content_type: Option<String>,
    /// Number of payload bytes to upload; defaults to the whole payload.
    ///
    /// `Some(0)` is an explicit length and uploads an empty object; it does
    /// not fall back to the payload size.
    pub length: Option<u64>,
    pub metadata: HashMap<String, String>,
}

impl WriteOptions {
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    fn object_metadata(&mut self) -> ObjectMetadata {
        ObjectMetadata {
            content_type: Some(
                self.content_type
                    .take()
                    .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            ),
            user_metadata: std::mem::take(&mut self.metadata),
        }
    }
}

/// Object storage client with a default bucket
#[derive(Clone)]
pub struct StorageFacade {
    store: Arc<dyn ObjectStore>,
    default_bucket: Option<String>,
}

impl StorageFacade {
    pub fn new(store: Arc<dyn ObjectStore>, default_bucket: Option<String>) -> Self {
        Self {
            store,
            default_bucket: default_bucket.filter(|b| !b.is_empty()),
        }
    }

    /// Facade over an S3 client built from `settings`
    pub fn connect(settings: &StorageSettings) -> Result<Self, StorageError> {
        let store = S3Store::new(settings)?;
        Ok(Self::new(Arc::new(store), settings.default_bucket.clone()))
    }

    /// The facade for `settings`, built on first use and shared afterwards
    pub fn shared(
        registry: &SingletonRegistry,
        settings: StorageSettings,
    ) -> Result<Arc<Self>, RegistryError<StorageError>> {
        registry.get_instance(
            RegistryKey::named(settings.cache_key()),
            |settings: StorageSettings| Self::connect(&settings),
            settings,
        )
    }

    pub fn default_bucket(&self) -> Option<&str> {
        self.default_bucket.as_deref()
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    fn resolve_bucket<'a>(&'a self, bucket: Option<&'a str>) -> Result<&'a str, StorageError> {
        bucket
            .filter(|b| !b.is_empty())
            .or(self.default_bucket.as_deref())
            .ok_or(StorageError::NoDefaultBucket)
    }

    /// Read a whole object into memory
    pub async fn read_object(&self, key: &str, bucket: Option<&str>) -> Result<Bytes, StorageError> {
        self.read(key, bucket, None).await
    }

    /// Read part of an object into memory
    pub async fn read_object_range(
        &self,
        key: &str,
        range: ByteRange,
        bucket: Option<&str>,
    ) -> Result<Bytes, StorageError> {
        self.read(key, bucket, Some(range)).await
    }

    async fn read(
        &self,
        key: &str,
        bucket: Option<&str>,
        range: Option<ByteRange>,
    ) -> Result<Bytes, StorageError> {
        let bucket = self.resolve_bucket(bucket)?;
        debug!(bucket = %bucket, key = %key, ?range, "Reading object");

        let body = self.store.get_object(bucket, key, range).await?;
        body.into_bytes().await
    }

    /// Upload `payload` as `key`
    pub async fn write_object(
        &self,
        key: &str,
        payload: impl Into<Payload>,
        mut options: WriteOptions,
    ) -> Result<PutObjectResult, StorageError> {
        let bucket = self.resolve_bucket(options.bucket.as_deref())?.to_string();
        let data = payload.into().into_body(options.length).await?;
        let metadata = options.object_metadata();

        debug!(bucket = %bucket, key = %key, size = data.len(), "Writing object");
        self.store.put_object(&bucket, key, data, metadata).await
    }

    /// Upload the file at `path` as `key`; `options.length` is ignored
    pub async fn write_object_from_file(
        &self,
        key: &str,
        path: impl AsRef<Path>,
        mut options: WriteOptions,
    ) -> Result<PutObjectResult, StorageError> {
        let bucket = self.resolve_bucket(options.bucket.as_deref())?.to_string();
        let path = path.as_ref();
        let metadata = options.object_metadata();

        debug!(bucket = %bucket, key = %key, path = %path.display(), "Uploading file");
        self.store
            .put_object_from_file(&bucket, key, path, metadata)
            .await
    }

    /// Download `key` into the file at `path`, returning the bytes written
    pub async fn read_object_to_file(
        &self,
        key: &str,
        path: impl AsRef<Path>,
        bucket: Option<&str>,
    ) -> Result<u64, StorageError> {
        let bucket = self.resolve_bucket(bucket)?;
        let path = path.as_ref();

        debug!(bucket = %bucket, key = %key, path = %path.display(), "Downloading file");
        self.store.get_object_to_file(bucket, key, path).await
    }

    pub async fn presigned_download_url(
        &self,
        key: &str,
        bucket: Option<&str>,
        expires: Option<Duration>,
    ) -> Result<String, StorageError> {
        let bucket = self.resolve_bucket(bucket)?;
        let expires = check_expiry(expires)?;
        self.store.presigned_get_url(bucket, key, expires).await
    }

    pub async fn presigned_upload_url(
        &self,
        key: &str,
        bucket: Option<&str>,
        expires: Option<Duration>,
    ) -> Result<String, StorageError> {
        let bucket = self.resolve_bucket(bucket)?;
        let expires = check_expiry(expires)?;
        self.store.presigned_put_url(bucket, key, expires).await
    }

    /// Create the default bucket unless it already exists.
    ///
    /// Returns whether this call created it. Another client creating the
    /// bucket between the check and the create counts as existing.
    pub async fn ensure_default_bucket_exists(&self) -> Result<bool, StorageError> {
        let bucket = self.resolve_bucket(None)?;

        if self.store.bucket_exists(bucket).await? {
            return Ok(false);
        }

        match self.store.make_bucket(bucket).await {
            Ok(()) => {
                info!(bucket = %bucket, "Created default bucket");
                Ok(true)
            }
            Err(StorageError::BucketAlreadyOwnedByYou(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Whether `key` exists. Only a missing object reads as `false`; any
    /// other failure, including a missing bucket, is returned. Against S3 a
    /// missing bucket is recognized by a follow-up bucket check; if that
    /// check itself fails the answer stays `false`.
    pub async fn object_exists(&self, key: &str, bucket: Option<&str>) -> Result<bool, StorageError> {
        match self.stat_object(key, bucket).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn stat_object(&self, key: &str, bucket: Option<&str>) -> Result<ObjectInfo, StorageError> {
        let bucket = self.resolve_bucket(bucket)?;
        self.store.stat_object(bucket, key).await
    }
}

impl std::fmt::Debug for StorageFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageFacade")
            .field("default_bucket", &self.default_bucket)
            .finish_non_exhaustive()
    }
}

fn check_expiry(expires: Option<Duration>) -> Result<Duration, StorageError> {
    let expires = expires.unwrap_or(DEFAULT_PRESIGN_EXPIRY);
    if expires < Duration::from_secs(1) || expires > MAX_PRESIGN_EXPIRY {
        return Err(StorageError::InvalidArgument(format!(
            "presigned URL expiry must be between 1 second and 7 days, got {}s",
            expires.as_secs()
        )));
    }
    Ok(expires)
}
