//! In-memory ephemeral storage backend

use super::presign::{AddressingStyle, Signer};
use super::traits::*;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use md5::{Digest, Md5};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// In-memory stored object
struct InMemoryObject {
    data: Bytes,
    etag: String,
    last_modified: chrono::DateTime<Utc>,
    metadata: ObjectMetadata,
}

/// In-memory bucket
struct InMemoryBucket {
    objects: DashMap<String, InMemoryObject>,
}

impl InMemoryBucket {
    fn new() -> Self {
        Self {
            objects: DashMap::new(),
        }
    }
}

/// Ephemeral (in-memory) storage backend
///
/// Presigned URLs are signed with the store's own credentials against its
/// configured endpoint; nothing serves them.
pub struct EphemeralStore {
    buckets: DashMap<String, Arc<InMemoryBucket>>,
    signer: Signer,
}

impl Default for EphemeralStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EphemeralStore {
    pub fn new() -> Self {
        let endpoint = Url::parse("http://localhost:9000").expect("static endpoint URL is valid");
        Self::with_signer(Signer {
            endpoint,
            region: "us-east-1".to_string(),
            access_key: "stowage".to_string(),
            secret_key: "stowage-secret".to_string(),
            session_token: None,
            style: AddressingStyle::Path,
        })
    }

    pub fn with_signer(signer: Signer) -> Self {
        Self {
            buckets: DashMap::new(),
            signer,
        }
    }

    fn compute_etag(data: &[u8]) -> String {
        let mut hasher = Md5::new();
        hasher.update(data);
        format!("\"{}\"", hex::encode(hasher.finalize()))
    }

    fn bucket(&self, bucket: &str) -> Result<Arc<InMemoryBucket>, StorageError> {
        self.buckets
            .get(bucket)
            .map(|b| Arc::clone(b.value()))
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))
    }

    fn object_data(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        let bucket_ref = self.bucket(bucket)?;
        let obj = bucket_ref
            .objects
            .get(key)
            .ok_or_else(|| StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;
        Ok(obj.data.clone())
    }

    fn presign(
        &self,
        method: &str,
        bucket: &str,
        key: &str,
        expires: Duration,
    ) -> Result<String, StorageError> {
        self.signer.presign(method, bucket, key, expires, Utc::now())
    }
}

#[async_trait]
impl ObjectStore for EphemeralStore {
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> Result<ObjectBody, StorageError> {
        let data = self.object_data(bucket, key)?;
        let data = match range {
            Some(range) => range.slice(&data)?,
            None => data,
        };
        Ok(ObjectBody::from_bytes(data))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        metadata: ObjectMetadata,
    ) -> Result<PutObjectResult, StorageError> {
        let bucket_ref = self.bucket(bucket)?;
        let etag = Self::compute_etag(&data);

        bucket_ref.objects.insert(
            key.to_string(),
            InMemoryObject {
                data,
                etag: etag.clone(),
                last_modified: Utc::now(),
                metadata,
            },
        );

        Ok(PutObjectResult {
            etag: Some(etag),
            version_id: None,
        })
    }

    async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
    ) -> Result<u64, StorageError> {
        let data = self.object_data(bucket, key)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, &data).await?;

        Ok(data.len() as u64)
    }

    async fn put_object_from_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        metadata: ObjectMetadata,
    ) -> Result<PutObjectResult, StorageError> {
        // Check the bucket before reading a possibly large file
        self.bucket(bucket)?;
        let data = tokio::fs::read(path).await?;
        self.put_object(bucket, key, Bytes::from(data), metadata)
            .await
    }

    async fn presigned_get_url(
        &self,
        bucket: &str,
        key: &str,
        expires: Duration,
    ) -> Result<String, StorageError> {
        self.presign("GET", bucket, key, expires)
    }

    async fn presigned_put_url(
        &self,
        bucket: &str,
        key: &str,
        expires: Duration,
    ) -> Result<String, StorageError> {
        self.presign("PUT", bucket, key, expires)
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        Ok(self.buckets.contains_key(bucket))
    }

    async fn make_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        match self.buckets.entry(bucket.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(StorageError::BucketAlreadyOwnedByYou(bucket.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(InMemoryBucket::new()));
                Ok(())
            }
        }
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> Result<ObjectInfo, StorageError> {
        let bucket_ref = self.bucket(bucket)?;
        let obj = bucket_ref
            .objects
            .get(key)
            .ok_or_else(|| StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;

        Ok(ObjectInfo {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: obj.data.len() as u64,
            etag: Some(obj.etag.clone()),
            last_modified: Some(obj.last_modified),
            content_type: obj.metadata.content_type.clone(),
            user_metadata: obj.metadata.user_metadata.clone(),
        })
    }
}
