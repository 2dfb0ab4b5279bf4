//! S3 storage backend on the AWS SDK
//!
//! Works against AWS S3 and S3-compatible servers such as MinIO. Requests are
//! path-style so custom endpoints need no wildcard DNS.

use super::traits::*;
use crate::settings::StorageSettings;
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Builder as S3ConfigBuilder, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use stowage_core::ErrorCode;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Region used when the settings name none
pub const DEFAULT_REGION: &str = "us-east-1";

/// `ObjectStore` backed by an `aws_sdk_s3::Client`
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    region: String,
}

impl S3Store {
    /// Build a client from explicit settings
    pub fn new(settings: &StorageSettings) -> Result<Self, StorageError> {
        let endpoint = settings.endpoint_url()?;
        let region = settings.region_or_default().to_string();

        info!(endpoint = %endpoint, region = %region, "Initializing S3 client");

        let credentials = Credentials::new(
            settings.access_key.clone(),
            settings.secret_key.clone(),
            settings.session_token.clone(),
            None,
            "stowage",
        );

        let config = S3ConfigBuilder::new()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region.clone()))
            .endpoint_url(endpoint.as_str().trim_end_matches('/'))
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(config),
            region,
        })
    }

    fn presigning_config(expires: Duration) -> Result<PresigningConfig, StorageError> {
        PresigningConfig::expires_in(expires)
            .map_err(|e| StorageError::Presign(format!("invalid presign config: {e}")))
    }
}

/// Translate an SDK service error into the storage taxonomy
pub(crate) fn map_service_error<E>(err: &E, bucket: &str, key: Option<&str>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let message = err
        .message()
        .map_or_else(|| DisplayErrorContext(err).to_string(), ToString::to_string);

    let Some(code) = err.code() else {
        return StorageError::Internal(message);
    };

    match (code.parse::<ErrorCode>(), key) {
        (Ok(ErrorCode::NoSuchKey | ErrorCode::NotFound), Some(key)) => StorageError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        (Ok(ErrorCode::NoSuchBucket | ErrorCode::NotFound), _) => {
            StorageError::BucketNotFound(bucket.to_string())
        }
        (Ok(ErrorCode::BucketAlreadyExists), _) => {
            StorageError::BucketAlreadyExists(bucket.to_string())
        }
        (Ok(ErrorCode::BucketAlreadyOwnedByYou), _) => {
            StorageError::BucketAlreadyOwnedByYou(bucket.to_string())
        }
        (Ok(ErrorCode::AccessDenied), _) => StorageError::AccessDenied(message),
        _ => StorageError::Service {
            code: code.to_string(),
            message,
        },
    }
}

fn to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

fn to_size(len: Option<i64>) -> Option<u64> {
    len.and_then(|l| u64::try_from(l).ok())
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> Result<ObjectBody, StorageError> {
        let mut request = self.client.get_object().bucket(bucket).key(key);
        if let Some(range) = range {
            request = request.range(range.to_header()?);
        }

        let output = request.send().await.map_err(|err| {
            let service_err = err.into_service_error();
            map_service_error(&service_err, bucket, Some(key))
        })?;

        let content_length = to_size(output.content_length());
        let stream = futures::stream::try_unfold(output.body, |mut body| async move {
            match body.try_next().await {
                Ok(Some(chunk)) => Ok(Some((chunk, body))),
                Ok(None) => Ok(None),
                Err(e) => Err(StorageError::Internal(format!("failed to read object body: {e}"))),
            }
        })
        .boxed();

        Ok(ObjectBody {
            content_length,
            stream,
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        metadata: ObjectMetadata,
    ) -> Result<PutObjectResult, StorageError> {
        let length = i64::try_from(data.len())
            .map_err(|_| StorageError::InvalidArgument("object too large".to_string()))?;

        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_length(length)
            .body(ByteStream::from(data));

        if let Some(ct) = metadata.content_type {
            request = request.content_type(ct);
        }
        for (k, v) in metadata.user_metadata {
            request = request.metadata(k, v);
        }

        let output = request
            .send()
            .await
            .map_err(|err| map_service_error(&err.into_service_error(), bucket, Some(key)))?;

        Ok(PutObjectResult {
            etag: output.e_tag().map(ToString::to_string),
            version_id: output.version_id().map(ToString::to_string),
        })
    }

    async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
    ) -> Result<u64, StorageError> {
        let mut body = self.get_object(bucket, key, None).await?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = File::create(path).await?;
        let mut written = 0u64;
        while let Some(chunk) = body.stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!(bucket = %bucket, key = %key, bytes = written, "Downloaded object to file");
        Ok(written)
    }

    async fn put_object_from_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        metadata: ObjectMetadata,
    ) -> Result<PutObjectResult, StorageError> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(e)))?;

        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body);

        if let Some(ct) = metadata.content_type {
            request = request.content_type(ct);
        }
        for (k, v) in metadata.user_metadata {
            request = request.metadata(k, v);
        }

        let output = request
            .send()
            .await
            .map_err(|err| map_service_error(&err.into_service_error(), bucket, Some(key)))?;

        Ok(PutObjectResult {
            etag: output.e_tag().map(ToString::to_string),
            version_id: output.version_id().map(ToString::to_string),
        })
    }

    async fn presigned_get_url(
        &self,
        bucket: &str,
        key: &str,
        expires: Duration,
    ) -> Result<String, StorageError> {
        let presigned = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(Self::presigning_config(expires)?)
            .await
            .map_err(|e| StorageError::Presign(DisplayErrorContext(&e).to_string()))?;
        Ok(presigned.uri().to_string())
    }

    async fn presigned_put_url(
        &self,
        bucket: &str,
        key: &str,
        expires: Duration,
    ) -> Result<String, StorageError> {
        let presigned = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .presigned(Self::presigning_config(expires)?)
            .await
            .map_err(|e| StorageError::Presign(DisplayErrorContext(&e).to_string()))?;
        Ok(presigned.uri().to_string())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(map_service_error(&service_err, bucket, None))
                }
            }
        }
    }

    async fn make_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        let mut request = self.client.create_bucket().bucket(bucket);

        // us-east-1 rejects an explicit location constraint
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        request
            .send()
            .await
            .map_err(|err| map_service_error(&err.into_service_error(), bucket, None))?;

        info!(bucket = %bucket, "Created bucket");
        Ok(())
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> Result<ObjectInfo, StorageError> {
        let result = self.client.head_object().bucket(bucket).key(key).send().await;
        let output = match result {
            Ok(output) => output,
            Err(err) => {
                let service_err = err.into_service_error();
                if !service_err.is_not_found() {
                    return Err(map_service_error(&service_err, bucket, Some(key)));
                }
                // HEAD responses carry no error body, so a 404 cannot tell a
                // missing bucket from a missing key without asking again.
                let bucket_exists = self.bucket_exists(bucket).await.ok();
                return Err(head_not_found(bucket, key, bucket_exists));
            }
        };

        Ok(ObjectInfo {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: to_size(output.content_length()).unwrap_or(0),
            etag: output.e_tag().map(ToString::to_string),
            last_modified: output.last_modified().and_then(to_chrono),
            content_type: output.content_type().map(ToString::to_string),
            user_metadata: output.metadata().cloned().unwrap_or_default(),
        })
    }
}

/// Error for a HEAD 404 given what a follow-up bucket check found.
///
/// Only a bucket confirmed missing is reported as such; an inconclusive
/// check keeps the object-level answer.
fn head_not_found(bucket: &str, key: &str, bucket_exists: Option<bool>) -> StorageError {
    if bucket_exists == Some(false) {
        debug!(bucket = %bucket, key = %key, "HEAD 404 is a missing bucket");
        StorageError::BucketNotFound(bucket.to_string())
    } else {
        StorageError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }
}
