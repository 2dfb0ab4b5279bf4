//! Tests for the in-memory storage backend

use super::*;
use bytes::Bytes;
use std::time::Duration;

/// Test helper to create storage
fn storage() -> EphemeralStore {
    EphemeralStore::new()
}

async fn read(s: &EphemeralStore, bucket: &str, key: &str) -> Bytes {
    s.get_object(bucket, key, None)
        .await
        .unwrap()
        .into_bytes()
        .await
        .unwrap()
}

// =============================================================================
// BUCKET OPERATIONS
// =============================================================================

mod bucket_tests {
    use super::*;

    #[tokio::test]
    async fn test_make_bucket() {
        let s = storage();
        s.make_bucket("my-bucket").await.unwrap();
        assert!(s.bucket_exists("my-bucket").await.unwrap());
    }

    #[tokio::test]
    async fn test_make_bucket_already_exists() {
        let s = storage();
        s.make_bucket("my-bucket").await.unwrap();

        let result = s.make_bucket("my-bucket").await;
        assert!(matches!(result, Err(StorageError::BucketAlreadyOwnedByYou(_))));
    }

    #[tokio::test]
    async fn test_bucket_not_exists() {
        let s = storage();
        assert!(!s.bucket_exists("nonexistent").await.unwrap());
    }

    #[tokio::test]
    async fn test_bucket_names_with_dots() {
        let s = storage();
        s.make_bucket("my.bucket.name").await.unwrap();
        assert!(s.bucket_exists("my.bucket.name").await.unwrap());
    }
}

// =============================================================================
// OBJECT OPERATIONS
// =============================================================================

mod object_tests {
    use super::*;

    #[tokio::test]
    async fn test_put_object_simple() {
        let s = storage();
        s.make_bucket("bucket").await.unwrap();

        let result = s
            .put_object("bucket", "key", Bytes::from("hello"), ObjectMetadata::default())
            .await
            .unwrap();
        let etag = result.etag.unwrap();
        assert!(etag.starts_with('"') && etag.ends_with('"'));
    }

    #[tokio::test]
    async fn test_put_object_bucket_not_found() {
        let s = storage();
        let result = s
            .put_object("nonexistent", "key", Bytes::from("data"), ObjectMetadata::default())
            .await;
        assert!(matches!(result, Err(StorageError::BucketNotFound(_))));
    }

    #[tokio::test]
    async fn test_get_object_not_found() {
        let s = storage();
        s.make_bucket("bucket").await.unwrap();

        let result = s.get_object("bucket", "nonexistent", None).await;
        assert!(matches!(result, Err(StorageError::ObjectNotFound { .. })));
    }

    #[tokio::test]
    async fn test_get_object_bucket_not_found() {
        let s = storage();
        let result = s.get_object("nonexistent", "key", None).await;
        assert!(matches!(result, Err(StorageError::BucketNotFound(_))));
    }

    #[tokio::test]
    async fn test_stat_object() {
        let s = storage();
        s.make_bucket("bucket").await.unwrap();
        s.put_object("bucket", "key", Bytes::from("hello"), ObjectMetadata::default())
            .await
            .unwrap();

        let info = s.stat_object("bucket", "key").await.unwrap();
        assert_eq!(info.size, 5);
        assert_eq!(info.bucket, "bucket");
        assert_eq!(info.key, "key");
        assert!(info.last_modified.is_some());
    }

    #[tokio::test]
    async fn test_stat_object_not_found_is_not_found() {
        let s = storage();
        s.make_bucket("bucket").await.unwrap();

        let err = s.stat_object("bucket", "missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_stat_object_missing_bucket_is_not_object_not_found() {
        let s = storage();

        let err = s.stat_object("missing", "key").await.unwrap_err();
        assert!(!err.is_not_found());
        assert!(matches!(err, StorageError::BucketNotFound(_)));
    }

    #[tokio::test]
    async fn test_overwrite_object() {
        let s = storage();
        s.make_bucket("bucket").await.unwrap();

        s.put_object("bucket", "key", Bytes::from("original"), ObjectMetadata::default())
            .await
            .unwrap();
        s.put_object("bucket", "key", Bytes::from("updated"), ObjectMetadata::default())
            .await
            .unwrap();

        assert_eq!(&read(&s, "bucket", "key").await[..], b"updated");
    }

    #[tokio::test]
    async fn test_etag_consistency() {
        let s = storage();
        s.make_bucket("bucket").await.unwrap();

        // Same content should produce same ETag
        let data = Bytes::from("test content");
        let result1 = s
            .put_object("bucket", "key1", data.clone(), ObjectMetadata::default())
            .await
            .unwrap();
        let result2 = s
            .put_object("bucket", "key2", data, ObjectMetadata::default())
            .await
            .unwrap();

        assert_eq!(result1.etag, result2.etag);
    }
}

// =============================================================================
// OBJECT EDGE CASES
// =============================================================================

mod object_edge_cases {
    use super::*;

    #[tokio::test]
    async fn test_empty_object() {
        let s = storage();
        s.make_bucket("bucket").await.unwrap();

        s.put_object("bucket", "empty", Bytes::new(), ObjectMetadata::default())
            .await
            .unwrap();

        let body = s.get_object("bucket", "empty", None).await.unwrap();
        assert_eq!(body.content_length, Some(0));
        assert!(body.into_bytes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_key_with_special_characters() {
        let s = storage();
        s.make_bucket("bucket").await.unwrap();

        let special_keys = vec![
            "path/to/object",
            "key with spaces",
            "key+with+plus",
            "key&with&ampersand",
            "unicode-ключ-键",
            "/leading/slash",
            "a//b///c",
        ];

        for key in special_keys {
            s.put_object("bucket", key, Bytes::from(key.as_bytes().to_vec()), ObjectMetadata::default())
                .await
                .unwrap();
            assert_eq!(&read(&s, "bucket", key).await[..], key.as_bytes(), "Failed for key: {}", key);
        }
    }
}

// =============================================================================
// RANGE READS
// =============================================================================

mod range_tests {
    use super::*;

    async fn seeded() -> EphemeralStore {
        let s = storage();
        s.make_bucket("bucket").await.unwrap();
        s.put_object("bucket", "digits", Bytes::from("0123456789"), ObjectMetadata::default())
            .await
            .unwrap();
        s
    }

    async fn read_range(s: &EphemeralStore, range: ByteRange) -> Result<Bytes, StorageError> {
        s.get_object("bucket", "digits", Some(range)).await?.into_bytes().await
    }

    #[tokio::test]
    async fn test_range_with_length() {
        let s = seeded().await;
        assert_eq!(&read_range(&s, ByteRange::new(3, 4)).await.unwrap()[..], b"3456");
    }

    #[tokio::test]
    async fn test_range_past_end_is_clamped() {
        let s = seeded().await;
        assert_eq!(&read_range(&s, ByteRange::new(8, 100)).await.unwrap()[..], b"89");
    }

    #[tokio::test]
    async fn test_range_offset_beyond_size() {
        let s = seeded().await;
        let err = read_range(&s, ByteRange::from_offset(10)).await.unwrap_err();
        assert_eq!(err.code(), Some(stowage_core::ErrorCode::InvalidRange));
    }

    #[tokio::test]
    async fn test_range_length_near_u64_max() {
        let s = seeded().await;
        let data = read_range(&s, ByteRange::new(2, u64::MAX)).await.unwrap();
        assert_eq!(&data[..], b"23456789");
    }

    #[test]
    fn test_range_header_length_near_u64_max() {
        assert_eq!(ByteRange::new(2, u64::MAX).to_header().unwrap(), "bytes=2-");
        assert_eq!(
            ByteRange::new(1, u64::MAX - 1).to_header().unwrap(),
            format!("bytes=1-{}", u64::MAX - 1)
        );
    }

    #[test]
    fn test_range_header() {
        assert_eq!(ByteRange::new(0, 5).to_header().unwrap(), "bytes=0-4");
        assert_eq!(ByteRange::from_offset(7).to_header().unwrap(), "bytes=7-");
        assert!(ByteRange::new(3, 0).to_header().is_err());
    }
}

// =============================================================================
// METADATA TESTS
// =============================================================================

mod metadata_tests {
    use super::*;

    #[tokio::test]
    async fn test_content_type() {
        let s = storage();
        s.make_bucket("bucket").await.unwrap();

        let meta = ObjectMetadata {
            content_type: Some("application/json".to_string()),
            ..Default::default()
        };

        s.put_object("bucket", "key", Bytes::from("{}"), meta).await.unwrap();

        let info = s.stat_object("bucket", "key").await.unwrap();
        assert_eq!(info.content_type, Some("application/json".to_string()));
    }

    #[tokio::test]
    async fn test_user_metadata() {
        let s = storage();
        s.make_bucket("bucket").await.unwrap();

        let mut meta = ObjectMetadata::default();
        meta.user_metadata
            .insert("custom-header".to_string(), "custom-value".to_string());
        meta.user_metadata
            .insert("another".to_string(), "value".to_string());

        s.put_object("bucket", "key", Bytes::from("data"), meta).await.unwrap();

        let info = s.stat_object("bucket", "key").await.unwrap();
        assert_eq!(info.user_metadata.get("custom-header"), Some(&"custom-value".to_string()));
        assert_eq!(info.user_metadata.get("another"), Some(&"value".to_string()));
    }
}

// =============================================================================
// FILE TRANSFER TESTS
// =============================================================================

mod file_tests {
    use super::*;

    #[tokio::test]
    async fn test_put_from_file_and_get_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.txt");
        let target = dir.path().join("deep").join("dir").join("out.txt");
        tokio::fs::write(&source, b"on disk").await.unwrap();

        let s = storage();
        s.make_bucket("bucket").await.unwrap();
        s.put_object_from_file("bucket", "file", &source, ObjectMetadata::default())
            .await
            .unwrap();

        let written = s.get_object_to_file("bucket", "file", &target).await.unwrap();
        assert_eq!(written, 7);
        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"on disk");
    }

    #[tokio::test]
    async fn test_put_from_missing_file() {
        let s = storage();
        s.make_bucket("bucket").await.unwrap();

        let result = s
            .put_object_from_file("bucket", "file", std::path::Path::new("/nonexistent/file"), ObjectMetadata::default())
            .await;
        assert!(matches!(result, Err(StorageError::Io(_))));
    }

    #[tokio::test]
    async fn test_get_to_file_missing_object_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("never.txt");

        let s = storage();
        s.make_bucket("bucket").await.unwrap();

        let err = s.get_object_to_file("bucket", "missing", &target).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!target.exists());
    }
}

// =============================================================================
// PRESIGNED URL TESTS
// =============================================================================

mod presign_tests {
    use super::*;

    #[tokio::test]
    async fn test_presigned_get_url_shape() {
        let s = storage();
        let url = s
            .presigned_get_url("bucket", "dir/file.txt", Duration::from_secs(3600))
            .await
            .unwrap();

        assert!(url.starts_with("http://localhost:9000/bucket/dir/file.txt?"));
        assert!(url.contains("X-Amz-Algorithm=AWS4-HMAC-SHA256"));
        assert!(url.contains("X-Amz-Expires=3600"));
        assert!(url.contains("X-Amz-Signature="));
    }

    #[tokio::test]
    async fn test_presigned_put_differs_from_get() {
        let s = storage();
        let get = s
            .presigned_get_url("bucket", "key", Duration::from_secs(60))
            .await
            .unwrap();
        let put = s
            .presigned_put_url("bucket", "key", Duration::from_secs(60))
            .await
            .unwrap();

        let signature = |url: &str| url.rsplit("X-Amz-Signature=").next().unwrap().to_string();
        assert_ne!(signature(&get), signature(&put));
    }
}
