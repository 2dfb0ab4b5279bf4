//! S3-compatible object storage for stowage
//!
//! [`StorageFacade`] wraps any [`ObjectStore`] with a default bucket, upload
//! payload normalization and a not-found-tolerant existence check.
//! [`S3Store`] talks to AWS S3 or MinIO; [`EphemeralStore`] keeps everything
//! in memory.

pub mod facade;
pub mod payload;
pub mod settings;
pub mod storage;

pub use facade::{StorageFacade, WriteOptions, DEFAULT_CONTENT_TYPE, DEFAULT_PRESIGN_EXPIRY};
pub use payload::Payload;
pub use settings::StorageSettings;
pub use storage::{
    ByteRange, EphemeralStore, ObjectInfo, ObjectMetadata, ObjectStore, PutObjectResult, S3Store,
    StorageError,
};
