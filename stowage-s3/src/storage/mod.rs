//! Object store backends

mod ephemeral;
mod presign;
mod s3;
mod traits;

#[cfg(test)]
mod tests;

pub use ephemeral::EphemeralStore;
pub use presign::{AddressingStyle, Signer};
pub use s3::{S3Store, DEFAULT_REGION};
pub use traits::{
    ByteRange, ObjectBody, ObjectInfo, ObjectMetadata, ObjectStore, PutObjectResult, StorageError,
};
