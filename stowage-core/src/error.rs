//! S3 error codes shared across stowage crates

use std::fmt;
use std::str::FromStr;

/// S3 error codes the storage layer distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Common
    AccessDenied,
    InvalidAccessKeyId,
    InvalidSignature,
    RequestTimeTooSkewed,
    ServiceUnavailable,
    InternalError,

    // Lookup
    NoSuchBucket,
    NoSuchKey,
    NotFound,

    // Bucket lifecycle
    BucketAlreadyExists,
    BucketAlreadyOwnedByYou,
    InvalidBucketName,

    // Requests
    InvalidArgument,
    InvalidRange,
    EntityTooLarge,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessDenied => "AccessDenied",
            Self::InvalidAccessKeyId => "InvalidAccessKeyId",
            Self::InvalidSignature => "SignatureDoesNotMatch",
            Self::RequestTimeTooSkewed => "RequestTimeTooSkewed",
            Self::ServiceUnavailable => "ServiceUnavailable",
            Self::InternalError => "InternalError",
            Self::NoSuchBucket => "NoSuchBucket",
            Self::NoSuchKey => "NoSuchKey",
            Self::NotFound => "NotFound",
            Self::BucketAlreadyExists => "BucketAlreadyExists",
            Self::BucketAlreadyOwnedByYou => "BucketAlreadyOwnedByYou",
            Self::InvalidBucketName => "InvalidBucketName",
            Self::InvalidArgument => "InvalidArgument",
            Self::InvalidRange => "InvalidRange",
            Self::EntityTooLarge => "EntityTooLarge",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized error code string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown error code: {0}")]
pub struct UnknownErrorCode(pub String);

impl FromStr for ErrorCode {
    type Err = UnknownErrorCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = match s {
            "AccessDenied" => Self::AccessDenied,
            "InvalidAccessKeyId" => Self::InvalidAccessKeyId,
            "SignatureDoesNotMatch" => Self::InvalidSignature,
            "RequestTimeTooSkewed" => Self::RequestTimeTooSkewed,
            "ServiceUnavailable" | "SlowDown" => Self::ServiceUnavailable,
            "InternalError" => Self::InternalError,
            "NoSuchBucket" => Self::NoSuchBucket,
            "NoSuchKey" => Self::NoSuchKey,
            "NotFound" => Self::NotFound,
            "BucketAlreadyExists" => Self::BucketAlreadyExists,
            "BucketAlreadyOwnedByYou" => Self::BucketAlreadyOwnedByYou,
            "InvalidBucketName" => Self::InvalidBucketName,
            "InvalidArgument" => Self::InvalidArgument,
            "InvalidRange" => Self::InvalidRange,
            "EntityTooLarge" => Self::EntityTooLarge,
            other => return Err(UnknownErrorCode(other.to_string())),
        };
        Ok(code)
    }
}
