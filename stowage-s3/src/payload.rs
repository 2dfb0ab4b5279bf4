//! Upload payload normalization

use crate::storage::StorageError;
use bytes::Bytes;
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Upper bound on buffer space reserved up front from a declared length
const MAX_PREALLOCATE: u64 = 8 * 1024 * 1024;

/// Content handed to [`StorageFacade::write_object`](crate::StorageFacade::write_object)
pub enum Payload {
    /// In-memory buffer
    Bytes(Bytes),
    /// Async reader; read once, front to back
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl Payload {
    pub fn reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::Reader(Box::new(reader))
    }

    /// Resolve the payload into exactly the bytes to upload.
    ///
    /// With `length` given, exactly that many bytes are taken; a payload
    /// shorter than `length` is an error. Without it, a buffer is used whole
    /// and a reader is drained to its end. Readers are never read twice.
    pub(crate) async fn into_body(self, length: Option<u64>) -> Result<Bytes, StorageError> {
        match self {
            Self::Bytes(data) => match length {
                None => Ok(data),
                Some(length) => {
                    let wanted = to_usize(length)?;
                    if wanted > data.len() {
                        return Err(StorageError::InvalidArgument(format!(
                            "length {length} exceeds payload size {}",
                            data.len()
                        )));
                    }
                    Ok(data.slice(..wanted))
                }
            },
            Self::Reader(reader) => {
                let mut buf = Vec::new();
                match length {
                    None => {
                        let mut reader = reader;
                        reader.read_to_end(&mut buf).await?;
                    }
                    Some(length) => {
                        buf.reserve(to_usize(length.min(MAX_PREALLOCATE))?);
                        reader.take(length).read_to_end(&mut buf).await?;
                        if (buf.len() as u64) < length {
                            return Err(StorageError::InvalidArgument(format!(
                                "stream ended after {} of {length} bytes",
                                buf.len()
                            )));
                        }
                    }
                }
                Ok(Bytes::from(buf))
            }
        }
    }
}

fn to_usize(length: u64) -> Result<usize, StorageError> {
    usize::try_from(length)
        .map_err(|_| StorageError::InvalidArgument(format!("length {length} is too large")))
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(data) => f.debug_tuple("Bytes").field(&data.len()).finish(),
            Self::Reader(_) => f.write_str("Reader"),
        }
    }
}

impl From<Bytes> for Payload {
    fn from(data: Bytes) -> Self {
        Self::Bytes(data)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(data))
    }
}

impl From<&'static [u8]> for Payload {
    fn from(data: &'static [u8]) -> Self {
        Self::Bytes(Bytes::from_static(data))
    }
}

impl<const N: usize> From<&'static [u8; N]> for Payload {
    fn from(data: &'static [u8; N]) -> Self {
        Self::Bytes(Bytes::from_static(data))
    }
}

impl From<String> for Payload {
    fn from(data: String) -> Self {
        Self::Bytes(Bytes::from(data))
    }
}

impl From<&'static str> for Payload {
    fn from(data: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(data.as_bytes()))
    }
}
