//! Blob payloads and write modes.

use std::fmt;

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{stream::BoxStream, StreamExt};

use crate::BlobResult;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A fetched blob: a byte stream plus the metadata the backend reported.
pub struct BlobData {
    pub body: BoxStream<'static, BlobResult<Bytes>>,

    /// Content type / MIME type, when the backend knows it.
    pub content_type: Option<String>,

    pub last_modified: Option<DateTime<Utc>>,

    /// Size in bytes, when known up front.
    pub size_bytes: Option<u64>,
}

impl BlobData {
    /// Wraps bytes that are already in memory.
    pub fn from_bytes(bytes: Bytes, content_type: Option<String>) -> Self {
        let size_bytes = Some(bytes.len() as u64);
        Self {
            body: futures::stream::once(async move { Ok(bytes) }).boxed(),
            content_type,
            last_modified: None,
            size_bytes,
        }
    }

    pub fn content_type_or_default(&self) -> &str {
        self.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE)
    }

    /// Drains the body. Fails on the first broken chunk, so a partial
    /// read is never returned.
    pub async fn read_bytes(mut self) -> BlobResult<Bytes> {
        let mut bytes = BytesMut::new();
        while let Some(chunk) = self.body.next().await {
            bytes.extend_from_slice(&chunk?);
        }
        Ok(bytes.freeze())
    }
}

impl fmt::Debug for BlobData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobData")
            .field("content_type", &self.content_type)
            .field("last_modified", &self.last_modified)
            .field("size_bytes", &self.size_bytes)
            .finish_non_exhaustive()
    }
}

/// How a put treats an existing object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutMode {
    /// Replace whatever is there.
    Overwrite,
    /// Only write if nothing exists at the location yet.
    IfNotExists,
}

/// Result of a put that reached the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Written,
    /// `PutMode::IfNotExists` found an existing object.
    Conflict,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_bytes_concatenates_chunks() {
        let chunks = vec![Ok(Bytes::from_static(b"hello ")), Ok(Bytes::from_static(b"world"))];
        let data = BlobData {
            body: futures::stream::iter(chunks).boxed(),
            content_type: None,
            last_modified: None,
            size_bytes: None,
        };
        assert_eq!(data.content_type_or_default(), DEFAULT_CONTENT_TYPE);
        assert_eq!(data.read_bytes().await.unwrap(), Bytes::from_static(b"hello world"));
    }

    #[tokio::test]
    async fn test_read_bytes_fails_on_broken_chunk() {
        let chunks = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(crate::BlobError::Other {
                source: anyhow::anyhow!("connection reset"),
            }),
        ];
        let data = BlobData {
            body: futures::stream::iter(chunks).boxed(),
            content_type: None,
            last_modified: None,
            size_bytes: None,
        };
        assert!(data.read_bytes().await.is_err());
    }
}
