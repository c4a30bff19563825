//! Core backend and provider traits.

use async_trait::async_trait;
use bytes::Bytes;

use crate::{BlobData, BlobError, BlobResult, PutMode, PutOutcome};

/// Storage primitives against one storage system.
///
/// A container is a bucket (S3), a container (Azure), a directory (local)
/// or an origin host (HTTP fetch). Keys never start with `/`.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Backend label used in logs and metrics.
    fn name(&self) -> &str;

    /// Returns `BlobError::NotFound` if the object doesn't exist.
    async fn fetch(&self, container: &str, key: &str) -> BlobResult<BlobData>;

    /// Writes an object. With `PutMode::IfNotExists` the backend's own
    /// conditional write decides the race; losing it yields
    /// `PutOutcome::Conflict`, not an error.
    async fn put(
        &self,
        container: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
        mode: PutMode,
    ) -> BlobResult<PutOutcome>;

    /// Like `fetch`, with absence as `None`.
    async fn open_read(&self, container: &str, key: &str) -> BlobResult<Option<BlobData>> {
        match self.fetch(container, key).await {
            Ok(data) => Ok(Some(data)),
            Err(BlobError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Cheap round trip that keeps credentials and connections warm.
    async fn probe(&self, _container: &str) -> BlobResult<()> {
        Ok(())
    }
}

/// Answers "fetch the bytes this virtual path refers to" for the part of
/// the namespace it owns.
#[async_trait]
pub trait BlobProvider: Send + Sync {
    /// Virtual path prefixes this provider serves.
    fn prefixes(&self) -> Vec<String>;

    fn supports_path(&self, virtual_path: &str) -> bool;

    /// Fails with `BlobError::Missing` when the path can't be served.
    async fn fetch(&self, virtual_path: &str) -> BlobResult<BlobData>;
}
