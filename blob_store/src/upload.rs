//! Write-once uploads that tolerate re-sending the same content.

use bytes::Bytes;
use futures::StreamExt;
use tracing::{info, warn};

use crate::{BlobBackend, BlobData, BlobResult, PutMode, PutOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Created,
    /// An object with the same bytes was already there.
    Identical,
    /// An object with different bytes was already there and was kept.
    Differs,
}

/// Uploads `data` unless an object exists at `key`, in which case the
/// stored bytes are compared against `data`.
pub async fn upload_idempotent(
    backend: &dyn BlobBackend,
    container: &str,
    key: &str,
    data: Bytes,
    content_type: &str,
) -> BlobResult<UploadOutcome> {
    let key = key.trim_start_matches('/');
    let outcome = backend
        .put(container, key, data.clone(), content_type, PutMode::IfNotExists)
        .await?;
    if outcome == PutOutcome::Written {
        info!(container = %container, key = %key, size = data.len(), "uploaded blob");
        return Ok(UploadOutcome::Created);
    }

    let existing = backend.fetch(container, key).await?;
    if same_content(existing, &data).await? {
        Ok(UploadOutcome::Identical)
    } else {
        warn!(container = %container, key = %key, "upload differs from stored blob");
        Ok(UploadOutcome::Differs)
    }
}

/// Compares chunk by chunk and stops at the first mismatch.
async fn same_content(mut existing: BlobData, expected: &[u8]) -> BlobResult<bool> {
    if existing.size_bytes.is_some_and(|size| size != expected.len() as u64) {
        return Ok(false);
    }
    let mut offset = 0;
    while let Some(chunk) = existing.body.next().await {
        let chunk = chunk?;
        let end = offset + chunk.len();
        if end > expected.len() || expected[offset..end] != chunk[..] {
            return Ok(false);
        }
        offset = end;
    }
    Ok(offset == expected.len())
}
