//! Seam for the image transformation engine.

use async_trait::async_trait;
use blob_store::Produced;
use bytes::Bytes;
use sha2::{Digest, Sha256};

/// Turns source bytes plus the request's query into derived bytes.
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(
        &self,
        source: Bytes,
        content_type: &str,
        query: &str,
    ) -> anyhow::Result<Produced>;
}

/// Returns the source unchanged.
pub struct Passthrough;

#[async_trait]
impl Transformer for Passthrough {
    async fn transform(
        &self,
        source: Bytes,
        content_type: &str,
        _query: &str,
    ) -> anyhow::Result<Produced> {
        Ok(Produced {
            bytes: source,
            content_type: content_type.to_string(),
        })
    }
}

/// Cache key of a transformation request: lowercase hex SHA-256 of
/// `path?query`.
pub fn cache_key(virtual_path: &str, query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(virtual_path.as_bytes());
    hasher.update(b"?");
    hasher.update(query.as_bytes());
    hex::encode(hasher.finalize())
}
