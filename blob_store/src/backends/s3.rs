//! S3 client construction.

use object_store::aws::{AmazonS3, AmazonS3Builder, S3ConditionalPut};
use tracing::debug;

use crate::{BlobError, BlobResult};

/// Builds a client for one bucket.
///
/// Credentials and defaults come from the `AWS_*` environment, the
/// explicit settings override them. Conditional puts use `If-None-Match`
/// so `PutMode::IfNotExists` is enforced by S3 itself.
pub(crate) fn build(
    bucket: &str,
    region: Option<&str>,
    endpoint: Option<&str>,
    allow_http: bool,
) -> BlobResult<AmazonS3> {
    if bucket.is_empty() {
        return Err(BlobError::invalid_config("S3 bucket name cannot be empty"));
    }

    let mut builder = AmazonS3Builder::from_env()
        .with_bucket_name(bucket)
        .with_conditional_put(S3ConditionalPut::ETagMatch);
    if let Some(region) = region {
        builder = builder.with_region(region);
    }
    // For supporting localstack/minio for testing
    if let Some(endpoint) = endpoint {
        builder = builder.with_endpoint(endpoint);
    }
    if allow_http {
        builder = builder.with_allow_http(true);
    }

    let store = builder.build().map_err(|e| BlobError::Network {
        source: anyhow::Error::from(e),
    })?;

    debug!(bucket = %bucket, region = ?region, "created S3 blob store");
    Ok(store)
}
