//! Storage side of the image store.
//!
//! Virtual paths are served by [`BlobProvider`]s. The mapped provider
//! routes a path through the [`PrefixRouter`] to a container and key in a
//! [`BlobBackend`]; other providers (the remote reader) plug into the same
//! [`ProviderRegistry`]. Derived images go through the
//! [`ContentAddressedCache`], which relies on the backend's conditional
//! put for first-writer-wins.
//!
//! Backends:
//!
//! - [`ObjectStoreBackend`]: S3, Azure, local filesystem and memory, via
//!   `object_store`
//! - [`HttpFetchBackend`]: GET against arbitrary origins, with retries and
//!   a per-host circuit breaker
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use blob_store::{
//!     BackendConfig,
//!     CacheConfig,
//!     ContentAddressedCache,
//!     ObjectStoreBackend,
//!     Produced,
//! };
//! use bytes::Bytes;
//!
//! # async fn example() -> Result<(), blob_store::BlobError> {
//! let backend = Arc::new(ObjectStoreBackend::new(BackendConfig::Memory));
//! let cache = ContentAddressedCache::new(backend, CacheConfig::default())?;
//!
//! let result = cache
//!     .get_or_create(b"9f86d081884c7d659a2feaa0c55ad015", || async {
//!         Ok(Produced {
//!             bytes: Bytes::from_static(b"resized"),
//!             content_type: "image/webp".to_string(),
//!         })
//!     })
//!     .await?;
//! println!("{}", result.outcome);
//! # Ok(())
//! # }
//! ```

mod backends;
mod cache;
mod circuit_breaker;
mod config;
mod error;
mod metadata;
mod metrics;
mod prefix;
mod provider;
mod retry;
mod traits;
mod upload;

pub use backends::{http::HttpFetchBackend, ObjectStoreBackend};
pub use cache::{CacheOutcome, CacheResult, ContentAddressedCache, Produced};
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use config::{
    default_local_root,
    BackendConfig,
    CacheConfig,
    CircuitBreakerConfig,
    HttpBackendConfig,
    PrefixMappingConfig,
    RetryConfig,
    StorageConfig,
    DEFAULT_MAX_TRACKED_HOSTS,
    MAX_BREAKER_DURATION_SECS,
};
pub use error::{BlobError, BlobResult};
pub use metadata::{BlobData, PutMode, PutOutcome, DEFAULT_CONTENT_TYPE};
pub use metrics::{BlobMetrics, Timer};
pub use prefix::{PrefixMapping, PrefixRouter, ResolvedPath};
pub use provider::{MappedBlobProvider, ProviderRegistry};
pub use retry::RetryPolicy;
pub use traits::{BlobBackend, BlobProvider};
pub use upload::{upload_idempotent, UploadOutcome};
