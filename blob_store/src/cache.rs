//! Write-once, content-addressed cache for derived blobs.
//!
//! A lookup either serves the stored object or runs the caller's producer
//! and tries a conditional upload of the result. The conditional write is
//! the only deduplication: concurrent callers for the same key may all run
//! the producer, but at most one object is ever stored per name, across
//! processes and hosts alike.

use std::{future::Future, sync::Arc};

use bytes::Bytes;
use strum::{AsRefStr, Display, IntoStaticStr};
use tracing::{error, info, warn};

use crate::{
    BlobBackend,
    BlobError,
    BlobMetrics,
    BlobResult,
    CacheConfig,
    PutMode,
    PutOutcome,
};

/// How a cache call was satisfied. Exactly one per call; for metrics and
/// logs only, every outcome comes with valid bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum CacheOutcome {
    /// Served from the backend.
    DiskHit,
    /// Produced and stored by this call.
    WriteSucceeded,
    /// Produced, but another writer stored the object first.
    AlreadyExists,
    /// Produced, no write attempted (read-only cache or a backend that
    /// does not take writes).
    Miss,
    /// Produced, the write failed.
    Failed,
}

/// Freshly produced bytes handed to the cache.
#[derive(Debug, Clone)]
pub struct Produced {
    pub bytes: Bytes,
    pub content_type: String,
}

#[derive(Debug, Clone)]
pub struct CacheResult {
    pub bytes: Bytes,
    pub content_type: String,
    pub outcome: CacheOutcome,
}

pub struct ContentAddressedCache {
    backend: Arc<dyn BlobBackend>,
    config: CacheConfig,
    metrics: BlobMetrics,
}

impl ContentAddressedCache {
    pub fn new(backend: Arc<dyn BlobBackend>, config: CacheConfig) -> BlobResult<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            config,
            metrics: BlobMetrics::global(),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Object name for `key`: `/` after each of the first `shard_levels`
    /// groups of `shard_width` characters, the rest appended unsplit.
    /// Keys that are not UTF-8 are hex-encoded first.
    pub fn object_name(&self, key: &[u8]) -> String {
        let name = match std::str::from_utf8(key) {
            Ok(s) => s.to_string(),
            Err(_) => hex::encode(key),
        };
        shard(&name, self.config.shard_levels, self.config.shard_width)
    }

    /// Serves `key` from the backend, or runs `producer` and stores its
    /// output. Producer errors are returned unchanged; storage errors
    /// never are.
    pub async fn get_or_create<F, Fut>(&self, key: &[u8], producer: F) -> BlobResult<CacheResult>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = BlobResult<Produced>> + Send,
    {
        let _timer = self.metrics.timer(self.backend.name(), "cache_get_or_create");
        let container = self.config.container.as_str();
        let name = self.object_name(key);

        if let Some((bytes, content_type)) = self.lookup(&name).await {
            return Ok(self.finish(&name, bytes, content_type, CacheOutcome::DiskHit));
        }

        let produced = producer().await?;

        let outcome = if self.config.read_only {
            CacheOutcome::Miss
        } else {
            match self
                .backend
                .put(
                    container,
                    &name,
                    produced.bytes.clone(),
                    &produced.content_type,
                    PutMode::IfNotExists,
                )
                .await
            {
                Ok(PutOutcome::Written) => CacheOutcome::WriteSucceeded,
                Ok(PutOutcome::Conflict) => {
                    warn!(container = %container, key = %name, "cache object already exists");
                    CacheOutcome::AlreadyExists
                }
                Err(BlobError::Unsupported { .. }) => CacheOutcome::Miss,
                Err(e) => {
                    error!(container = %container, key = %name, "cache write failed: {}", e);
                    CacheOutcome::Failed
                }
            }
        };

        Ok(self.finish(&name, produced.bytes, produced.content_type, outcome))
    }

    /// A stored object, fully read. Read errors count as absence so a
    /// broken object is regenerated instead of served in part.
    async fn lookup(&self, name: &str) -> Option<(Bytes, String)> {
        let container = self.config.container.as_str();
        let data = match self.backend.open_read(container, name).await {
            Ok(Some(data)) => data,
            Ok(None) => return None,
            Err(e) => {
                error!(container = %container, key = %name, "cache lookup failed: {}", e);
                return None;
            }
        };

        let content_type = data.content_type_or_default().to_string();
        match data.read_bytes().await {
            Ok(bytes) => Some((bytes, content_type)),
            Err(e) => {
                error!(container = %container, key = %name, "cache read failed: {}", e);
                None
            }
        }
    }

    fn finish(
        &self,
        name: &str,
        bytes: Bytes,
        content_type: String,
        outcome: CacheOutcome,
    ) -> CacheResult {
        self.metrics.record_cache_outcome(outcome.into());
        info!(
            outcome = %outcome,
            key = %name,
            content_type = %content_type,
            size = bytes.len(),
            "cache result",
        );
        CacheResult {
            bytes,
            content_type,
            outcome,
        }
    }
}

fn shard(name: &str, levels: usize, width: usize) -> String {
    if levels == 0 || width == 0 {
        return name.to_string();
    }
    let limit = levels * width;
    let mut sharded = String::with_capacity(name.len() + levels);
    for (i, c) in name.chars().enumerate() {
        if i > 0 && i <= limit && i % width == 0 {
            sharded.push('/');
        }
        sharded.push(c);
    }
    sharded
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::{BlobData, ObjectStoreBackend};

    fn cache_over(backend: Arc<dyn BlobBackend>) -> ContentAddressedCache {
        ContentAddressedCache::new(backend, CacheConfig::default()).unwrap()
    }

    fn produced(body: &'static [u8]) -> BlobResult<Produced> {
        Ok(Produced {
            bytes: Bytes::from_static(body),
            content_type: "image/webp".to_string(),
        })
    }

    #[test]
    fn test_object_name_sharding() {
        assert_eq!(shard("abcdefghijklmnop", 5, 2), "ab/cd/ef/gh/ij/klmnop");
        assert_eq!(shard("abcdefghij", 5, 2), "ab/cd/ef/gh/ij");
        assert_eq!(shard("abc", 5, 2), "ab/c");
        assert_eq!(shard("abcdefgh", 2, 3), "abc/def/gh");
        assert_eq!(shard("abcdef", 0, 2), "abcdef");
        assert_eq!(shard("", 5, 2), "");
    }

    #[test]
    fn test_non_utf8_keys_are_hex_encoded() {
        let cache = cache_over(Arc::new(ObjectStoreBackend::in_memory()));
        assert_eq!(cache.object_name(&[0xff, 0xfe, 0x00, 0x01, 0x02]), "ff/fe/00/01/02");
        assert_eq!(cache.object_name(b"0123456789abc"), "01/23/45/67/89/abc");
    }

    #[tokio::test]
    async fn test_second_call_is_disk_hit() {
        let cache = cache_over(Arc::new(ObjectStoreBackend::in_memory()));
        let calls = AtomicUsize::new(0);
        let calls = &calls;
        let producer = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            produced(b"resized")
        };

        let first = cache.get_or_create(b"0123456789abcdef", producer).await.unwrap();
        let second = cache.get_or_create(b"0123456789abcdef", producer).await.unwrap();

        assert_eq!(first.outcome, CacheOutcome::WriteSucceeded);
        assert_eq!(second.outcome, CacheOutcome::DiskHit);
        assert_eq!(first.bytes, second.bytes);
        assert_eq!(second.content_type, "image/webp");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_writers_store_once() {
        let backend = Arc::new(ObjectStoreBackend::in_memory());
        let cache = Arc::new(cache_over(backend.clone()));

        // Every caller misses before any of them writes.
        let barrier = Arc::new(tokio::sync::Barrier::new(8));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_create(b"race-key-0001", || async move {
                        barrier.wait().await;
                        produced(b"same bytes")
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut written = 0;
        for handle in handles {
            let result = handle.await.unwrap();
            assert_eq!(result.bytes, Bytes::from_static(b"same bytes"));
            match result.outcome {
                CacheOutcome::WriteSucceeded => written += 1,
                CacheOutcome::AlreadyExists => {}
                other => panic!("unexpected outcome {other}"),
            }
        }
        assert_eq!(written, 1);

        let stored = backend
            .fetch("resize-cache", &cache.object_name(b"race-key-0001"))
            .await
            .unwrap()
            .read_bytes()
            .await
            .unwrap();
        assert_eq!(stored, Bytes::from_static(b"same bytes"));
    }

    #[tokio::test]
    async fn test_producer_failure_propagates() {
        let cache = cache_over(Arc::new(ObjectStoreBackend::in_memory()));
        let err = cache
            .get_or_create(b"bad-source-key", || async {
                Err(BlobError::Producer {
                    source: anyhow::anyhow!("decoder exploded"),
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::Producer { .. }));
    }

    #[tokio::test]
    async fn test_read_only_cache_never_writes() {
        let backend = Arc::new(ObjectStoreBackend::in_memory());
        let config = CacheConfig {
            read_only: true,
            ..Default::default()
        };
        let cache = ContentAddressedCache::new(backend.clone(), config).unwrap();

        let result = cache
            .get_or_create(b"readonly-key", || async { produced(b"x") })
            .await
            .unwrap();
        assert_eq!(result.outcome, CacheOutcome::Miss);
        assert!(backend
            .open_read("resize-cache", &cache.object_name(b"readonly-key"))
            .await
            .unwrap()
            .is_none());
    }

    /// Misses every lookup and fails every write.
    struct BrokenBackend;

    #[async_trait]
    impl BlobBackend for BrokenBackend {
        fn name(&self) -> &str {
            "broken"
        }

        async fn fetch(&self, container: &str, key: &str) -> BlobResult<BlobData> {
            Err(BlobError::NotFound {
                container: container.to_string(),
                key: key.to_string(),
            })
        }

        async fn put(
            &self,
            _container: &str,
            _key: &str,
            _data: Bytes,
            _content_type: &str,
            _mode: PutMode,
        ) -> BlobResult<PutOutcome> {
            Err(BlobError::Network {
                source: anyhow::anyhow!("connection reset"),
            })
        }
    }

    #[tokio::test]
    async fn test_failed_write_still_returns_bytes() {
        let cache = cache_over(Arc::new(BrokenBackend));
        let result = cache
            .get_or_create(b"some-key-12345", || async { produced(b"fresh") })
            .await
            .unwrap();
        assert_eq!(result.outcome, CacheOutcome::Failed);
        assert_eq!(result.bytes, Bytes::from_static(b"fresh"));
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(CacheOutcome::DiskHit.to_string(), "disk_hit");
        assert_eq!(CacheOutcome::WriteSucceeded.as_ref(), "write_succeeded");
    }
}
