//! Blob store backend implementations.

pub mod azure;
pub mod http;
pub mod local;
pub mod s3;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::StreamExt;
use object_store::{
    memory::InMemory,
    path::Path as ObjectPath,
    Attribute,
    Attributes,
    ObjectStore,
    PutMode as StorePutMode,
    PutOptions,
    PutPayload,
};
use tracing::{debug, error};

use crate::{
    error::from_object_store,
    BackendConfig,
    BlobBackend,
    BlobData,
    BlobError,
    BlobMetrics,
    BlobResult,
    PutMode,
    PutOutcome,
};

/// Object store backed `BlobBackend` (S3, Azure, local filesystem, memory).
///
/// One object_store client per container, built on first use and kept
/// for the life of the backend. Conditional writes map to
/// `object_store::PutMode::Create`, so first-writer-wins is enforced by
/// the store itself.
pub struct ObjectStoreBackend {
    name: &'static str,
    config: BackendConfig,
    stores: DashMap<String, Arc<dyn ObjectStore>>,
    metrics: BlobMetrics,
}

impl ObjectStoreBackend {
    pub fn new(config: BackendConfig) -> Self {
        let name = match config {
            BackendConfig::S3 { .. } => "s3",
            BackendConfig::Azure { .. } => "azure",
            BackendConfig::Local { .. } => "local",
            BackendConfig::Memory => "memory",
        };
        Self {
            name,
            config,
            stores: DashMap::new(),
            metrics: BlobMetrics::global(),
        }
    }

    /// Volatile backend, mostly for tests and local development.
    pub fn in_memory() -> Self {
        Self::new(BackendConfig::Memory)
    }

    fn store(&self, container: &str) -> BlobResult<Arc<dyn ObjectStore>> {
        if let Some(store) = self.stores.get(container) {
            return Ok(Arc::clone(store.value()));
        }

        let store: Arc<dyn ObjectStore> = match &self.config {
            BackendConfig::S3 {
                region,
                endpoint,
                allow_http,
            } => Arc::new(s3::build(
                container,
                region.as_deref(),
                endpoint.as_deref(),
                *allow_http,
            )?),
            BackendConfig::Azure { account } => {
                Arc::new(azure::build(container, account.as_deref())?)
            }
            BackendConfig::Local { root } => Arc::new(local::build(root, container)?),
            BackendConfig::Memory => Arc::new(InMemory::new()),
        };
        debug!(backend = self.name, container = %container, "created object store client");

        // A concurrent caller may have raced us here; keep whichever landed first.
        let entry = self.stores.entry(container.to_string()).or_insert(store);
        Ok(Arc::clone(entry.value()))
    }

    /// The local filesystem store rejects object attributes, so content
    /// types there are guessed from the key on read.
    fn supports_attributes(&self) -> bool {
        !matches!(self.config, BackendConfig::Local { .. })
    }

    fn record_failure(&self, operation: &'static str, err: &BlobError) {
        if !err.is_not_found() {
            self.metrics.record_error(self.name, operation, err.kind());
        }
    }
}

#[async_trait]
impl BlobBackend for ObjectStoreBackend {
    fn name(&self) -> &str {
        self.name
    }

    async fn fetch(&self, container: &str, key: &str) -> BlobResult<BlobData> {
        let _timer = self.metrics.timer(self.name, "fetch");
        let store = self.store(container)?;
        let path = ObjectPath::from(key);

        let result = store
            .get(&path)
            .await
            .map_err(|e| from_object_store(e, container, key))
            .inspect_err(|e| self.record_failure("fetch", e))?;

        let content_type = result
            .attributes
            .get(&Attribute::ContentType)
            .map(|value| value.to_string())
            .or_else(|| mime_guess::from_path(key).first().map(|m| m.to_string()));
        let last_modified = Some(result.meta.last_modified);
        let size_bytes = Some(result.meta.size as u64);

        let (container, key) = (container.to_string(), key.to_string());
        let body = result
            .into_stream()
            .map(move |chunk| chunk.map_err(|e| from_object_store(e, &container, &key)))
            .boxed();

        Ok(BlobData {
            body,
            content_type,
            last_modified,
            size_bytes,
        })
    }

    async fn put(
        &self,
        container: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
        mode: PutMode,
    ) -> BlobResult<PutOutcome> {
        let _timer = self.metrics.timer(self.name, "put");
        let store = self.store(container)?;
        let path = ObjectPath::from(key);

        let mut opts = PutOptions {
            mode: match mode {
                PutMode::Overwrite => StorePutMode::Overwrite,
                PutMode::IfNotExists => StorePutMode::Create,
            },
            ..Default::default()
        };
        if self.supports_attributes() {
            let mut attributes = Attributes::new();
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
            opts.attributes = attributes;
        }

        match store.put_opts(&path, PutPayload::from(data), opts).await {
            Ok(_) => Ok(PutOutcome::Written),
            Err(e) => match from_object_store(e, container, key) {
                BlobError::AlreadyExists { .. } => Ok(PutOutcome::Conflict),
                err => {
                    error!(
                        backend = self.name,
                        container = %container,
                        key = %key,
                        "put failed: {}", err
                    );
                    self.record_failure("put", &err);
                    Err(err)
                }
            },
        }
    }

    async fn probe(&self, container: &str) -> BlobResult<()> {
        let store = self.store(container)?;
        match store.head(&ObjectPath::from(".probe")).await {
            Ok(_) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(from_object_store(e, container, ".probe")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_put_then_fetch_keeps_content_type() {
        let backend = ObjectStoreBackend::in_memory();
        let outcome = backend
            .put(
                "photos",
                "a/b.bin",
                Bytes::from_static(b"payload"),
                "image/webp",
                PutMode::Overwrite,
            )
            .await
            .unwrap();
        assert_eq!(outcome, PutOutcome::Written);

        let data = backend.fetch("photos", "a/b.bin").await.unwrap();
        assert_eq!(data.content_type.as_deref(), Some("image/webp"));
        assert_eq!(data.size_bytes, Some(7));
        assert!(data.last_modified.is_some());
        assert_eq!(data.read_bytes().await.unwrap(), Bytes::from_static(b"payload"));
    }

    #[tokio::test]
    async fn test_memory_conditional_put_conflicts() {
        let backend = ObjectStoreBackend::in_memory();
        let first = backend
            .put("c", "k", Bytes::from_static(b"one"), "text/plain", PutMode::IfNotExists)
            .await
            .unwrap();
        let second = backend
            .put("c", "k", Bytes::from_static(b"two"), "text/plain", PutMode::IfNotExists)
            .await
            .unwrap();
        assert_eq!(first, PutOutcome::Written);
        assert_eq!(second, PutOutcome::Conflict);

        // The first writer's bytes stay in place.
        let stored = backend.fetch("c", "k").await.unwrap().read_bytes().await.unwrap();
        assert_eq!(stored, Bytes::from_static(b"one"));
    }

    #[tokio::test]
    async fn test_memory_overwrite_replaces() {
        let backend = ObjectStoreBackend::in_memory();
        for body in [&b"one"[..], &b"two"[..]] {
            backend
                .put("c", "k", Bytes::copy_from_slice(body), "text/plain", PutMode::Overwrite)
                .await
                .unwrap();
        }
        let stored = backend.fetch("c", "k").await.unwrap().read_bytes().await.unwrap();
        assert_eq!(stored, Bytes::from_static(b"two"));
    }

    #[tokio::test]
    async fn test_containers_are_isolated() {
        let backend = ObjectStoreBackend::in_memory();
        backend
            .put("left", "k", Bytes::from_static(b"x"), "text/plain", PutMode::Overwrite)
            .await
            .unwrap();
        let result = backend.fetch("right", "k").await;
        assert!(matches!(result, Err(BlobError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_open_read_missing_is_none() {
        let backend = ObjectStoreBackend::in_memory();
        assert!(backend.open_read("c", "nope").await.unwrap().is_none());
        assert!(backend.probe("c").await.is_ok());
    }
}
