//! Virtual-path providers and the registry that dispatches between them.

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use tracing::debug;

use crate::{BlobBackend, BlobData, BlobError, BlobProvider, BlobResult, PrefixRouter};

/// Serves the configured prefix mappings out of one backend.
pub struct MappedBlobProvider {
    router: PrefixRouter,
    backend: Arc<dyn BlobBackend>,
}

impl MappedBlobProvider {
    pub fn new(router: PrefixRouter, backend: Arc<dyn BlobBackend>) -> Self {
        Self { router, backend }
    }

    pub fn router(&self) -> &PrefixRouter {
        &self.router
    }

    /// Containers the mappings point at, deduplicated, in routing order.
    pub fn containers(&self) -> Vec<String> {
        let mut containers: Vec<String> = Vec::new();
        for mapping in self.router.mappings() {
            if !containers.iter().any(|c| c == mapping.container()) {
                containers.push(mapping.container().to_string());
            }
        }
        containers
    }
}

#[async_trait]
impl BlobProvider for MappedBlobProvider {
    fn prefixes(&self) -> Vec<String> {
        self.router.prefixes()
    }

    fn supports_path(&self, virtual_path: &str) -> bool {
        self.router.supports_path(virtual_path)
    }

    async fn fetch(&self, virtual_path: &str) -> BlobResult<BlobData> {
        let resolved = self.router.resolve(virtual_path).ok_or_else(|| {
            BlobError::missing(virtual_path, "No storage mapping matches this path.")
        })?;
        let container = resolved.mapping.container();

        let started = Instant::now();
        let result = self.backend.fetch(container, &resolved.key).await;
        debug!(
            backend = self.backend.name(),
            container = %container,
            key = %resolved.key,
            elapsed_ms = started.elapsed().as_millis() as u64,
            found = result.is_ok(),
            "mapped fetch",
        );

        match result {
            Err(BlobError::NotFound { container, key }) => Err(BlobError::missing(
                virtual_path,
                format!("Object \"{}\" does not exist in container \"{}\".", key, container),
            )),
            other => other,
        }
    }
}

/// Ordered set of providers. The first provider that claims a path
/// serves it.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn BlobProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn BlobProvider>) {
        self.providers.push(provider);
    }

    pub fn prefixes(&self) -> Vec<String> {
        self.providers.iter().flat_map(|p| p.prefixes()).collect()
    }

    pub fn supports_path(&self, virtual_path: &str) -> bool {
        self.providers.iter().any(|p| p.supports_path(virtual_path))
    }

    pub async fn fetch(&self, virtual_path: &str) -> BlobResult<BlobData> {
        match self.providers.iter().find(|p| p.supports_path(virtual_path)) {
            Some(provider) => provider.fetch(virtual_path).await,
            None => Err(BlobError::missing(
                virtual_path,
                "No provider is configured for this path.",
            )),
        }
    }
}
