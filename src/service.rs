use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum_server::Handle;
use blob_store::{
    BlobBackend,
    ContentAddressedCache,
    MappedBlobProvider,
    ObjectStoreBackend,
    PrefixRouter,
    ProviderRegistry,
};
use remote_reader::RemoteReaderService;
use tokio::{self, signal, sync::watch};
use tracing::info;

use crate::{
    config::ServerConfig,
    routes::{create_routes, RouteState},
    transform::{Passthrough, Transformer},
    upload::{BearerTokens, UploadState},
    warmup::Warmup,
};

#[derive(Clone)]
pub struct Service {
    pub config: ServerConfig,
    pub shutdown_tx: watch::Sender<()>,
    pub shutdown_rx: watch::Receiver<()>,
    pub backend: Arc<dyn BlobBackend>,
    pub registry: Arc<ProviderRegistry>,
    pub cache: Option<Arc<ContentAddressedCache>>,
    pub transformer: Arc<dyn Transformer>,
    pub upload: Option<UploadState>,
    /// Containers probed by the warmup task.
    pub containers: Vec<String>,
}

impl Service {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let backend: Arc<dyn BlobBackend> =
            Arc::new(ObjectStoreBackend::new(config.storage.backend.clone()));

        let router = PrefixRouter::new(&config.storage.mappings)
            .context("error initializing storage mappings")?;
        let mapped = MappedBlobProvider::new(router, backend.clone());
        let mut containers = mapped.containers();

        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(mapped));
        if let Some(remote_reader) = &config.remote_reader {
            let remote_reader = RemoteReaderService::new(remote_reader)
                .context("error initializing remote reader")?;
            registry.register(Arc::new(remote_reader));
        }

        let cache = if config.storage.cache.enabled {
            let cache = ContentAddressedCache::new(backend.clone(), config.storage.cache.clone())
                .context("error initializing cache")?;
            if !containers.contains(&config.storage.cache.container) {
                containers.push(config.storage.cache.container.clone());
            }
            Some(Arc::new(cache))
        } else {
            None
        };

        let upload = config.upload.as_ref().map(|upload| {
            if !containers.contains(&upload.container) {
                containers.push(upload.container.clone());
            }
            UploadState {
                backend: backend.clone(),
                container: upload.container.clone(),
                authorizer: Arc::new(BearerTokens::new(upload.tokens.clone())),
            }
        });

        info!(
            prefixes = ?registry.prefixes(),
            cache = cache.is_some(),
            upload = upload.is_some(),
            "storage initialized"
        );

        Ok(Self {
            config,
            shutdown_tx,
            shutdown_rx,
            backend,
            registry: Arc::new(registry),
            cache,
            transformer: Arc::new(Passthrough),
            upload,
            containers,
        })
    }

    pub async fn start(&self) -> Result<()> {
        if self.config.storage.warmup_interval_secs > 0 {
            let warmup = Warmup::new(
                self.backend.clone(),
                self.containers.clone(),
                Duration::from_secs(self.config.storage.warmup_interval_secs),
            );
            let shutdown_rx = self.shutdown_rx.clone();
            tokio::spawn(warmup.start(shutdown_rx));
        }

        let route_state = RouteState {
            registry: self.registry.clone(),
            cache: self.cache.clone(),
            transformer: self.transformer.clone(),
            seo: self.config.seo.clone(),
            upload: self.upload.clone(),
        };

        let handle = Handle::new();
        let handle_sh = handle.clone();
        let shutdown_tx = self.shutdown_tx.clone();
        tokio::spawn(async move {
            shutdown_signal(handle_sh, shutdown_tx).await;
            info!("graceful shutdown signal received, shutting down server gracefully");
        });

        let addr: SocketAddr = self.config.listen_addr.parse()?;
        info!("server api listening on {}", self.config.listen_addr);
        let routes = create_routes(route_state);
        axum_server::bind(addr)
            .handle(handle)
            .serve(routes.into_make_service())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal(handle: Handle, shutdown_tx: watch::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
        },
        _ = terminate => {
        },
    }
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
    // Receivers may already be gone.
    let _ = shutdown_tx.send(());
}
