//! Periodic backend probes that keep connections and credentials warm.

use std::{sync::Arc, time::Duration};

use blob_store::BlobBackend;
use tokio::sync::watch;
use tracing::{debug, error, info};

pub struct Warmup {
    backend: Arc<dyn BlobBackend>,
    containers: Vec<String>,
    interval: Duration,
}

impl Warmup {
    pub fn new(backend: Arc<dyn BlobBackend>, containers: Vec<String>, interval: Duration) -> Self {
        Self {
            backend,
            containers,
            interval,
        }
    }

    /// Probes every container once. Failures are logged, never returned.
    pub async fn probe_all(&self) -> usize {
        let mut healthy = 0;
        for container in &self.containers {
            match self.backend.probe(container).await {
                Ok(()) => {
                    healthy += 1;
                    debug!(
                        backend = self.backend.name(),
                        container = %container,
                        "warmup probe ok"
                    );
                }
                Err(e) => {
                    error!(
                        backend = self.backend.name(),
                        container = %container,
                        "warmup probe failed: {}", e
                    );
                }
            }
        }
        healthy
    }

    /// Probes on every tick until shutdown. The first probe runs right away.
    pub async fn start(self, mut shutdown_rx: watch::Receiver<()>) {
        info!(
            containers = self.containers.len(),
            interval_secs = self.interval.as_secs(),
            "starting backend warmup"
        );
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.probe_all().await;
                }
                _ = shutdown_rx.changed() => {
                    info!("backend warmup shutting down");
                    break;
                }
            }
        }
    }
}
