//! Blob storage configuration.

use std::{collections::HashMap, env, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{BlobError, BlobResult};

/// Which object store the mapped prefixes and the cache live in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    S3 {
        #[serde(default)]
        region: Option<String>,
        /// For localstack/minio.
        #[serde(default)]
        endpoint: Option<String>,
        #[serde(default)]
        allow_http: bool,
    },
    Azure {
        /// Falls back to `AZURE_STORAGE_ACCOUNT_NAME`.
        #[serde(default)]
        account: Option<String>,
    },
    Local {
        #[serde(default = "default_local_root")]
        root: PathBuf,
    },
    Memory,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Local {
            root: default_local_root(),
        }
    }
}

/// Default root for the local backend.
pub fn default_local_root() -> PathBuf {
    env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("imagestore_storage/blobs")
}

/// One virtual-path prefix bound to a container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrefixMappingConfig {
    pub url_prefix: String,
    pub container: String,
    #[serde(default)]
    pub blob_prefix: String,
    #[serde(default)]
    pub ignore_prefix_case: bool,
    #[serde(default)]
    pub lowercase_blob_path: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub container: String,
    /// Number of leading path segments the object name is split into.
    pub shard_levels: usize,
    /// Characters per shard segment.
    pub shard_width: usize,
    /// Serve hits but never write.
    pub read_only: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            container: "resize-cache".to_string(),
            shard_levels: 5,
            shard_width: 2,
            read_only: false,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> BlobResult<()> {
        if self.container.trim().is_empty() {
            return Err(BlobError::invalid_config("cache container cannot be empty"));
        }
        if self.shard_levels > 0 && self.shard_width == 0 {
            return Err(BlobError::invalid_config(
                "cache shard_width must be positive when shard_levels is set",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendConfig,
    pub mappings: Vec<PrefixMappingConfig>,
    pub cache: CacheConfig,
    /// Seconds between backend probes, 0 disables the warmup task.
    pub warmup_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            mappings: Vec::new(),
            cache: CacheConfig::default(),
            warmup_interval_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    pub initial_delay_ms: u64,
    pub max_retries: u32,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 300,
            max_retries: 3,
            max_delay_ms: 5_000,
        }
    }
}

/// One day. Keeps `Instant` arithmetic on break deadlines in range.
pub const MAX_BREAKER_DURATION_SECS: u64 = 86_400;

/// Default number of origin hosts with their own circuit breaker.
pub const DEFAULT_MAX_TRACKED_HOSTS: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failure ratio in the sampling window that opens the circuit.
    pub failure_ratio: f64,
    pub sampling_window_secs: u64,
    /// Samples required in the window before the ratio is considered.
    pub minimum_throughput: u32,
    pub break_duration_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_ratio: 0.5,
            sampling_window_secs: 10,
            minimum_throughput: 8,
            break_duration_secs: 30,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn sampling_window(&self) -> Duration {
        Duration::from_secs(self.sampling_window_secs)
    }

    pub fn break_duration(&self) -> Duration {
        Duration::from_secs(self.break_duration_secs)
    }

    pub fn validate(&self) -> BlobResult<()> {
        if !(self.failure_ratio > 0.0 && self.failure_ratio <= 1.0) {
            return Err(BlobError::invalid_config(format!(
                "circuit breaker failure_ratio must be in (0, 1], got {}",
                self.failure_ratio
            )));
        }
        if self.sampling_window_secs == 0 || self.break_duration_secs == 0 {
            return Err(BlobError::invalid_config(
                "circuit breaker durations must be positive",
            ));
        }
        if self.sampling_window_secs > MAX_BREAKER_DURATION_SECS ||
            self.break_duration_secs > MAX_BREAKER_DURATION_SECS
        {
            return Err(BlobError::invalid_config(format!(
                "circuit breaker durations cannot exceed {} seconds",
                MAX_BREAKER_DURATION_SECS
            )));
        }
        if self.minimum_throughput == 0 {
            return Err(BlobError::invalid_config(
                "circuit breaker minimum_throughput must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Outbound HTTP settings for the HTTP-fetch backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpBackendConfig {
    pub use_http: bool,
    pub request_timeout_ms: u64,
    pub default_headers: HashMap<String, String>,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    /// Breakers are kept for the most recently used hosts only.
    pub max_tracked_hosts: usize,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            use_http: false,
            request_timeout_ms: 30_000,
            default_headers: HashMap::new(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            max_tracked_hosts: DEFAULT_MAX_TRACKED_HOSTS,
        }
    }
}

impl HttpBackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> BlobResult<()> {
        if self.max_tracked_hosts == 0 {
            return Err(BlobError::invalid_config(
                "max_tracked_hosts must be positive",
            ));
        }
        self.circuit_breaker.validate()
    }
}
