//! HTTP fetch backend for arbitrary third-party origins.
//!
//! The container is the origin authority (`host[:port]`), the key is the
//! path on that origin. Every call goes through the retry policy and the
//! origin's circuit breaker.

use std::num::NonZeroUsize;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use lru::LruCache;
use parking_lot::Mutex;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, DATE, LAST_MODIFIED},
    Response,
    StatusCode,
};
use tracing::debug;

use crate::{
    BlobBackend,
    BlobData,
    BlobError,
    BlobMetrics,
    BlobResult,
    CircuitBreaker,
    CircuitBreakerConfig,
    HttpBackendConfig,
    PutMode,
    PutOutcome,
    RetryPolicy,
};

pub struct HttpFetchBackend {
    client: reqwest::Client,
    scheme: &'static str,
    retry: RetryPolicy,
    breaker_config: CircuitBreakerConfig,
    /// Keyed by lowercased authority, least recently used evicted first.
    breakers: Mutex<LruCache<String, CircuitBreaker>>,
    metrics: BlobMetrics,
}

impl HttpFetchBackend {
    pub fn new(config: &HttpBackendConfig) -> BlobResult<Self> {
        config.validate()?;
        let max_tracked_hosts = NonZeroUsize::new(config.max_tracked_hosts)
            .ok_or_else(|| BlobError::invalid_config("max_tracked_hosts must be positive"))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.default_headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                BlobError::invalid_config(format!("invalid header name {:?}: {}", name, e))
            })?;
            let mut value = HeaderValue::from_str(value).map_err(|e| {
                BlobError::invalid_config(format!("invalid value for header {}: {}", name, e))
            })?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| BlobError::Network {
                source: anyhow::Error::from(e),
            })?;

        Ok(Self {
            client,
            scheme: if config.use_http { "http" } else { "https" },
            retry: RetryPolicy::new(&config.retry),
            breaker_config: config.circuit_breaker.clone(),
            breakers: Mutex::new(LruCache::new(max_tracked_hosts)),
            metrics: BlobMetrics::global(),
        })
    }

    pub fn url_for(&self, authority: &str, key: &str) -> String {
        format!("{}://{}/{}", self.scheme, authority, key.trim_start_matches('/'))
    }

    /// The breaker guarding calls to `authority`. Host names are
    /// case-insensitive, so `CDN.Example.com` shares a breaker with
    /// `cdn.example.com`.
    pub fn breaker(&self, authority: &str) -> CircuitBreaker {
        let key = authority.to_ascii_lowercase();
        let mut breakers = self.breakers.lock();
        if let Some(breaker) = breakers.get(&key) {
            return breaker.clone();
        }
        let breaker = CircuitBreaker::new(&key, self.breaker_config.clone());
        breakers.put(key, breaker.clone());
        breaker
    }

    /// Number of hosts that currently have a breaker.
    pub fn tracked_hosts(&self) -> usize {
        self.breakers.lock().len()
    }

    /// GET with retries. Transient failures (transport errors, 5xx, 408)
    /// are retried; any other response is returned as is.
    async fn get_with_retries(&self, authority: &str, url: &str) -> BlobResult<Response> {
        let breaker = self.breaker(authority);
        let mut attempt = 0;
        loop {
            if !breaker.allow_request() {
                return Err(BlobError::CircuitOpen {
                    host: authority.to_string(),
                });
            }

            let err = match self.client.get(url).send().await {
                Ok(resp) if !is_transient(resp.status()) => {
                    breaker.record_success();
                    return Ok(resp);
                }
                Ok(resp) => BlobError::Upstream {
                    url: url.to_string(),
                    status: Some(resp.status().as_u16()),
                    reason: resp
                        .status()
                        .canonical_reason()
                        .unwrap_or("transient status")
                        .to_string(),
                },
                Err(e) => BlobError::Upstream {
                    url: url.to_string(),
                    status: None,
                    reason: e.to_string(),
                },
            };
            breaker.record_failure();

            if attempt >= self.retry.max_retries() {
                return Err(err);
            }
            let delay = self.retry.delay_for(attempt);
            debug!(url = %url, attempt, delay_ms = delay.as_millis() as u64, "retrying: {}", err);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn is_transient(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT
}

fn header_date(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    headers
        .get(LAST_MODIFIED)
        .or_else(|| headers.get(DATE))
        .and_then(|value| value.to_str().ok())
        .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
        .map(|date| date.with_timezone(&Utc))
}

#[async_trait]
impl BlobBackend for HttpFetchBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, container: &str, key: &str) -> BlobResult<BlobData> {
        let _timer = self.metrics.timer("http", "fetch");
        let url = self.url_for(container, key);

        let resp = self
            .get_with_retries(container, &url)
            .await
            .inspect_err(|e| self.metrics.record_error("http", "fetch", e.kind()))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(BlobError::NotFound {
                container: container.to_string(),
                key: key.to_string(),
            });
        }
        if !status.is_success() {
            self.metrics.record_error("http", "fetch", "status");
            return Err(BlobError::Upstream {
                url,
                status: Some(status.as_u16()),
                reason: status.canonical_reason().unwrap_or("unexpected status").to_string(),
            });
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let last_modified = header_date(resp.headers());
        let size_bytes = resp.content_length();

        let body = resp
            .bytes_stream()
            .map(move |chunk| {
                chunk.map_err(|e| BlobError::Upstream {
                    url: url.clone(),
                    status: None,
                    reason: e.to_string(),
                })
            })
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
        _container: &str,
        _key: &str,
        _data: Bytes,
        _content_type: &str,
        _mode: PutMode,
    ) -> BlobResult<PutOutcome> {
        Err(BlobError::Unsupported {
            backend: "http".to_string(),
            operation: "put".to_string(),
        })
    }
}
