//! Serves `<prefix><token>/<host>/<path>` by fetching
//! `https://<host>/<path>`, provided the host is allowlisted or the token
//! is a valid signature for it.

use std::sync::Arc;

use async_trait::async_trait;
use blob_store::{BlobBackend, BlobData, BlobError, BlobProvider, BlobResult, HttpFetchBackend};
use tracing::{debug, warn};
use url::Host;

use crate::{DomainAllowlist, RemoteReaderConfig, SignatureCache, SignedReference, UrlSigner};

const INVALID_SIGNATURE: &str = "Invalid signature.";

pub struct RemoteReaderService {
    prefix: String,
    signer: UrlSigner,
    signatures: SignatureCache,
    allowlist: DomainAllowlist,
    strict_host_validation: bool,
    backend: Arc<dyn BlobBackend>,
}

impl RemoteReaderService {
    /// Builds the service over the HTTP fetch backend described by
    /// `config.http`.
    pub fn new(config: &RemoteReaderConfig) -> BlobResult<Self> {
        let backend = Arc::new(HttpFetchBackend::new(&config.http)?);
        Self::with_backend(config, backend)
    }

    /// Builds the service over any backend whose containers are origin
    /// authorities.
    pub fn with_backend(
        config: &RemoteReaderConfig,
        backend: Arc<dyn BlobBackend>,
    ) -> BlobResult<Self> {
        config.validate()?;
        Ok(Self {
            prefix: config.normalized_prefix()?,
            signer: UrlSigner::new(&config.signing_keys, config.signature_bytes)?,
            signatures: SignatureCache::new(config.signature_cache_capacity)?,
            allowlist: DomainAllowlist::new(config.allowed_domains.as_slice()),
            strict_host_validation: config.strict_host_validation,
            backend,
        })
    }

    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    pub fn signatures(&self) -> &SignatureCache {
        &self.signatures
    }

    /// Full virtual path for `url`, prefix included.
    pub fn sign(&self, url: &str) -> BlobResult<String> {
        Ok(format!("{}{}", self.prefix, self.signer.sign(url)?))
    }

    /// Structural checks only: prefix, segment count, token shape and,
    /// when strict, a DNS host.
    fn parse(&self, virtual_path: &str) -> Option<SignedReference> {
        let signed = virtual_path.strip_prefix(self.prefix.as_str())?;
        if signed.split('/').count() < 3 {
            return None;
        }
        let reference = SignedReference::parse(signed)?;
        if !self.is_token_shaped(&reference.token) {
            return None;
        }
        if self.strict_host_validation &&
            !matches!(Host::parse(reference.authority()), Ok(Host::Domain(_)))
        {
            return None;
        }
        Some(reference)
    }

    fn is_token_shaped(&self, token: &str) -> bool {
        token.len() == self.signer.token_len() &&
            token
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    }

    /// Allowlist first, then the memo of earlier verifications, then the
    /// HMAC itself.
    fn is_trusted(&self, reference: &SignedReference) -> bool {
        if self.allowlist.matches(&reference.host) {
            debug!(host = %reference.host, "host is allowlisted");
            return true;
        }
        if self.signatures.is_verified(&reference.token, &reference.host) {
            return true;
        }
        if self.signer.verify_host(&reference.token, &reference.host) {
            self.signatures.remember(&reference.token, &reference.host);
            return true;
        }
        false
    }
}

#[async_trait]
impl BlobProvider for RemoteReaderService {
    fn prefixes(&self) -> Vec<String> {
        vec![self.prefix.clone()]
    }

    fn supports_path(&self, virtual_path: &str) -> bool {
        self.parse(virtual_path).is_some()
    }

    async fn fetch(&self, virtual_path: &str) -> BlobResult<BlobData> {
        let Some(reference) = self.parse(virtual_path) else {
            warn!(virtual_path = %virtual_path, "remote blob not found, malformed path");
            return Err(BlobError::missing(virtual_path, "Malformed remote path."));
        };

        if !self.is_trusted(&reference) {
            warn!(virtual_path = %virtual_path, "remote blob not found, invalid signature");
            return Err(BlobError::missing(virtual_path, INVALID_SIGNATURE));
        }

        let url = reference.https_url();
        match self.backend.fetch(reference.authority(), reference.path()).await {
            Ok(data) => Ok(data),
            Err(e) => {
                let reason = match &e {
                    BlobError::NotFound { .. } => {
                        format!("The remote \"{}\" responded with status: 404.", url)
                    }
                    BlobError::Upstream {
                        status: Some(status),
                        ..
                    } => format!("The remote \"{}\" responded with status: {}.", url, status),
                    other => format!("Error retrieving \"{}\": {}", url, other),
                };
                warn!(virtual_path = %virtual_path, url = %url, "remote blob not found: {}", e);
                Err(BlobError::missing(virtual_path, reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use blob_store::{
        CircuitBreakerConfig,
        HttpBackendConfig,
        ObjectStoreBackend,
        PutMode,
        RetryConfig,
    };
    use bytes::Bytes;
    use wiremock::{
        matchers::{method, path},
        Mock,
        MockServer,
        ResponseTemplate,
    };

    use super::*;
    use crate::SigningKey;

    fn config() -> RemoteReaderConfig {
        RemoteReaderConfig {
            signing_keys: vec![SigningKey::new("test-key")],
            ..Default::default()
        }
    }

    /// In-memory backend whose containers are hosts.
    async fn origin() -> Arc<ObjectStoreBackend> {
        let backend = Arc::new(ObjectStoreBackend::in_memory());
        backend
            .put(
                "cdn.example.com",
                "img/1.jpg",
                Bytes::from_static(b"jpeg"),
                "image/jpeg",
                PutMode::Overwrite,
            )
            .await
            .unwrap();
        backend
            .put(
                "img.trusted.com",
                "a.png",
                Bytes::from_static(b"png"),
                "image/png",
                PutMode::Overwrite,
            )
            .await
            .unwrap();
        backend
    }

    fn reason(err: BlobError) -> String {
        match err {
            BlobError::Missing { reason, .. } => reason,
            other => panic!("expected a missing blob, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_signed_path_is_fetched() {
        let service = RemoteReaderService::with_backend(&config(), origin().await).unwrap();
        let virtual_path = service.sign("https://cdn.example.com/img/1.jpg").unwrap();
        assert!(virtual_path.starts_with("/remote/"));
        assert!(service.supports_path(&virtual_path));

        let data = service.fetch(&virtual_path).await.unwrap();
        assert_eq!(data.read_bytes().await.unwrap(), Bytes::from_static(b"jpeg"));
        assert_eq!(service.signatures().len(), 1);

        // Served again from the signature memo.
        assert!(service.fetch(&virtual_path).await.is_ok());
        assert_eq!(service.signatures().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_signature_is_missing() {
        let service = RemoteReaderService::with_backend(&config(), origin().await).unwrap();
        let err = service
            .fetch("/remote/AAAAAAAAAAA/cdn.example.com/img/1.jpg")
            .await
            .unwrap_err();
        assert_eq!(reason(err), "Invalid signature.");
        assert!(service.signatures().is_empty());
    }

    #[tokio::test]
    async fn test_allowlisted_host_skips_signature() {
        let mut config = config();
        config.allowed_domains = vec!["*.trusted.com".to_string()];
        let service = RemoteReaderService::with_backend(&config, origin().await).unwrap();

        let data = service.fetch("/remote/AAAAAAAAAAA/img.trusted.com/a.png").await.unwrap();
        assert_eq!(data.read_bytes().await.unwrap(), Bytes::from_static(b"png"));

        let err = service
            .fetch("/remote/AAAAAAAAAAA/trusted.com/a.png")
            .await
            .unwrap_err();
        assert_eq!(reason(err), "Invalid signature.");
    }

    #[tokio::test]
    async fn test_remembered_token_does_not_cover_other_hosts() {
        let service = RemoteReaderService::with_backend(&config(), origin().await).unwrap();
        let signed = service.sign("https://cdn.example.com/img/1.jpg").unwrap();
        service.fetch(&signed).await.unwrap();

        let token = signed.trim_start_matches("/remote/").split('/').next().unwrap();
        let err = service
            .fetch(&format!("/remote/{}/img.trusted.com/a.png", token))
            .await
            .unwrap_err();
        assert_eq!(reason(err), "Invalid signature.");
    }

    #[tokio::test]
    async fn test_malformed_paths() {
        let service = RemoteReaderService::with_backend(&config(), origin().await).unwrap();
        let signed = service.sign("https://cdn.example.com/img/1.jpg").unwrap();
        let token = signed.trim_start_matches("/remote/").split('/').next().unwrap().to_string();

        for path in [
            "/other/AAAAAAAAAAA/cdn.example.com/img/1.jpg".to_string(),
            format!("/remote/{}/cdn.example.com", token),
            format!("/remote/{}x/cdn.example.com/img/1.jpg", token),
            "/remote/AAAAAAAAAA!/cdn.example.com/img/1.jpg".to_string(),
            format!("/remote/{}/127.0.0.1/img/1.jpg", token),
            format!("/remote/{}/cdn.example.com:8080/img/1.jpg", token),
        ] {
            assert!(!service.supports_path(&path), "{path}");
            let err = service.fetch(&path).await.unwrap_err();
            assert_eq!(reason(err), "Malformed remote path.", "{path}");
        }
    }

    #[tokio::test]
    async fn test_absent_remote_object_is_missing() {
        let service = RemoteReaderService::with_backend(&config(), origin().await).unwrap();
        let signed = service.sign("https://cdn.example.com/img/404.jpg").unwrap();
        let err = service.fetch(&signed).await.unwrap_err();
        assert_eq!(
            reason(err),
            "The remote \"https://cdn.example.com/img/404.jpg\" responded with status: 404."
        );
    }

    #[tokio::test]
    async fn test_fetch_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/photos/cat.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"cat".to_vec())
                    .insert_header("content-type", "image/png"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken.png"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut config = config();
        config.strict_host_validation = false;
        config.http = HttpBackendConfig {
            use_http: true,
            retry: RetryConfig {
                max_retries: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let service = RemoteReaderService::new(&config).unwrap();

        let base = server.uri();
        let signed = service.sign(&format!("{}/photos/cat.png", base)).unwrap();
        let data = service.fetch(&signed).await.unwrap();
        assert_eq!(data.content_type.as_deref(), Some("image/png"));
        assert_eq!(data.read_bytes().await.unwrap(), Bytes::from_static(b"cat"));

        let signed = service.sign(&format!("{}/broken.png", base)).unwrap();
        let err = service.fetch(&signed).await.unwrap_err();
        assert!(reason(err).ends_with("responded with status: 500."));
    }

    fn plain_http(circuit_breaker: CircuitBreakerConfig) -> RemoteReaderConfig {
        let mut config = config();
        config.strict_host_validation = false;
        config.http = HttpBackendConfig {
            use_http: true,
            retry: RetryConfig {
                max_retries: 0,
                ..Default::default()
            },
            circuit_breaker,
            ..Default::default()
        };
        config
    }

    #[tokio::test]
    async fn test_open_circuit_is_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let service = RemoteReaderService::new(&plain_http(CircuitBreakerConfig {
            minimum_throughput: 1,
            ..Default::default()
        }))
        .unwrap();
        let signed = service.sign(&format!("{}/a.png", server.uri())).unwrap();

        let err = service.fetch(&signed).await.unwrap_err();
        assert!(reason(err).ends_with("responded with status: 503."));

        // The origin is not called again while the circuit is open.
        let err = service.fetch(&signed).await.unwrap_err();
        let reason = reason(err);
        assert!(reason.starts_with("Error retrieving"), "{reason}");
        assert!(reason.contains("Circuit open"), "{reason}");
    }

    #[tokio::test]
    async fn test_transport_error_is_missing() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let service =
            RemoteReaderService::new(&plain_http(CircuitBreakerConfig::default())).unwrap();
        let signed = service
            .sign(&format!("http://127.0.0.1:{port}/a.png"))
            .unwrap();

        let err = service.fetch(&signed).await.unwrap_err();
        let reason = reason(err);
        assert!(
            reason.starts_with(&format!("Error retrieving \"https://127.0.0.1:{port}/a.png\"")),
            "{reason}"
        );
    }
}
