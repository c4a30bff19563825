use blob_store::{BlobError, BlobResult, HttpBackendConfig};
use serde::{Deserialize, Serialize};

use crate::{
    signer::{DEFAULT_SIGNATURE_BYTES, MAX_SIGNATURE_BYTES},
    SigningKey,
    DEFAULT_SIGNATURE_CACHE_CAPACITY,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RemoteReaderConfig {
    /// Virtual path prefix, e.g. `/remote/`.
    pub prefix: String,
    /// The first key signs, all of them verify.
    pub signing_keys: Vec<SigningKey>,
    /// Bytes of the HMAC kept in a token.
    pub signature_bytes: usize,
    /// `host` or `*.suffix` patterns trusted without a signature.
    pub allowed_domains: Vec<String>,
    /// Require the host segment to be a DNS name.
    pub strict_host_validation: bool,
    pub signature_cache_capacity: usize,
    pub http: HttpBackendConfig,
}

impl Default for RemoteReaderConfig {
    fn default() -> Self {
        Self {
            prefix: "/remote/".to_string(),
            signing_keys: Vec::new(),
            signature_bytes: DEFAULT_SIGNATURE_BYTES,
            allowed_domains: Vec::new(),
            strict_host_validation: true,
            signature_cache_capacity: DEFAULT_SIGNATURE_CACHE_CAPACITY,
            http: HttpBackendConfig::default(),
        }
    }
}

impl RemoteReaderConfig {
    /// Prefix in `/x/` form.
    pub fn normalized_prefix(&self) -> BlobResult<String> {
        let trimmed = self.prefix.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Err(BlobError::invalid_config("remote reader prefix cannot be empty"));
        }
        Ok(format!("/{}/", trimmed))
    }

    pub fn validate(&self) -> BlobResult<()> {
        self.normalized_prefix()?;
        if self.signing_keys.is_empty() {
            return Err(BlobError::invalid_config(
                "remote reader needs at least one signing key",
            ));
        }
        if self.signing_keys.iter().any(SigningKey::is_empty) {
            return Err(BlobError::invalid_config("signing keys cannot be empty"));
        }
        if !(1..=MAX_SIGNATURE_BYTES).contains(&self.signature_bytes) {
            return Err(BlobError::invalid_config(format!(
                "signature_bytes must be between 1 and {}",
                MAX_SIGNATURE_BYTES
            )));
        }
        if self.signature_cache_capacity == 0 {
            return Err(BlobError::invalid_config(
                "signature_cache_capacity must be positive",
            ));
        }
        self.http.validate()
    }
}
