//! HMAC signing of remote URLs.
//!
//! A signed reference looks like `<token>/<host>/<path>`, where `token` is
//! the base64url (unpadded) encoding of the first `signature_bytes` bytes
//! of HMAC-SHA256(key, host). Only the host is signed: a token is good for
//! every path on that host.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use blob_store::{BlobError, BlobResult};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_SIGNATURE_BYTES: usize = 8;
pub const MAX_SIGNATURE_BYTES: usize = 32;

/// Secret used to sign hosts. Never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SigningKey(String);

impl SigningKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

/// Length in characters of an unpadded base64url token over `bytes` bytes.
pub fn token_len(bytes: usize) -> usize {
    (bytes * 4).div_ceil(3)
}

/// `<token>/<authority>/<path>` split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedReference {
    pub token: String,
    /// Lowercased host name, the signed part.
    pub host: String,
    /// Everything after the token: `authority/path`.
    rest: String,
}

impl SignedReference {
    pub fn parse(signed_path: &str) -> Option<Self> {
        let (token, rest) = signed_path.split_once('/')?;
        if token.is_empty() || rest.is_empty() {
            return None;
        }
        let parsed = Url::parse(&format!("http://{}", rest)).ok()?;
        let host = parsed.host_str().filter(|h| !h.is_empty())?.to_string();
        Some(Self {
            token: token.to_string(),
            host,
            rest: rest.to_string(),
        })
    }

    /// `host[:port]` as it appeared in the path.
    pub fn authority(&self) -> &str {
        self.rest.split_once('/').map_or(self.rest.as_str(), |(authority, _)| authority)
    }

    /// Path on the origin, without the leading `/`.
    pub fn path(&self) -> &str {
        self.rest.split_once('/').map_or("", |(_, path)| path)
    }

    pub fn https_url(&self) -> String {
        format!("https://{}", self.rest)
    }
}

/// Signs and verifies with an ordered set of keys. Signing uses the first
/// key; verification accepts any of them, so keys can be rotated.
#[derive(Clone)]
pub struct UrlSigner {
    macs: Vec<HmacSha256>,
    signature_bytes: usize,
}

impl fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlSigner")
            .field("keys", &self.macs.len())
            .field("signature_bytes", &self.signature_bytes)
            .finish()
    }
}

impl UrlSigner {
    pub fn new(keys: &[SigningKey], signature_bytes: usize) -> BlobResult<Self> {
        if !(1..=MAX_SIGNATURE_BYTES).contains(&signature_bytes) {
            return Err(BlobError::invalid_config(format!(
                "signature_bytes must be between 1 and {}, got {}",
                MAX_SIGNATURE_BYTES, signature_bytes
            )));
        }
        if keys.is_empty() {
            return Err(BlobError::invalid_config("at least one signing key is required"));
        }

        let macs = keys
            .iter()
            .map(|key| {
                if key.is_empty() {
                    return Err(BlobError::invalid_config("signing keys cannot be empty"));
                }
                HmacSha256::new_from_slice(key.as_bytes())
                    .map_err(|e| BlobError::invalid_config(format!("unusable signing key: {}", e)))
            })
            .collect::<BlobResult<Vec<_>>>()?;

        Ok(Self {
            macs,
            signature_bytes,
        })
    }

    pub fn signature_bytes(&self) -> usize {
        self.signature_bytes
    }

    pub fn token_len(&self) -> usize {
        token_len(self.signature_bytes)
    }

    fn token_with(&self, mac: &HmacSha256, host: &str) -> String {
        let mut mac = mac.clone();
        mac.update(host.as_bytes());
        let digest = mac.finalize().into_bytes();
        URL_SAFE_NO_PAD.encode(&digest[..self.signature_bytes])
    }

    /// Token for `host` under the signing (first) key.
    pub fn host_token(&self, host: &str) -> String {
        self.token_with(&self.macs[0], host)
    }

    /// `https://cdn.example.com/img/1.jpg` to
    /// `<token>/cdn.example.com/img/1.jpg`. Query and fragment are dropped.
    pub fn sign(&self, url: &str) -> BlobResult<String> {
        let parsed = Url::parse(url).map_err(|e| BlobError::InvalidUri {
            uri: url.to_string(),
            reason: e.to_string(),
        })?;
        let host = parsed.host_str().ok_or_else(|| BlobError::InvalidUri {
            uri: url.to_string(),
            reason: "URL has no host".to_string(),
        })?;
        let authority = match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        Ok(format!("{}/{}{}", self.host_token(host), authority, parsed.path()))
    }

    /// Whether `token` is valid for `host` under any key. Constant time
    /// per key.
    pub fn verify_host(&self, token: &str, host: &str) -> bool {
        self.macs.iter().any(|mac| {
            let expected = self.token_with(mac, host);
            bool::from(expected.as_bytes().ct_eq(token.as_bytes()))
        })
    }

    /// The `https://` URL a signed reference stands for, if the token
    /// matches its host.
    pub fn verify(&self, signed_path: &str) -> Option<String> {
        let reference = SignedReference::parse(signed_path)?;
        self.verify_host(&reference.token, &reference.host)
            .then(|| reference.https_url())
    }
}
