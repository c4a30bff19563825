//! Authorization seam for uploads.

use std::{fmt, sync::Arc};

use axum::http::{header, HeaderMap};
use blob_store::BlobBackend;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Decides whether a request may upload `file_name`.
pub trait UploadAuthorizer: Send + Sync {
    fn authorize(&self, headers: &HeaderMap, file_name: &str) -> bool;
}

/// Shared secret accepted as `Authorization: Bearer <token>`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadToken(String);

impl UploadToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for UploadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UploadToken(<redacted>)")
    }
}

/// Accepts any of a fixed set of bearer tokens, for every file name.
pub struct BearerTokens {
    tokens: Vec<UploadToken>,
}

impl BearerTokens {
    pub fn new(tokens: Vec<UploadToken>) -> Self {
        Self { tokens }
    }
}

impl UploadAuthorizer for BearerTokens {
    fn authorize(&self, headers: &HeaderMap, _file_name: &str) -> bool {
        let Some(provided) = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
        else {
            return false;
        };
        // Every token is compared so the answer time doesn't depend on
        // which one matched.
        self.tokens.iter().fold(false, |found, token| {
            let matched: bool = token.0.as_bytes().ct_eq(provided.as_bytes()).into();
            found | matched
        })
    }
}

/// Where uploads land and who may send them.
#[derive(Clone)]
pub struct UploadState {
    pub backend: Arc<dyn BlobBackend>,
    pub container: String,
    pub authorizer: Arc<dyn UploadAuthorizer>,
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_bearer_tokens() {
        let authorizer =
            BearerTokens::new(vec![UploadToken::new("first"), UploadToken::new("second")]);
        assert!(authorizer.authorize(&headers("Bearer first"), "a.png"));
        assert!(authorizer.authorize(&headers("Bearer second"), "a.png"));
        assert!(!authorizer.authorize(&headers("Bearer third"), "a.png"));
        assert!(!authorizer.authorize(&headers("Bearer firs"), "a.png"));
        assert!(!authorizer.authorize(&headers("first"), "a.png"));
        assert!(!authorizer.authorize(&HeaderMap::new(), "a.png"));
    }

    #[test]
    fn test_token_is_redacted() {
        assert_eq!(format!("{:?}", UploadToken::new("s3cret")), "UploadToken(<redacted>)");
    }
}
