//! Error types for blob store operations.

use std::fmt;

/// Result type for blob store operations.
pub type BlobResult<T> = Result<T, BlobError>;

/// Errors that can occur during blob store operations.
#[derive(Debug)]
pub enum BlobError {
    /// No object exists at the given location in the backend.
    NotFound { container: String, key: String },

    /// A virtual path could not be served. This is the only failure the
    /// outer system sees for "no such resource", whatever the cause.
    Missing { virtual_path: String, reason: String },

    /// A write-once upload lost against an existing object.
    AlreadyExists { container: String, key: String },

    /// Remote origin failed at the transport level or answered non-2xx.
    Upstream {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    /// Calls to the host are short-circuited until the breaker closes.
    CircuitOpen { host: String },

    /// The caller-supplied producer failed.
    Producer { source: anyhow::Error },

    /// The backend does not implement the requested operation.
    Unsupported { backend: String, operation: String },

    /// Configuration rejected at construction time.
    InvalidConfig { reason: String },

    /// Invalid URI format or scheme.
    InvalidUri { uri: String, reason: String },

    /// I/O error during blob operation.
    Io { source: std::io::Error },

    /// Network or SDK error from an object store.
    Network { source: anyhow::Error },

    /// Generic error.
    Other { source: anyhow::Error },
}

impl BlobError {
    pub fn missing(virtual_path: &str, reason: impl Into<String>) -> Self {
        BlobError::Missing {
            virtual_path: virtual_path.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        BlobError::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BlobError::NotFound { .. } | BlobError::Missing { .. })
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            BlobError::NotFound { .. } => "not_found",
            BlobError::Missing { .. } => "missing",
            BlobError::AlreadyExists { .. } => "already_exists",
            BlobError::Upstream { .. } => "upstream",
            BlobError::CircuitOpen { .. } => "circuit_open",
            BlobError::Producer { .. } => "producer",
            BlobError::Unsupported { .. } => "unsupported",
            BlobError::InvalidConfig { .. } => "invalid_config",
            BlobError::InvalidUri { .. } => "invalid_uri",
            BlobError::Io { .. } => "io",
            BlobError::Network { .. } => "network",
            BlobError::Other { .. } => "other",
        }
    }
}

impl fmt::Display for BlobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobError::NotFound { container, key } => {
                write!(f, "Blob not found: {}/{}", container, key)
            }
            BlobError::Missing {
                virtual_path,
                reason,
            } => write!(f, "Blob \"{}\" not found. {}", virtual_path, reason),
            BlobError::AlreadyExists { container, key } => {
                write!(f, "Blob already exists: {}/{}", container, key)
            }
            BlobError::Upstream {
                url,
                status: Some(status),
                reason,
            } => write!(
                f,
                "Upstream \"{}\" responded with status {}: {}",
                url, status, reason
            ),
            BlobError::Upstream {
                url,
                status: None,
                reason,
            } => write!(f, "Upstream \"{}\" unavailable: {}", url, reason),
            BlobError::CircuitOpen { host } => {
                write!(f, "Circuit open for host {}", host)
            }
            BlobError::Producer { source } => write!(f, "Producer failed: {}", source),
            BlobError::Unsupported { backend, operation } => {
                write!(f, "Backend {} does not support {}", backend, operation)
            }
            BlobError::InvalidConfig { reason } => write!(f, "Invalid configuration: {}", reason),
            BlobError::InvalidUri { uri, reason } => {
                write!(f, "Invalid URI '{}': {}", uri, reason)
            }
            BlobError::Io { source } => write!(f, "I/O error: {}", source),
            BlobError::Network { source } => write!(f, "Network error: {}", source),
            BlobError::Other { source } => write!(f, "Blob store error: {}", source),
        }
    }
}

impl std::error::Error for BlobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BlobError::Io { source } => Some(source),
            BlobError::Producer { source } => Some(source.as_ref()),
            BlobError::Network { source } => Some(source.as_ref()),
            BlobError::Other { source } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BlobError {
    fn from(err: std::io::Error) -> Self {
        BlobError::Io { source: err }
    }
}

impl From<anyhow::Error> for BlobError {
    fn from(err: anyhow::Error) -> Self {
        BlobError::Other { source: err }
    }
}

impl From<url::ParseError> for BlobError {
    fn from(err: url::ParseError) -> Self {
        BlobError::InvalidUri {
            uri: String::new(),
            reason: err.to_string(),
        }
    }
}

/// Maps an object_store error for a known location. `NotFound` and the
/// conditional-write failures keep their meaning, everything else is a
/// network fault.
pub(crate) fn from_object_store(err: object_store::Error, container: &str, key: &str) -> BlobError {
    match err {
        object_store::Error::NotFound { .. } => BlobError::NotFound {
            container: container.to_string(),
            key: key.to_string(),
        },
        object_store::Error::AlreadyExists { .. } | object_store::Error::Precondition { .. } => {
            BlobError::AlreadyExists {
                container: container.to_string(),
                key: key.to_string(),
            }
        }
        object_store::Error::NotImplemented | object_store::Error::NotSupported { .. } => {
            BlobError::Unsupported {
                backend: "object_store".to_string(),
                operation: err.to_string(),
            }
        }
        _ => BlobError::Network {
            source: anyhow::Error::from(err),
        },
    }
}
