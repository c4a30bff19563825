use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use blob_store::BlobError;
use tracing::{error, warn};

/// Error answer of the HTTP surface. Absence of any kind renders the same
/// 404 so callers can't tell which check failed.
#[derive(Debug)]
pub struct ApiError {
    status_code: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status_code: StatusCode, message: &str) -> Self {
        Self {
            status_code,
            message: message.to_string(),
        }
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not Found")
    }

    pub fn internal_error_str(e: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, e)
    }

    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code, self.message).into_response()
    }
}

impl From<BlobError> for ApiError {
    fn from(e: BlobError) -> Self {
        match e {
            BlobError::Missing { .. } | BlobError::NotFound { .. } => {
                warn!("blob not found: {}", e);
                Self::not_found()
            }
            BlobError::Upstream { .. } | BlobError::CircuitOpen { .. } => {
                error!("upstream failure: {}", e);
                Self::new(StatusCode::BAD_GATEWAY, "Bad Gateway")
            }
            e => {
                error!("API Error: {}", e);
                Self::internal_error_str("Internal Server Error")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_reason_is_not_exposed() {
        let err = ApiError::from(BlobError::missing("/remote/x/y/z", "Invalid signature."));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.message, "Not Found");
    }

    #[test]
    fn test_backend_faults_are_server_errors() {
        let err = ApiError::from(BlobError::Network {
            source: anyhow::anyhow!("reset"),
        });
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("reset"));
    }
}
