use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::cache::{CacheError, ComputeError, ReadError, StoreError};

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unreadable upload: {0}")]
    Read(#[from] ReadError),

    #[error("Resume processing failed: {0}")]
    Compute(#[from] ComputeError),

    #[error("Cache store error: {0}")]
    Store(#[from] StoreError),
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Read(e) => AppError::Read(e),
            CacheError::Compute(e) => AppError::Compute(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Read(e) => (StatusCode::BAD_REQUEST, "UNREADABLE_FILE", e.to_string()),
            AppError::Compute(e) => {
                tracing::error!("Resume processing failed: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    "PROCESSING_FAILED",
                    "Resume processing failed, please retry".to_string(),
                )
            }
            AppError::Store(e) => {
                tracing::error!("Cache store error: {e}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "STORE_UNAVAILABLE",
                    "The resume cache is temporarily unavailable".to_string(),
                )
            }        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_compute_timeout_maps_to_bad_gateway() {
        let err: AppError = CacheError::Compute(ComputeError::TimedOut(Duration::from_secs(5))).into();
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_empty_upload_maps_to_bad_request() {
        let err: AppError = CacheError::Read(ReadError::Empty).into();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_store_error_maps_to_service_unavailable() {
        let err = AppError::Store(StoreError::Unavailable("connection refused".to_string()));
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
