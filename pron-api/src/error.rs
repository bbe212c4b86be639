//! Error types for pron-api
//!
//! Client errors map to 4xx with a human-readable detail string. Downstream
//! failures map to 500; their message reaches the client while the full error
//! chain is only logged server-side.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("{0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("{0}")]
    BadRequest(String),

    /// Missing or malformed fields (422)
    #[error("{0}")]
    Validation(String),

    /// Conflict (409) - e.g., duplicate category name
    #[error("{0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("{0}")]
    Internal(String),

    /// Stored audio could not be decrypted: wrong key or corrupted ciphertext (500)
    #[error("{0}")]
    InvalidToken(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// pron-common error
    #[error("{0}")]
    Common(#[from] pron_common::Error),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::InvalidToken(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INVALID_TOKEN"),
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            ApiError::Common(pron_common::Error::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND")
            }
            ApiError::Common(pron_common::Error::InvalidInput(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR")
            }
            ApiError::Common(_) => (StatusCode::INTERNAL_SERVER_ERROR, "COMMON_ERROR"),
        }
    }

    /// Client-facing text; lookup and input errors from pron-common drop their prefix
    fn detail(&self) -> String {
        match self {
            ApiError::Common(pron_common::Error::NotFound(msg))
            | ApiError::Common(pron_common::Error::InvalidInput(msg)) => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.parts();
        let message = self.detail();

        if status.is_server_error() {
            error!(code = error_code, "Request failed: {:?}", self);
        }

        let body = Json(json!({
            "detail": message,
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::NotFound("x".into()).parts().0, StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Validation("x".into()).parts().0,
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(ApiError::Conflict("x".into()).parts().0, StatusCode::CONFLICT);
        assert_eq!(
            ApiError::InvalidToken("x".into()).parts(),
            (StatusCode::INTERNAL_SERVER_ERROR, "INVALID_TOKEN")
        );
        assert_eq!(
            ApiError::Common(pron_common::Error::NotFound("x".into())).parts().0,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_body_carries_detail() {
        let response = ApiError::Conflict("Category 'Travel' already exists".into()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["detail"], "Category 'Travel' already exists");
        assert_eq!(body["error"]["code"], "CONFLICT");
    }

    #[test]
    fn test_common_not_found_detail_is_unprefixed() {
        let err = ApiError::Common(pron_common::Error::NotFound("Category 9 not found".into()));
        assert_eq!(err.detail(), "Category 9 not found");
    }
}
