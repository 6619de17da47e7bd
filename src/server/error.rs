use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::IngestError;

/// Body of every failed request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// machine-readable code, e.g. FILE_PROCESSING_ERROR
    pub error: String,
    pub message: String,
    pub status: u16,
    pub path: String,
    /// local time, second precision
    pub timestamp: String,
}

/// An [IngestError] bound to the request path it occurred on
#[derive(Debug)]
pub struct ApiError {
    pub error: IngestError,
    pub path: String,
}

impl ApiError {
    pub fn new(error: IngestError, path: &str) -> Self {
        ApiError {
            error,
            path: path.to_owned(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status();
        let body = ErrorResponse {
            error: self.error.code().to_owned(),
            message: self.error.public_message(),
            status: status.as_u16(),
            path: self.path,
            timestamp: chrono::Local::now()
                .format("%Y-%m-%dT%H:%M:%S")
                .to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::to_bytes, http::StatusCode};

    async fn body_of(err: ApiError) -> (StatusCode, ErrorResponse) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn client_error_keeps_its_message() {
        let (status, body) = body_of(ApiError::new(
            IngestError::EmptyInput(crate::error::FILE_EMPTY.into()),
            "/inventory/upload",
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "FILE_PROCESSING_ERROR");
        assert_eq!(body.message, "File is empty");
        assert_eq!(body.status, 400);
        assert_eq!(body.path, "/inventory/upload");
        assert_eq!(body.timestamp.len(), "2025-09-05T12:15:55".len());
    }

    #[tokio::test]
    async fn server_error_hides_detail() {
        let (status, body) = body_of(ApiError::new(
            IngestError::Internal(anyhow::anyhow!("runtime gone")),
            "/files/ingest",
        ))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.message.contains("runtime gone"));
    }
}
