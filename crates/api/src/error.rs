//! API error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use camera_capture::CameraError;
use serde::{Deserialize, Serialize};
use storage::StorageError;
use thiserror::Error;
use tracing::error;

/// Body of every status-style response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub message: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: StatusCode::OK.as_u16(),
            error: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Camera unavailable: {0}")]
    Camera(#[from] CameraError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Camera(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Storage(StorageError::NotFound) => StatusCode::NOT_FOUND,
            ApiError::Storage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            ApiError::Camera(_) => "Could not open camera",
            ApiError::BadRequest(_) => "Invalid request body",
            ApiError::Storage(_) => "Database operation failed",
            ApiError::Internal(_) => "Internal server error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("{}", self);
        }

        let body = StatusResponse {
            message: self.message().to_string(),
            status: status.as_u16(),
            error: Some(self.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::Camera(CameraError::Timeout).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::BadRequest("missing field".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Storage(StorageError::DatabaseError("locked".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_ok_body_has_no_error() {
        let json = serde_json::to_value(StatusResponse::ok("saved")).unwrap();
        assert_eq!(json["status"], 200);
        assert!(json.get("error").is_none());
    }
}
