//! JSON error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, warn};

use crate::utils::error::JaundiceError;

/// Error returned by a handler, rendered as `{"error": message}`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

/// Status code for a library error
pub fn status_for(err: &JaundiceError) -> StatusCode {
    match err {
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        JaundiceError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<JaundiceError> for ApiError {
    fn from(err: JaundiceError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            error!("Request failed: {}", err);
        } else {
            warn!("Rejected request: {}", err);
        }
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&JaundiceError::invalid_image("bad bytes")), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&JaundiceError::InvalidInput("no file".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&JaundiceError::ModelUnavailable("missing".to_string())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&JaundiceError::Model("forward failed".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_response_status() {
        let response = ApiError::from(JaundiceError::ModelUnavailable("x".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
