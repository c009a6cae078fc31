//! Mapping from engine errors to HTTP responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use recorder_core::RecorderError;
use serde::Serialize;

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
}

/// A [`RecorderError`] leaving through a handler
#[derive(Debug)]
pub struct ApiError(pub RecorderError);

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            RecorderError::Auth(_) => StatusCode::UNAUTHORIZED,
            RecorderError::Busy(_) => StatusCode::CONFLICT,
            RecorderError::Config(_) | RecorderError::Parse(_) => StatusCode::BAD_REQUEST,
            RecorderError::NotFound(_) => StatusCode::NOT_FOUND,
            RecorderError::Transport(_)
            | RecorderError::Empty(_)
            | RecorderError::WeightExceeded { .. }
            | RecorderError::Storage(_) => StatusCode::BAD_GATEWAY,
            RecorderError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match &self.0 {
            RecorderError::Auth(_) => "auth",
            RecorderError::Busy(_) => "busy",
            RecorderError::Config(_) => "config",
            RecorderError::Parse(_) => "parse",
            RecorderError::NotFound(_) => "not_found",
            RecorderError::Transport(_) => "transport",
            RecorderError::Empty(_) => "empty",
            RecorderError::WeightExceeded { .. } => "weight_exceeded",
            RecorderError::Storage(_) => "storage",
            RecorderError::Internal(_) => "internal",
        }
    }
}

impl From<RecorderError> for ApiError {
    fn from(error: RecorderError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        } else {
            tracing::debug!("Request rejected: {}", self.0);
        }

        let body = ErrorResponse {
            error: self.0.to_string(),
            kind: self.kind(),
        };
        (status, Json(body)).into_response()
    }
}
