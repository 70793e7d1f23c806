//! JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::service::ServiceError;

/// Body of every error response: `{"error": "..."}`
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

impl ServiceError {
    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::NoCache => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        if let ServiceError::Upstream(ref cause) = self {
            tracing::error!(error = %cause, "no cache and live fetch failed");
        }
        (self.status_code(), Json(ErrorBody::new(self.to_string()))).into_response()
    }
}
