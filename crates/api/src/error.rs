use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use staffing_core::{CoverageError, StoreError};
use tracing::{error, warn};

/// Failures render as plain text: the message is what operators see.
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

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl From<CoverageError> for ApiError {
    fn from(e: CoverageError) -> Self {
        let status = match &e {
            CoverageError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CoverageError::NotFound(_) | CoverageError::Store(StoreError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            CoverageError::Write { .. } => StatusCode::BAD_GATEWAY,
            CoverageError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %e, "request failed");
        } else {
            warn!(error = %e, "request rejected");
        }
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
