//! Maps pipeline errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::common::{ErrorCategory, PipelineError};

#[derive(Debug)]
pub struct ApiError(pub PipelineError);

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            PipelineError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            PipelineError::PermissionDenied(_) | PipelineError::AdminRequired => {
                StatusCode::FORBIDDEN
            }
            PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::InsufficientCredits => StatusCode::PAYMENT_REQUIRED,
            err => match err.category() {
                ErrorCategory::Input => StatusCode::BAD_REQUEST,
                ErrorCategory::Capacity | ErrorCategory::Invariant => StatusCode::CONFLICT,
                ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn code(&self) -> &'static str {
        match self.0.category() {
            ErrorCategory::Input => "invalid_request",
            ErrorCategory::Capacity => "capacity",
            ErrorCategory::Invariant => "invalid_state",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self.0, "request failed");
            "Something went wrong. Please try again later.".to_string()
        } else {
            self.0.to_string()
        };

        let body = ErrorBody {
            error: self.code(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
