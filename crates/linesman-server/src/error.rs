use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use linesman_core::error::AppError;

use crate::dto::ErrorResponse;

/// Handler error: a library failure or a missing resource.
pub enum ApiError {
    App(AppError),
    NotFound(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self::App(err)
    }
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        let err = match self {
            ApiError::NotFound(_) => return (StatusCode::NOT_FOUND, "not_found"),
            ApiError::App(err) => err,
        };
        let status = match err {
            AppError::ProviderNotFound(_) => StatusCode::NOT_FOUND,
            AppError::ProviderDisabled(_) => StatusCode::CONFLICT,
            AppError::SchemaValidationError(_) | AppError::SerializationError(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::HttpStatus { .. }
            | AppError::NetworkError(_)
            | AppError::UnexpectedContentType { .. }
            | AppError::ParseError { .. }
            | AppError::RetriesExhausted { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, err.kind())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_kind();
        let message = match self {
            ApiError::App(err) => err.to_string(),
            ApiError::NotFound(message) => message,
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}
