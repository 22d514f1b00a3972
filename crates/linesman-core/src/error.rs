use std::time::Duration;

use thiserror::Error;

/// Application-wide error types for Linesman.
#[derive(Error, Debug)]
pub enum AppError {
    /// The provider's local token bucket had no token for this request.
    #[error("Rate limit exceeded for provider '{provider}'")]
    RateLimitExceeded { provider: String },

    /// A single HTTP attempt took longer than the provider timeout.
    #[error("Request to '{provider}' timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    /// Upstream answered with a non-2xx status.
    #[error("HTTP {status} from '{provider}': {message}")]
    HttpStatus {
        provider: String,
        status: u16,
        message: String,
        retryable: bool,
    },

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Response was not the structured format the provider promised.
    #[error("Unexpected content type from '{provider}': {content_type}")]
    UnexpectedContentType {
        provider: String,
        content_type: String,
    },

    /// Response body could not be decoded.
    #[error("Failed to parse response from '{provider}': {message}")]
    ParseError { provider: String, message: String },

    /// Circuit breaker rejected the call without contacting the provider.
    #[error(
        "Circuit breaker '{provider}' is open. Retry after {}ms.",
        .retry_after.as_millis()
    )]
    CircuitOpen {
        provider: String,
        retry_after: Duration,
    },

    /// Every retry attempt failed with a transient error.
    #[error("Request to '{provider}' failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        provider: String,
        attempts: u32,
        last_error: Box<AppError>,
    },

    /// Payload does not satisfy the provider's contract schema.
    #[error("Schema validation error: {0}")]
    SchemaValidationError(String),

    /// Contract schema could not be loaded or compiled.
    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Provider disabled: {0}")]
    ProviderDisabled(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Baseline persistence failed.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Builds an [`AppError::HttpStatus`], marking 429 and 5xx as retryable.
    pub fn http_status(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        AppError::HttpStatus {
            provider: provider.into(),
            status,
            message: message.into(),
            retryable: status == 429 || status >= 500,
        }
    }

    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Timeout { .. } | AppError::NetworkError(_) => true,
            AppError::HttpStatus { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Returns true if this error should count as a circuit breaker failure.
    ///
    /// Local rate-limit denials and breaker rejections say nothing about the
    /// provider's health and are excluded.
    pub fn should_trip_circuit(&self) -> bool {
        matches!(
            self,
            AppError::Timeout { .. }
                | AppError::HttpStatus { .. }
                | AppError::NetworkError(_)
                | AppError::UnexpectedContentType { .. }
                | AppError::ParseError { .. }
                | AppError::RetriesExhausted { .. }
                | AppError::SerializationError(_)
        )
    }

    /// Stable snake_case code used in ingestion results and API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            AppError::Timeout { .. } => "request_timeout",
            AppError::HttpStatus { status, .. } if *status == 429 => "http_rate_limited",
            AppError::HttpStatus { status, .. } if *status >= 500 => "http_server_error",
            AppError::HttpStatus { .. } => "http_client_error",
            AppError::NetworkError(_) => "network_error",
            AppError::UnexpectedContentType { .. } => "unexpected_content_type",
            AppError::ParseError { .. } => "response_parse_error",
            AppError::CircuitOpen { .. } => "circuit_breaker_open",
            AppError::RetriesExhausted { .. } => "retries_exhausted",
            AppError::SchemaValidationError(_) => "schema_validation_failed",
            AppError::SchemaError(_) => "schema_error",
            AppError::ProviderNotFound(_) => "provider_not_found",
            AppError::ProviderDisabled(_) => "provider_disabled",
            AppError::ConfigError(_) => "config_error",
            AppError::StorageError(_) => "storage_error",
            AppError::DatabaseError(_) => "database_error",
            AppError::SerializationError(_) => "serialization_error",
            AppError::Generic(_) => "internal_error",
        }
    }

    /// The innermost cause, unwrapping retry exhaustion.
    pub fn root_cause(&self) -> &AppError {
        match self {
            AppError::RetriesExhausted { last_error, .. } => last_error.root_cause(),
            other => other,
        }
    }
}
