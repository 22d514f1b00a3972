use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;
use uuid::Uuid;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::drift::DriftSeverity;
use crate::error::AppError;
use crate::retry::RetryPolicy;

/// How a provider's credential is attached to outgoing requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "style", content = "name")]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`
    #[default]
    Bearer,
    /// Custom header carrying the raw key.
    Header(String),
    /// Query string parameter carrying the raw key.
    QueryParam(String),
}

/// Static configuration of a single upstream provider.
///
/// Built once when the provider is constructed and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub auth_style: AuthStyle,
    /// Per-attempt timeout.
    pub timeout: Duration,
    pub rate_limit_per_minute: u32,
    pub retry: RetryPolicy,
    pub circuit_breaker: CircuitBreakerConfig,
    /// Headers sent with every request (lower-cased names).
    pub headers: BTreeMap<String, String>,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: None,
            auth_style: AuthStyle::default(),
            timeout: Duration::from_secs(10),
            rate_limit_per_minute: 60,
            retry: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>, style: AuthStyle) -> Self {
        self.api_key = Some(key.into());
        self.auth_style = style;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_rate_limit(mut self, requests_per_minute: u32) -> Self {
        self.rate_limit_per_minute = requests_per_minute;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Check the configuration is usable before a provider is built from it.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::ConfigError("provider name must not be empty".into()));
        }

        let url = Url::parse(&self.base_url).map_err(|e| {
            AppError::ConfigError(format!(
                "provider '{}' has an invalid base URL '{}': {e}",
                self.name, self.base_url
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::ConfigError(format!(
                "provider '{}' base URL must be http or https",
                self.name
            )));
        }

        if self.rate_limit_per_minute == 0 {
            return Err(AppError::ConfigError(format!(
                "provider '{}' rate limit must be at least 1 request per minute",
                self.name
            )));
        }
        if self.timeout.is_zero() {
            return Err(AppError::ConfigError(format!(
                "provider '{}' timeout must be greater than zero",
                self.name
            )));
        }
        if self.circuit_breaker.failure_threshold == 0
            || self.circuit_breaker.success_threshold == 0
            || self.circuit_breaker.half_open_max_calls == 0
        {
            return Err(AppError::ConfigError(format!(
                "provider '{}' circuit breaker thresholds must be at least 1",
                self.name
            )));
        }
        Ok(())
    }

    pub fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            name: self.name.clone(),
            base_url: self.base_url.clone(),
            timeout_ms: self.timeout.as_millis() as u64,
            rate_limit_per_minute: self.rate_limit_per_minute,
        }
    }
}

/// Public description of a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub name: String,
    pub base_url: String,
    pub timeout_ms: u64,
    pub rate_limit_per_minute: u32,
}

/// Where and when a payload came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchMetadata {
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: String,
    pub latency_ms: u64,
}

/// Raw payload emitted by a provider fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPayload {
    pub data: serde_json::Value,
    pub metadata: FetchMetadata,
}

/// Result of a provider health probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub provider: String,
    pub healthy: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// A single failure recorded in an [`IngestionResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionError {
    pub code: String,
    pub message: String,
    pub provider: String,
    pub retryable: bool,
    pub timestamp: DateTime<Utc>,
}

impl IngestionError {
    pub fn from_app_error(provider: &str, error: &AppError) -> Self {
        Self {
            code: error.kind().to_string(),
            message: error.to_string(),
            provider: provider.to_string(),
            retryable: error.is_retryable(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionMetadata {
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
    /// Provider that ultimately served (or failed to serve) the data.
    pub provider: String,
    pub duration_ms: u64,
    pub drift_detected: bool,
    pub drift_severity: Option<DriftSeverity>,
    /// Set when the data came from a fallback after this provider failed.
    pub fallback_from: Option<String>,
}

/// Outcome of one logical ingestion call. Never persisted by this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionResult {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub errors: Vec<IngestionError>,
    pub metadata: IngestionMetadata,
}

/// Counts for a multi-provider run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IngestionSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateIngestionResult {
    /// True only if no provider failed.
    pub success: bool,
    pub summary: IngestionSummary,
    pub results: HashMap<String, IngestionResult>,
}

/// Generate a correlation id for one logical operation.
pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
