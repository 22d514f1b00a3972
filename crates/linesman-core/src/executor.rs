//! Per-provider resilient request execution.
//!
//! One logical request runs as: circuit breaker admission, then per attempt
//! rate limiter check, timed HTTP send, status classification, content-type
//! check and JSON decode. Retryable failures back off and try again until
//! the retry budget is spent. The whole sequence counts as one breaker call.

use std::sync::Arc;
use std::time::Instant;

use url::Url;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerRegistry};
use crate::error::AppError;
use crate::models::{AuthStyle, ProviderConfig};
use crate::rate_limiter::RateLimiter;
use crate::traits::HttpTransport;
use crate::transport::HttpRequest;

/// Composes rate limiting, timeout, retry and circuit breaking for one provider.
#[derive(Clone)]
pub struct ResilientExecutor<T: HttpTransport> {
    config: Arc<ProviderConfig>,
    transport: T,
    limiter: Arc<RateLimiter>,
    breaker: CircuitBreaker,
}

impl<T: HttpTransport> ResilientExecutor<T> {
    /// Validates `config` and binds the provider's breaker from `registry`.
    pub fn new(
        config: ProviderConfig,
        transport: T,
        registry: &CircuitBreakerRegistry,
    ) -> Result<Self, AppError> {
        config.validate()?;
        let breaker = registry.get_or_create(&config.name, Some(config.circuit_breaker.clone()));
        let limiter = Arc::new(RateLimiter::new(&config.name, config.rate_limit_per_minute));
        Ok(Self {
            config: Arc::new(config),
            transport,
            limiter,
            breaker,
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Builds a GET for `path` relative to the base URL, with configured
    /// headers and credential applied.
    pub fn build_request(&self, path: &str) -> Result<HttpRequest, AppError> {
        let raw = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let mut url = Url::parse(&raw).map_err(|e| {
            AppError::ConfigError(format!(
                "provider '{}' produced an invalid URL '{raw}': {e}",
                self.config.name
            ))
        })?;

        let mut request = HttpRequest::get("");
        for (name, value) in &self.config.headers {
            request = request.with_header(name, value);
        }
        if !request.headers.contains_key("accept") {
            request = request.with_header("accept", "application/json");
        }

        if let Some(key) = &self.config.api_key {
            match &self.config.auth_style {
                AuthStyle::Bearer => {
                    request = request.with_header("authorization", format!("Bearer {key}"));
                }
                AuthStyle::Header(name) => {
                    request = request.with_header(name, key);
                }
                AuthStyle::QueryParam(name) => {
                    url.query_pairs_mut().append_pair(name, key);
                }
            }
        }

        request.url = url.into();
        Ok(request)
    }

    /// GET `path` and decode the JSON body.
    pub async fn get_json(
        &self,
        path: &str,
        correlation_id: &str,
    ) -> Result<serde_json::Value, AppError> {
        let request = self.build_request(path)?;
        self.execute(request, correlation_id).await
    }

    /// Runs `request` through the breaker with retries, returning the decoded body.
    pub async fn execute(
        &self,
        request: HttpRequest,
        correlation_id: &str,
    ) -> Result<serde_json::Value, AppError> {
        self.breaker
            .call(|| self.execute_with_retry(&request, correlation_id))
            .await
            .map_err(AppError::from)
    }

    async fn execute_with_retry(
        &self,
        request: &HttpRequest,
        correlation_id: &str,
    ) -> Result<serde_json::Value, AppError> {
        let policy = self.config.retry;
        let mut attempt: u32 = 0;

        loop {
            match self.attempt(request, correlation_id, attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                    let delay = policy.delay_for_attempt(attempt);
                    tracing::warn!(
                        provider = %self.config.name,
                        correlation_id = %correlation_id,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_retryable() => {
                    tracing::error!(
                        provider = %self.config.name,
                        correlation_id = %correlation_id,
                        attempts = attempt + 1,
                        error = %e,
                        "Request failed, retries exhausted"
                    );
                    return Err(AppError::RetriesExhausted {
                        provider: self.config.name.clone(),
                        attempts: attempt + 1,
                        last_error: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(
        &self,
        request: &HttpRequest,
        correlation_id: &str,
        attempt: u32,
    ) -> Result<serde_json::Value, AppError> {
        let name = &self.config.name;

        if !self.limiter.try_consume() {
            return Err(AppError::RateLimitExceeded {
                provider: name.clone(),
            });
        }

        tracing::debug!(
            provider = %name,
            correlation_id = %correlation_id,
            attempt = attempt + 1,
            method = %request.method,
            url = %request.url,
            "Sending request"
        );

        let started = Instant::now();
        let response = tokio::time::timeout(self.config.timeout, self.transport.send(request.clone()))
            .await
            .map_err(|_| AppError::Timeout {
                provider: name.clone(),
                timeout_ms: self.config.timeout.as_millis() as u64,
            })??;

        tracing::debug!(
            provider = %name,
            correlation_id = %correlation_id,
            status = response.status,
            latency_ms = started.elapsed().as_millis() as u64,
            "Received response"
        );

        response.error_for_status(name)?;

        if !response.is_json() {
            return Err(AppError::UnexpectedContentType {
                provider: name.clone(),
                content_type: response
                    .content_type
                    .clone()
                    .unwrap_or_else(|| "<missing>".to_string()),
            });
        }

        response.json().map_err(|e| AppError::ParseError {
            provider: name.clone(),
            message: e.to_string(),
        })
    }
}
