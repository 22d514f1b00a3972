//! Concrete providers. Each one wraps a [`ResilientExecutor`] and adds its
//! own endpoints and defaults.

pub mod nba;
pub mod odds;
pub mod sports_feed;

use std::time::Instant;

use chrono::Utc;
use linesman_core::circuit_breaker::CircuitBreakerRegistry;
use linesman_core::error::AppError;
use linesman_core::executor::ResilientExecutor;
use linesman_core::models::{
    FetchMetadata, HealthStatus, ProviderConfig, ProviderMetadata, ProviderPayload,
    new_correlation_id,
};
use linesman_core::traits::HttpTransport;

pub use nba::NbaCdnProvider;
pub use odds::{OddsFeed, OddsProvider};
pub use sports_feed::SportsFeedProvider;

/// A provider whose primary payload is one JSON document at a fixed path.
#[derive(Clone)]
pub(crate) struct JsonFeed<T: HttpTransport> {
    executor: ResilientExecutor<T>,
    path: String,
    health_path: String,
}

impl<T: HttpTransport> JsonFeed<T> {
    pub(crate) fn new(
        config: ProviderConfig,
        transport: T,
        registry: &CircuitBreakerRegistry,
        path: &str,
        health_path: &str,
    ) -> Result<Self, AppError> {
        Ok(Self {
            executor: ResilientExecutor::new(config, transport, registry)?,
            path: path.to_string(),
            health_path: health_path.to_string(),
        })
    }

    pub(crate) fn metadata(&self) -> ProviderMetadata {
        self.executor.config().metadata()
    }

    pub(crate) async fn fetch(&self, correlation_id: &str) -> Result<ProviderPayload, AppError> {
        self.fetch_path(&self.path, correlation_id).await
    }

    pub(crate) async fn fetch_path(
        &self,
        path: &str,
        correlation_id: &str,
    ) -> Result<ProviderPayload, AppError> {
        let name = &self.executor.config().name;
        let started = Instant::now();
        let data = self.executor.get_json(path, correlation_id).await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        tracing::debug!(
            provider = %name,
            path = %path,
            correlation_id = %correlation_id,
            latency_ms,
            "Fetched payload"
        );

        Ok(ProviderPayload {
            data,
            metadata: FetchMetadata {
                source: name.clone(),
                timestamp: Utc::now(),
                correlation_id: correlation_id.to_string(),
                latency_ms,
            },
        })
    }

    /// GET the health path through the executor and report the outcome.
    pub(crate) async fn probe(&self) -> HealthStatus {
        let name = self.executor.config().name.clone();
        let correlation_id = new_correlation_id();
        let started = Instant::now();
        let result = self
            .executor
            .get_json(&self.health_path, &correlation_id)
            .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        if let Err(e) = &result {
            tracing::warn!(provider = %name, error = %e, "Health check failed");
        }

        HealthStatus {
            provider: name,
            healthy: result.is_ok(),
            latency_ms,
            error: result.err().map(|e| e.to_string()),
            checked_at: Utc::now(),
        }
    }
}
