use std::future::Future;

use async_trait::async_trait;

use crate::drift::SchemaSnapshot;
use crate::error::AppError;
use crate::models::{HealthStatus, ProviderMetadata, ProviderPayload};
use crate::transport::{HttpRequest, HttpResponse};

/// Sends a single HTTP request. Timeouts and retries are applied by the caller.
pub trait HttpTransport: Send + Sync + Clone {
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, AppError>> + Send;
}

/// An upstream data source (schedule feed, box scores, odds).
///
/// Implementations route every HTTP call through a
/// [`crate::executor::ResilientExecutor`] so rate limiting, retries and the
/// circuit breaker apply uniformly. Providers are stored as
/// `Arc<dyn Provider>` by the orchestrator.
#[async_trait]
pub trait Provider: Send + Sync {
    fn metadata(&self) -> ProviderMetadata;

    fn name(&self) -> String {
        self.metadata().name
    }

    /// Fetch the provider's primary payload. `correlation_id` tags every log
    /// line and error for this logical operation.
    async fn fetch_data(&self, correlation_id: &str) -> Result<ProviderPayload, AppError>;

    /// Lightweight liveness probe. Never returns an error; failures are
    /// reported as `healthy = false`.
    async fn health_check(&self) -> HealthStatus;
}

/// Persists drift baselines keyed by `{provider, schema_name}`.
pub trait BaselineStore: Send + Sync + Clone {
    fn load(
        &self,
        provider: &str,
        schema_name: &str,
    ) -> impl Future<Output = Result<Option<SchemaSnapshot>, AppError>> + Send;

    /// Insert or overwrite the baseline for the snapshot's key.
    fn save(&self, snapshot: &SchemaSnapshot) -> impl Future<Output = Result<(), AppError>> + Send;

    /// All stored baselines, ordered by provider then schema name.
    fn list(&self) -> impl Future<Output = Result<Vec<SchemaSnapshot>, AppError>> + Send;

    /// Returns true if a baseline existed.
    fn delete(
        &self,
        provider: &str,
        schema_name: &str,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;
}
