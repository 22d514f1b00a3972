pub mod alert;
pub mod baseline;
pub mod circuit_breaker;
pub mod context;
pub mod drift;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod rate_limiter;
pub mod retry;
pub mod traits;
pub mod transport;
pub mod validation;

#[cfg(test)]
pub mod testutil;

pub use alert::{AlertConfig, AlertDispatcher, AlertPayload, AlertSeverity};
pub use baseline::{FileBaselineStore, MemoryBaselineStore};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState};
pub use context::IngestionContext;
pub use drift::{DriftDetectionResult, DriftSeverity, SchemaDriftDetector, SchemaSnapshot};
pub use error::AppError;
pub use executor::ResilientExecutor;
pub use metrics::{DataQualityMetricsService, MetricsConfig, SlaThresholds};
pub use models::{
    AggregateIngestionResult, HealthStatus, IngestionResult, ProviderConfig, ProviderPayload,
    compute_hash, new_correlation_id,
};
pub use orchestrator::{IngestionOrchestrator, OrchestratorConfig, ProviderSettings};
pub use rate_limiter::RateLimiter;
pub use retry::RetryPolicy;
pub use traits::{BaselineStore, HttpTransport, Provider};
pub use transport::{HttpRequest, HttpResponse};
pub use validation::{Contract, ContractRegistry};
