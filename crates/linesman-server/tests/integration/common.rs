use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use linesman_client::ReqwestTransport;
use linesman_core::alert::{AlertConfig, AlertDispatcher};
use linesman_core::baseline::MemoryBaselineStore;
use linesman_core::context::IngestionContext;
use linesman_core::drift::SchemaDriftDetector;
use linesman_core::error::AppError;
use linesman_core::models::{FetchMetadata, HealthStatus, ProviderMetadata, ProviderPayload};
use linesman_core::orchestrator::{IngestionOrchestrator, OrchestratorConfig, ProviderSettings};
use linesman_core::traits::Provider;
use linesman_db::BaselineBackend;
use linesman_server::routes;
use linesman_server::state::AppState;

pub const HEALTHY: &str = "stub-primary";
pub const FAILING: &str = "stub-down";
pub const DISABLED: &str = "stub-off";

// ---------------------------------------------------------------------------
// Stub provider
// ---------------------------------------------------------------------------

/// Provider that serves a fixed scoreboard or always fails, without touching the network.
pub struct StubProvider {
    name: String,
    failing: bool,
}

impl StubProvider {
    pub fn healthy(name: &str) -> Arc<dyn Provider> {
        Arc::new(Self {
            name: name.to_string(),
            failing: false,
        })
    }

    pub fn failing(name: &str) -> Arc<dyn Provider> {
        Arc::new(Self {
            name: name.to_string(),
            failing: true,
        })
    }
}

#[async_trait]
impl Provider for StubProvider {
    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            name: self.name.clone(),
            base_url: "http://stub.invalid".to_string(),
            timeout_ms: 1000,
            rate_limit_per_minute: 60,
        }
    }

    async fn fetch_data(&self, correlation_id: &str) -> Result<ProviderPayload, AppError> {
        if self.failing {
            return Err(AppError::NetworkError("Connection failed: refused".to_string()));
        }
        Ok(ProviderPayload {
            data: json!({"games": [{"gameId": "0022400001", "period": 4, "homeTeam": {"score": 101}}]}),
            metadata: FetchMetadata {
                source: self.name.clone(),
                timestamp: Utc::now(),
                correlation_id: correlation_id.to_string(),
                latency_ms: 3,
            },
        })
    }

    async fn health_check(&self) -> HealthStatus {
        HealthStatus {
            provider: self.name.clone(),
            healthy: !self.failing,
            latency_ms: 1,
            error: self.failing.then(|| "refused".to_string()),
            checked_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// App setup
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
}

/// Router over three stub providers and an in-memory baseline store.
/// Alerts go to the console sink only.
pub fn setup_test_app() -> TestApp {
    let transport = ReqwestTransport::new().expect("Failed to build transport");
    let mut orchestrator = IngestionOrchestrator::new(
        Arc::new(IngestionContext::default()),
        SchemaDriftDetector::new(BaselineBackend::Memory(MemoryBaselineStore::new())),
        AlertDispatcher::new(transport, AlertConfig::default()),
        OrchestratorConfig::default(),
    );

    orchestrator
        .register(
            StubProvider::healthy(HEALTHY),
            ProviderSettings::default().with_schema_name("scoreboard"),
        )
        .expect("register healthy stub");
    orchestrator
        .register(StubProvider::failing(FAILING), ProviderSettings::default())
        .expect("register failing stub");
    orchestrator
        .register(
            StubProvider::healthy(DISABLED),
            ProviderSettings::default().disabled(),
        )
        .expect("register disabled stub");

    let state = Arc::new(AppState::new(orchestrator));
    TestApp {
        router: routes::router(Arc::clone(&state)),
        state,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::post(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::delete(uri).body(Body::empty()).unwrap()).await
    }
}
