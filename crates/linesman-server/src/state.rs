use std::path::PathBuf;
use std::sync::Arc;

use linesman_client::{ProviderCatalog, ReqwestTransport};
use linesman_core::alert::{AlertConfig, AlertDispatcher};
use linesman_core::context::IngestionContext;
use linesman_core::drift::SchemaDriftDetector;
use linesman_core::error::AppError;
use linesman_core::orchestrator::{IngestionOrchestrator, OrchestratorConfig};
use linesman_core::validation::ContractRegistry;
use linesman_db::BaselineBackend;

pub type ServerOrchestrator = IngestionOrchestrator<BaselineBackend, ReqwestTransport>;

/// Shared application state, available to all route handlers via `State<Arc<AppState>>`.
pub struct AppState {
    pub orchestrator: ServerOrchestrator,
}

impl AppState {
    pub fn new(orchestrator: ServerOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// Baseline store, provider catalog and alert sinks from the environment.
    ///
    /// Providers are ingested concurrently on `POST /v1/ingest`.
    pub async fn from_env() -> Result<Self, AppError> {
        let store = BaselineBackend::from_env().await?;

        let catalog = match std::env::var("LINESMAN_PROVIDERS") {
            Ok(path) => ProviderCatalog::load(&PathBuf::from(path))?,
            Err(_) => ProviderCatalog::default_catalog(),
        };
        let contracts = std::env::var("LINESMAN_SCHEMAS_DIR")
            .ok()
            .map(ContractRegistry::new);

        let transport = ReqwestTransport::new()?;
        let alerts = AlertDispatcher::new(transport.clone(), AlertConfig::from_env());

        let mut orchestrator = IngestionOrchestrator::new(
            Arc::new(IngestionContext::default()),
            SchemaDriftDetector::new(store),
            alerts,
            OrchestratorConfig {
                concurrent: true,
                alert_on_failure: true,
            },
        );

        if catalog.register_all(&mut orchestrator, &transport, contracts.as_ref()) == 0 {
            return Err(AppError::ConfigError(
                "No providers could be configured".to_string(),
            ));
        }
        Ok(Self::new(orchestrator))
    }

    pub fn context(&self) -> &Arc<IngestionContext> {
        self.orchestrator.context()
    }
}
