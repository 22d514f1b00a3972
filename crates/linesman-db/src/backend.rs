use std::path::PathBuf;

use linesman_core::baseline::{FileBaselineStore, MemoryBaselineStore};
use linesman_core::drift::SchemaSnapshot;
use linesman_core::error::AppError;
use linesman_core::traits::BaselineStore;

use crate::baseline_repository::PgBaselineRepository;
use crate::config::DatabaseConfig;
use crate::database::Database;

pub const DEFAULT_BASELINE_DIR: &str = "baselines";

/// Baseline store chosen at startup.
#[derive(Clone)]
pub enum BaselineBackend {
    File(FileBaselineStore),
    Memory(MemoryBaselineStore),
    Postgres(PgBaselineRepository),
}

impl BaselineBackend {
    /// Postgres when `DATABASE_URL` is set (migrations are applied), otherwise
    /// JSON files under `LINESMAN_BASELINE_DIR` (default `./baselines`).
    pub async fn from_env() -> Result<Self, AppError> {
        if std::env::var("DATABASE_URL").is_ok() {
            let config = DatabaseConfig::from_env()?;
            let db = Database::connect(&config).await?;
            db.migrate().await?;
            tracing::info!("Using PostgreSQL baseline store");
            return Ok(BaselineBackend::Postgres(db.baseline_repo()));
        }

        let dir = std::env::var("LINESMAN_BASELINE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_BASELINE_DIR));
        tracing::info!(dir = %dir.display(), "Using file baseline store");
        Ok(BaselineBackend::File(FileBaselineStore::new(dir)))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BaselineBackend::File(_) => "file",
            BaselineBackend::Memory(_) => "memory",
            BaselineBackend::Postgres(_) => "postgres",
        }
    }
}

impl BaselineStore for BaselineBackend {
    async fn load(
        &self,
        provider: &str,
        schema_name: &str,
    ) -> Result<Option<SchemaSnapshot>, AppError> {
        match self {
            BaselineBackend::File(s) => s.load(provider, schema_name).await,
            BaselineBackend::Memory(s) => s.load(provider, schema_name).await,
            BaselineBackend::Postgres(s) => s.load(provider, schema_name).await,
        }
    }

    async fn save(&self, snapshot: &SchemaSnapshot) -> Result<(), AppError> {
        match self {
            BaselineBackend::File(s) => s.save(snapshot).await,
            BaselineBackend::Memory(s) => s.save(snapshot).await,
            BaselineBackend::Postgres(s) => s.save(snapshot).await,
        }
    }

    async fn list(&self) -> Result<Vec<SchemaSnapshot>, AppError> {
        match self {
            BaselineBackend::File(s) => s.list().await,
            BaselineBackend::Memory(s) => s.list().await,
            BaselineBackend::Postgres(s) => s.list().await,
        }
    }

    async fn delete(&self, provider: &str, schema_name: &str) -> Result<bool, AppError> {
        match self {
            BaselineBackend::File(s) => s.delete(provider, schema_name).await,
            BaselineBackend::Memory(s) => s.delete(provider, schema_name).await,
            BaselineBackend::Postgres(s) => s.delete(provider, schema_name).await,
        }
    }
}
