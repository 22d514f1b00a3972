use linesman_core::drift::SchemaSnapshot;
use linesman_core::error::AppError;
use linesman_core::traits::BaselineStore;
use sqlx::types::Json;
use sqlx::{PgPool, Pool, Postgres};

/// PostgreSQL-backed baseline store: one row per `{provider, schema_name}`.
#[derive(Clone)]
pub struct PgBaselineRepository {
    pool: Pool<Postgres>,
}

impl PgBaselineRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BaselineRow {
    snapshot: Json<SchemaSnapshot>,
}

fn db_err(e: sqlx::Error) -> AppError {
    AppError::DatabaseError(e.to_string())
}

impl BaselineStore for PgBaselineRepository {
    async fn load(
        &self,
        provider: &str,
        schema_name: &str,
    ) -> Result<Option<SchemaSnapshot>, AppError> {
        let row = sqlx::query_as::<_, BaselineRow>(
            r#"
            SELECT snapshot FROM schema_baselines
            WHERE provider = $1 AND schema_name = $2
            "#,
        )
        .bind(provider)
        .bind(schema_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|r| r.snapshot.0))
    }

    async fn save(&self, snapshot: &SchemaSnapshot) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO schema_baselines
                (provider, schema_name, id, version, hash, snapshot, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (provider, schema_name) DO UPDATE
            SET id = EXCLUDED.id,
                version = EXCLUDED.version,
                hash = EXCLUDED.hash,
                snapshot = EXCLUDED.snapshot,
                created_at = EXCLUDED.created_at,
                updated_at = NOW()
            "#,
        )
        .bind(&snapshot.provider)
        .bind(&snapshot.schema_name)
        .bind(snapshot.id)
        .bind(snapshot.version as i32)
        .bind(&snapshot.hash)
        .bind(Json(snapshot))
        .bind(snapshot.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        tracing::debug!(
            provider = %snapshot.provider,
            schema = %snapshot.schema_name,
            version = snapshot.version,
            "Baseline upserted"
        );
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SchemaSnapshot>, AppError> {
        let rows = sqlx::query_as::<_, BaselineRow>(
            "SELECT snapshot FROM schema_baselines ORDER BY provider, schema_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(|r| r.snapshot.0).collect())
    }

    async fn delete(&self, provider: &str, schema_name: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM schema_baselines WHERE provider = $1 AND schema_name = $2")
            .bind(provider)
            .bind(schema_name)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }
}
