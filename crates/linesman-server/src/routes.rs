use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use linesman_core::circuit_breaker::CircuitState;
use linesman_core::error::AppError;

use crate::dto::{
    AggregateIngestionResponse, BaselineListResponse, BaselineResponse, CircuitListResponse,
    CircuitResponse, HealthResponse, IngestQuery, IngestionResponse, MetricsResponse,
    ProviderHealthResponse, SlaQuery, SlaResponse,
};
use crate::error::ApiError;
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Build the full router with all routes.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/v1/ingest", post(ingest_all))
        .route("/v1/ingest/{provider}", post(ingest_provider))
        .route("/v1/providers/{provider}/health", get(provider_health))
        .route("/v1/metrics/{provider}", get(get_metrics))
        .route("/v1/sla/{provider}", get(check_sla))
        .route("/v1/circuits", get(list_circuits))
        .route("/v1/circuits/{provider}/reset", post(reset_circuit))
        .route("/v1/baselines", get(list_baselines))
        .route("/v1/baselines/{provider}/{schema}", delete(delete_baseline));

    let public = Router::new()
        .route("/health", get(health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    public.merge(api).with_state(state)
}

fn require_provider(state: &AppState, provider: &str) -> Result<(), ApiError> {
    if state.orchestrator.has_provider(provider) {
        Ok(())
    } else {
        Err(AppError::ProviderNotFound(provider.to_string()).into())
    }
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/v1/ingest",
    params(IngestQuery),
    responses(
        (status = 200, description = "Results for every enabled provider", body = AggregateIngestionResponse),
    ),
    tag = "ingestion"
)]
pub async fn ingest_all(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IngestQuery>,
) -> impl IntoResponse {
    let result = state.orchestrator.ingest_from_all().await;
    axum::Json(AggregateIngestionResponse::from_result(
        result,
        query.include_data.unwrap_or(false),
    ))
}

#[utoipa::path(
    post,
    path = "/v1/ingest/{provider}",
    params(
        ("provider" = String, Path, description = "Provider name"),
        IngestQuery,
    ),
    responses(
        (status = 200, description = "Ingestion succeeded (possibly via fallback)", body = IngestionResponse),
        (status = 404, description = "Unknown provider", body = crate::dto::ErrorResponse),
        (status = 409, description = "Provider disabled", body = crate::dto::ErrorResponse),
        (status = 502, description = "Ingestion failed", body = IngestionResponse),
    ),
    tag = "ingestion"
)]
pub async fn ingest_provider(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(query): Query<IngestQuery>,
) -> Result<impl IntoResponse, ApiError> {
    require_provider(&state, &provider)?;
    if state
        .orchestrator
        .settings(&provider)
        .is_some_and(|s| !s.enabled)
    {
        return Err(AppError::ProviderDisabled(provider).into());
    }

    let result = state.orchestrator.ingest(&provider).await;
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    let body = IngestionResponse::from_result(result, query.include_data.unwrap_or(false));

    Ok((status, axum::Json(body)))
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/providers/{provider}/health",
    params(("provider" = String, Path, description = "Provider name")),
    responses(
        (status = 200, description = "Probe result", body = ProviderHealthResponse),
        (status = 404, description = "Unknown provider", body = crate::dto::ErrorResponse),
    ),
    tag = "providers"
)]
pub async fn provider_health(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state.orchestrator.health_check(&provider).await?;
    Ok(axum::Json(ProviderHealthResponse::from(status)))
}

// ---------------------------------------------------------------------------
// Metrics & SLA
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/metrics/{provider}",
    params(("provider" = String, Path, description = "Provider name")),
    responses(
        (status = 200, description = "Quality metrics for the current window", body = MetricsResponse),
        (status = 404, description = "Unknown provider or no samples yet", body = crate::dto::ErrorResponse),
    ),
    tag = "metrics"
)]
pub async fn get_metrics(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_provider(&state, &provider)?;
    let metrics = state
        .context()
        .metrics()
        .get_metrics(&provider)
        .ok_or_else(|| ApiError::NotFound(format!("No metrics recorded for '{provider}'")))?;

    Ok(axum::Json(MetricsResponse::from(metrics)))
}

#[utoipa::path(
    get,
    path = "/v1/sla/{provider}",
    params(
        ("provider" = String, Path, description = "Provider name"),
        SlaQuery,
    ),
    responses(
        (status = 200, description = "SLA compliance report", body = SlaResponse),
        (status = 404, description = "Unknown provider", body = crate::dto::ErrorResponse),
    ),
    tag = "metrics"
)]
pub async fn check_sla(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(query): Query<SlaQuery>,
) -> Result<impl IntoResponse, ApiError> {
    require_provider(&state, &provider)?;
    let report = state
        .context()
        .metrics()
        .check_sla(&provider, &query.into());

    Ok(axum::Json(SlaResponse::from(report)))
}

// ---------------------------------------------------------------------------
// Circuits
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/circuits",
    responses(
        (status = 200, description = "Every circuit breaker", body = CircuitListResponse),
    ),
    tag = "circuits"
)]
pub async fn list_circuits(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let circuits: Vec<CircuitResponse> = state
        .context()
        .breakers()
        .stats()
        .into_iter()
        .map(CircuitResponse::from)
        .collect();
    let total = circuits.len();

    axum::Json(CircuitListResponse { circuits, total })
}

#[utoipa::path(
    post,
    path = "/v1/circuits/{provider}/reset",
    params(("provider" = String, Path, description = "Breaker name")),
    responses(
        (status = 200, description = "Breaker closed", body = CircuitResponse),
        (status = 404, description = "No such breaker", body = crate::dto::ErrorResponse),
    ),
    tag = "circuits"
)]
pub async fn reset_circuit(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let breakers = state.context().breakers();
    let breaker = breakers
        .get(&provider)
        .ok_or_else(|| ApiError::NotFound(format!("No circuit breaker named '{provider}'")))?;
    breaker.reset();
    tracing::info!(provider = %provider, "Circuit breaker reset via API");

    Ok(axum::Json(CircuitResponse::from(breaker.stats())))
}

// ---------------------------------------------------------------------------
// Baselines
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/baselines",
    responses(
        (status = 200, description = "Stored schema baselines", body = BaselineListResponse),
        (status = 500, description = "Baseline store failure", body = crate::dto::ErrorResponse),
    ),
    tag = "baselines"
)]
pub async fn list_baselines(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let baselines: Vec<BaselineResponse> = state
        .orchestrator
        .detector()
        .list_baselines()
        .await?
        .into_iter()
        .map(BaselineResponse::from)
        .collect();
    let total = baselines.len();

    Ok(axum::Json(BaselineListResponse { baselines, total }))
}

#[utoipa::path(
    delete,
    path = "/v1/baselines/{provider}/{schema}",
    params(
        ("provider" = String, Path, description = "Provider name"),
        ("schema" = String, Path, description = "Schema name"),
    ),
    responses(
        (status = 204, description = "Baseline deleted; the next ingestion records a fresh one"),
        (status = 404, description = "No such baseline", body = crate::dto::ErrorResponse),
    ),
    tag = "baselines"
)]
pub async fn delete_baseline(
    State(state): State<Arc<AppState>>,
    Path((provider, schema)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .orchestrator
        .detector()
        .delete_baseline(&provider, &schema)
        .await?;
    if !deleted {
        return Err(ApiError::NotFound(format!(
            "No baseline for {provider}/{schema}"
        )));
    }
    tracing::info!(provider = %provider, schema = %schema, "Baseline deleted via API");

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let open_circuits = state
        .context()
        .breakers()
        .stats()
        .iter()
        .filter(|s| s.state == CircuitState::Open)
        .count();

    axum::Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        baseline_store: state.orchestrator.detector().store().kind().to_string(),
        providers: state.orchestrator.enabled_providers(),
        open_circuits,
    })
}
