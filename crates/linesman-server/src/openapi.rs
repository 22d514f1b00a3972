use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Linesman API",
        version = "0.1.0",
        description = "Monitoring API for resilient sports data ingestion: provider health, quality metrics, circuit breakers and schema baselines."
    ),
    paths(
        crate::routes::ingest_all,
        crate::routes::ingest_provider,
        crate::routes::provider_health,
        crate::routes::get_metrics,
        crate::routes::check_sla,
        crate::routes::list_circuits,
        crate::routes::reset_circuit,
        crate::routes::list_baselines,
        crate::routes::delete_baseline,
        crate::routes::health,
    ),
    components(schemas(
        crate::dto::IngestionResponse,
        crate::dto::IngestionErrorResponse,
        crate::dto::AggregateIngestionResponse,
        crate::dto::HealthResponse,
        crate::dto::ProviderHealthResponse,
        crate::dto::MetricsResponse,
        crate::dto::ValidationStatsResponse,
        crate::dto::DriftStatsResponse,
        crate::dto::HealthStatsResponse,
        crate::dto::CompletenessStatsResponse,
        crate::dto::SlaResponse,
        crate::dto::CircuitResponse,
        crate::dto::CircuitListResponse,
        crate::dto::BaselineResponse,
        crate::dto::BaselineListResponse,
        crate::dto::ErrorResponse,
    )),
    tags(
        (name = "ingestion", description = "Trigger provider ingestion"),
        (name = "providers", description = "Provider probes"),
        (name = "metrics", description = "Data quality metrics and SLA checks"),
        (name = "circuits", description = "Circuit breaker state"),
        (name = "baselines", description = "Schema drift baselines"),
        (name = "system", description = "Health and system status"),
    )
)]
pub struct ApiDoc;
