use axum::http::StatusCode;

use linesman_core::circuit_breaker::CircuitState;
use linesman_core::error::AppError;

use crate::integration::common::{DISABLED, FAILING, HEALTHY, setup_test_app};

#[tokio::test]
async fn health_returns_200() {
    let app = setup_test_app();

    let (status, json) = app.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["baseline_store"], "memory");
    assert_eq!(json["providers"], serde_json::json!([HEALTHY, FAILING]));
    assert_eq!(json["open_circuits"], 0);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = setup_test_app();

    let (status, json) = app.get("/api-docs/openapi.json").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["info"]["title"], "Linesman API");
    assert!(json["paths"]["/v1/sla/{provider}"].is_object());
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ingest_single_provider() {
    let app = setup_test_app();

    let (status, json) = app.post(&format!("/v1/ingest/{HEALTHY}")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["provider"], HEALTHY);
    assert_eq!(json["drift_detected"], false);
    assert!(json["errors"].as_array().unwrap().is_empty());
    assert!(json.get("data").is_none(), "payload omitted by default");
}

#[tokio::test]
async fn ingest_includes_data_on_request() {
    let app = setup_test_app();

    let (status, json) = app
        .post(&format!("/v1/ingest/{HEALTHY}?include_data=true"))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["games"][0]["period"], 4);
}

#[tokio::test]
async fn failed_ingestion_returns_502_with_errors() {
    let app = setup_test_app();

    let (status, json) = app.post(&format!("/v1/ingest/{FAILING}")).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["success"], false);
    assert_eq!(json["errors"][0]["code"], "network_error");
    assert_eq!(json["errors"][0]["provider"], FAILING);
}

#[tokio::test]
async fn ingest_unknown_provider_returns_404() {
    let app = setup_test_app();

    let (status, json) = app.post("/v1/ingest/nonexistent").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "provider_not_found");
}

#[tokio::test]
async fn ingest_disabled_provider_returns_409() {
    let app = setup_test_app();

    let (status, json) = app.post(&format!("/v1/ingest/{DISABLED}")).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "provider_disabled");
}

#[tokio::test]
async fn ingest_all_reports_per_provider_results() {
    let app = setup_test_app();

    let (status, json) = app.post("/v1/ingest").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], false);
    assert_eq!(json["total"], 2);
    assert_eq!(json["successful"], 1);
    assert_eq!(json["failed"], 1);
    assert_eq!(json["results"][HEALTHY]["success"], true);
    assert_eq!(json["results"][FAILING]["success"], false);
    assert!(json["results"][DISABLED].is_null());
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn provider_health_probe() {
    let app = setup_test_app();

    let (status, json) = app.get(&format!("/v1/providers/{FAILING}/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["healthy"], false);
    assert_eq!(json["error"], "refused");

    let (status, _) = app.get("/v1/providers/nonexistent/health").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Metrics & SLA
// ---------------------------------------------------------------------------

#[tokio::test]
async fn metrics_not_found_before_any_ingestion() {
    let app = setup_test_app();

    let (status, json) = app.get(&format!("/v1/metrics/{HEALTHY}")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "not_found");
}

#[tokio::test]
async fn metrics_reflect_ingestion() {
    let app = setup_test_app();
    app.post(&format!("/v1/ingest/{HEALTHY}")).await;
    app.post(&format!("/v1/ingest/{HEALTHY}")).await;

    let (status, json) = app.get(&format!("/v1/metrics/{HEALTHY}")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["provider"], HEALTHY);
    assert_eq!(json["health"]["requests"], 2);
    assert_eq!(json["health"]["errors"], 0);
    assert_eq!(json["drift"]["checks"], 2);
    assert_eq!(json["drift"]["detected"], 0);
}

#[tokio::test]
async fn sla_flags_error_rate_violation() {
    let app = setup_test_app();
    app.post(&format!("/v1/ingest/{FAILING}")).await;

    let (status, json) = app
        .get(&format!("/v1/sla/{FAILING}?max_error_rate=0.1&min_pass_rate=0.9"))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["compliant"], false);
    let violations = json["violations"].as_array().unwrap();
    assert_eq!(violations.len(), 1, "pass rate has no samples: {violations:?}");
    assert!(violations[0].as_str().unwrap().starts_with("Error rate"));
}

#[tokio::test]
async fn sla_compliant_for_healthy_provider() {
    let app = setup_test_app();
    app.post(&format!("/v1/ingest/{HEALTHY}")).await;

    let (status, json) = app
        .get(&format!("/v1/sla/{HEALTHY}?max_error_rate=0.1&max_drift_rate=0.2"))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["compliant"], true);
    assert!(json["violations"].as_array().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Circuits
// ---------------------------------------------------------------------------

#[tokio::test]
async fn circuits_list_and_reset() {
    let app = setup_test_app();
    let breaker = app
        .state
        .context()
        .breakers()
        .get_or_create(FAILING, None);
    for _ in 0..breaker.config().failure_threshold {
        breaker.record_failure(&AppError::NetworkError("refused".into()));
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let (status, json) = app.get("/v1/circuits").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 1);
    assert_eq!(json["circuits"][0]["name"], FAILING);
    assert_eq!(json["circuits"][0]["state"], "open");
    assert!(json["circuits"][0]["time_until_half_open_ms"].is_u64());

    let (_, health) = app.get("/health").await;
    assert_eq!(health["open_circuits"], 1);

    let (status, json) = app.post(&format!("/v1/circuits/{FAILING}/reset")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "closed");
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn reset_unknown_circuit_returns_404() {
    let app = setup_test_app();

    let (status, json) = app.post("/v1/circuits/nonexistent/reset").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "not_found");
}

// ---------------------------------------------------------------------------
// Baselines
// ---------------------------------------------------------------------------

#[tokio::test]
async fn baselines_list_and_delete() {
    let app = setup_test_app();

    let (_, json) = app.get("/v1/baselines").await;
    assert_eq!(json["total"], 0);

    app.post(&format!("/v1/ingest/{HEALTHY}")).await;

    let (status, json) = app.get("/v1/baselines").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 1);
    assert_eq!(json["baselines"][0]["provider"], HEALTHY);
    assert_eq!(json["baselines"][0]["schema_name"], "scoreboard");
    assert_eq!(json["baselines"][0]["version"], 1);

    let (status, _) = app.delete(&format!("/v1/baselines/{HEALTHY}/scoreboard")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, json) = app.delete(&format!("/v1/baselines/{HEALTHY}/scoreboard")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "not_found");
}
