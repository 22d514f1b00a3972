use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use linesman_core::circuit_breaker::CircuitBreakerStats;
use linesman_core::drift::SchemaSnapshot;
use linesman_core::metrics::{ProviderQualityMetrics, SlaReport, SlaThresholds};
use linesman_core::models::{
    AggregateIngestionResult, HealthStatus, IngestionError, IngestionResult,
};

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct IngestQuery {
    /// Include fetched payloads in the response (default false).
    pub include_data: Option<bool>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct IngestionErrorResponse {
    pub code: String,
    pub message: String,
    pub provider: String,
    pub retryable: bool,
    pub timestamp: DateTime<Utc>,
}

impl From<IngestionError> for IngestionErrorResponse {
    fn from(e: IngestionError) -> Self {
        Self {
            code: e.code,
            message: e.message,
            provider: e.provider,
            retryable: e.retryable,
            timestamp: e.timestamp,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct IngestionResponse {
    pub success: bool,
    pub correlation_id: String,
    /// Provider that served (or last failed to serve) the data.
    pub provider: String,
    pub fallback_from: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    pub drift_detected: bool,
    pub drift_severity: Option<String>,
    pub errors: Vec<IngestionErrorResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl IngestionResponse {
    pub fn from_result(result: IngestionResult, include_data: bool) -> Self {
        let meta = result.metadata;
        Self {
            success: result.success,
            correlation_id: meta.correlation_id,
            provider: meta.provider,
            fallback_from: meta.fallback_from,
            timestamp: meta.timestamp,
            duration_ms: meta.duration_ms,
            drift_detected: meta.drift_detected,
            drift_severity: meta.drift_severity.map(|s| s.to_string()),
            errors: result.errors.into_iter().map(Into::into).collect(),
            data: if include_data { result.data } else { None },
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AggregateIngestionResponse {
    pub success: bool,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: BTreeMap<String, IngestionResponse>,
}

impl AggregateIngestionResponse {
    pub fn from_result(result: AggregateIngestionResult, include_data: bool) -> Self {
        Self {
            success: result.success,
            total: result.summary.total,
            successful: result.summary.successful,
            failed: result.summary.failed,
            duration_ms: result.summary.duration_ms,
            results: result
                .results
                .into_iter()
                .map(|(name, r)| (name, IngestionResponse::from_result(r, include_data)))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub baseline_store: String,
    pub providers: Vec<String>,
    pub open_circuits: usize,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ProviderHealthResponse {
    pub provider: String,
    pub healthy: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl From<HealthStatus> for ProviderHealthResponse {
    fn from(h: HealthStatus) -> Self {
        Self {
            provider: h.provider,
            healthy: h.healthy,
            latency_ms: h.latency_ms,
            error: h.error,
            checked_at: h.checked_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Metrics & SLA
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ValidationStatsResponse {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub pass_rate: Option<f64>,
    pub avg_time_ms: Option<f64>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DriftStatsResponse {
    pub checks: u64,
    pub detected: u64,
    pub drift_rate: Option<f64>,
    pub by_severity: BTreeMap<String, u64>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthStatsResponse {
    pub requests: u64,
    pub errors: u64,
    pub error_rate: Option<f64>,
    pub avg_latency_ms: Option<f64>,
    pub circuit_breaker_opens: u64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CompletenessStatsResponse {
    pub samples: u64,
    pub required_present: u64,
    pub optional_present: u64,
    pub total_fields: u64,
    pub score: Option<f64>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct MetricsResponse {
    pub provider: String,
    pub window_start: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub validation: ValidationStatsResponse,
    pub drift: DriftStatsResponse,
    pub health: HealthStatsResponse,
    pub completeness: CompletenessStatsResponse,
}

impl From<ProviderQualityMetrics> for MetricsResponse {
    fn from(m: ProviderQualityMetrics) -> Self {
        Self {
            provider: m.provider,
            window_start: m.window_start,
            last_updated: m.last_updated,
            validation: ValidationStatsResponse {
                total: m.validation.total,
                passed: m.validation.passed,
                failed: m.validation.failed,
                pass_rate: m.validation.pass_rate,
                avg_time_ms: m.validation.avg_time_ms,
            },
            drift: DriftStatsResponse {
                checks: m.drift.checks,
                detected: m.drift.detected,
                drift_rate: m.drift.drift_rate,
                by_severity: m
                    .drift
                    .by_severity
                    .into_iter()
                    .map(|(severity, count)| (severity.to_string(), count))
                    .collect(),
            },
            health: HealthStatsResponse {
                requests: m.health.requests,
                errors: m.health.errors,
                error_rate: m.health.error_rate,
                avg_latency_ms: m.health.avg_latency_ms,
                circuit_breaker_opens: m.health.circuit_breaker_opens,
            },
            completeness: CompletenessStatsResponse {
                samples: m.completeness.samples,
                required_present: m.completeness.required_present,
                optional_present: m.completeness.optional_present,
                total_fields: m.completeness.total_fields,
                score: m.completeness.score,
            },
        }
    }
}

/// Thresholds for an SLA check; omitted ones are not evaluated.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct SlaQuery {
    pub min_pass_rate: Option<f64>,
    pub max_drift_rate: Option<f64>,
    pub max_error_rate: Option<f64>,
    pub min_completeness: Option<f64>,
}

impl From<SlaQuery> for SlaThresholds {
    fn from(q: SlaQuery) -> Self {
        SlaThresholds {
            min_pass_rate: q.min_pass_rate,
            max_drift_rate: q.max_drift_rate,
            max_error_rate: q.max_error_rate,
            min_completeness: q.min_completeness,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SlaResponse {
    pub provider: String,
    pub compliant: bool,
    pub violations: Vec<String>,
}

impl From<SlaReport> for SlaResponse {
    fn from(r: SlaReport) -> Self {
        Self {
            provider: r.provider,
            compliant: r.compliant,
            violations: r.violations,
        }
    }
}

// ---------------------------------------------------------------------------
// Circuits
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CircuitResponse {
    pub name: String,
    pub state: String,
    pub failures: u64,
    pub successes: u64,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub total_calls: u64,
    pub rejected_calls: u64,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub time_until_half_open_ms: Option<u64>,
}

impl From<CircuitBreakerStats> for CircuitResponse {
    fn from(s: CircuitBreakerStats) -> Self {
        Self {
            name: s.name,
            state: s.state.to_string(),
            failures: s.failures,
            successes: s.successes,
            consecutive_failures: s.consecutive_failures,
            consecutive_successes: s.consecutive_successes,
            total_calls: s.total_calls,
            rejected_calls: s.rejected_calls,
            last_failure_at: s.last_failure_at,
            last_success_at: s.last_success_at,
            last_error: s.last_error,
            time_until_half_open_ms: s.time_until_half_open.map(|d| d.as_millis() as u64),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CircuitListResponse {
    pub circuits: Vec<CircuitResponse>,
    pub total: usize,
}

// ---------------------------------------------------------------------------
// Baselines
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct BaselineResponse {
    pub id: String,
    pub provider: String,
    pub schema_name: String,
    pub version: u32,
    pub hash: String,
    pub created_at: DateTime<Utc>,
    pub field_count: usize,
}

impl From<SchemaSnapshot> for BaselineResponse {
    fn from(s: SchemaSnapshot) -> Self {
        Self {
            id: s.id.to_string(),
            field_count: s.fields.len(),
            provider: s.provider,
            schema_name: s.schema_name,
            version: s.version,
            hash: s.hash,
            created_at: s.created_at,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct BaselineListResponse {
    pub baselines: Vec<BaselineResponse>,
    pub total: usize,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
