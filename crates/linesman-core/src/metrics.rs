//! Rolling per-provider data quality metrics and SLA checks.
//!
//! Counters live for one tracking window per provider. A provider whose
//! window has elapsed is evicted on the next read or by
//! [`DataQualityMetricsService::sweep_expired`].

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::drift::DriftSeverity;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsConfig {
    /// Tracking window per provider.
    pub window: Duration,
    /// Ring buffer capacity for timing samples.
    pub max_samples: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(3600),
            max_samples: 1000,
        }
    }
}

/// Field presence observed in one payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletenessSample {
    pub required_present: u32,
    pub optional_present: u32,
    pub total_fields: u32,
}

impl CompletenessSample {
    /// Count which of the given dotted paths (`scoreboard.gameDate`) are present and non-null.
    pub fn from_payload(payload: &serde_json::Value, required: &[String], optional: &[String]) -> Self {
        let present = |path: &String| {
            payload
                .pointer(&dotted_to_pointer(path))
                .is_some_and(|v| !v.is_null())
        };
        Self {
            required_present: required.iter().filter(|p| present(p)).count() as u32,
            optional_present: optional.iter().filter(|p| present(p)).count() as u32,
            total_fields: (required.len() + optional.len()) as u32,
        }
    }
}

/// JSON pointer for a dotted path, escaping `~` and `/` inside each segment.
fn dotted_to_pointer(path: &str) -> String {
    let mut pointer = String::with_capacity(path.len() + 1);
    for segment in path.split('.') {
        pointer.push('/');
        pointer.push_str(&segment.replace('~', "~0").replace('/', "~1"));
    }
    pointer
}

/// Bounds for [`DataQualityMetricsService::check_sla`]. Unset bounds are not checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SlaThresholds {
    pub min_pass_rate: Option<f64>,
    pub max_drift_rate: Option<f64>,
    pub max_error_rate: Option<f64>,
    pub min_completeness: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaReport {
    pub provider: String,
    pub compliant: bool,
    pub violations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationStats {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub pass_rate: Option<f64>,
    pub avg_time_ms: Option<f64>,
    pub p95_time_ms: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftStats {
    pub checks: u64,
    pub detected: u64,
    pub drift_rate: Option<f64>,
    pub by_severity: BTreeMap<DriftSeverity, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStats {
    pub requests: u64,
    pub errors: u64,
    pub error_rate: Option<f64>,
    pub avg_latency_ms: Option<f64>,
    pub p95_latency_ms: Option<f64>,
    pub p99_latency_ms: Option<f64>,
    pub circuit_breaker_opens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletenessStats {
    pub samples: u64,
    pub required_present: u64,
    pub optional_present: u64,
    pub total_fields: u64,
    /// `(required_present + 0.5 * optional_present) / total_fields`
    pub score: Option<f64>,
}

/// Derived metrics for one provider, computed on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderQualityMetrics {
    pub provider: String,
    pub window_start: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub validation: ValidationStats,
    pub drift: DriftStats,
    pub health: HealthStats,
    pub completeness: CompletenessStats,
}

#[derive(Debug)]
struct ProviderCounters {
    started: Instant,
    window_start: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    validation_passed: u64,
    validation_failed: u64,
    validation_times_ms: VecDeque<f64>,
    drift_checks: u64,
    drift_detected: u64,
    drift_by_severity: BTreeMap<DriftSeverity, u64>,
    health_requests: u64,
    health_errors: u64,
    latencies_ms: VecDeque<f64>,
    circuit_breaker_opens: u64,
    completeness_samples: u64,
    required_present: u64,
    optional_present: u64,
    total_fields: u64,
}

impl ProviderCounters {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            started: Instant::now(),
            window_start: now,
            last_updated: now,
            validation_passed: 0,
            validation_failed: 0,
            validation_times_ms: VecDeque::new(),
            drift_checks: 0,
            drift_detected: 0,
            drift_by_severity: BTreeMap::new(),
            health_requests: 0,
            health_errors: 0,
            latencies_ms: VecDeque::new(),
            circuit_breaker_opens: 0,
            completeness_samples: 0,
            required_present: 0,
            optional_present: 0,
            total_fields: 0,
        }
    }

    fn expired(&self, window: Duration) -> bool {
        self.started.elapsed() >= window
    }

    fn snapshot(&self, provider: &str) -> ProviderQualityMetrics {
        let validation_total = self.validation_passed + self.validation_failed;
        let validation_times = sorted(&self.validation_times_ms);
        let latencies = sorted(&self.latencies_ms);

        ProviderQualityMetrics {
            provider: provider.to_string(),
            window_start: self.window_start,
            last_updated: self.last_updated,
            validation: ValidationStats {
                total: validation_total,
                passed: self.validation_passed,
                failed: self.validation_failed,
                pass_rate: ratio(self.validation_passed, validation_total),
                avg_time_ms: mean(&validation_times),
                p95_time_ms: percentile(&validation_times, 0.95),
            },
            drift: DriftStats {
                checks: self.drift_checks,
                detected: self.drift_detected,
                drift_rate: ratio(self.drift_detected, self.drift_checks),
                by_severity: self.drift_by_severity.clone(),
            },
            health: HealthStats {
                requests: self.health_requests,
                errors: self.health_errors,
                error_rate: ratio(self.health_errors, self.health_requests),
                avg_latency_ms: mean(&latencies),
                p95_latency_ms: percentile(&latencies, 0.95),
                p99_latency_ms: percentile(&latencies, 0.99),
                circuit_breaker_opens: self.circuit_breaker_opens,
            },
            completeness: CompletenessStats {
                samples: self.completeness_samples,
                required_present: self.required_present,
                optional_present: self.optional_present,
                total_fields: self.total_fields,
                score: (self.total_fields > 0).then(|| {
                    (self.required_present as f64 + 0.5 * self.optional_present as f64)
                        / self.total_fields as f64
                }),
            },
        }
    }
}

fn push_bounded(buffer: &mut VecDeque<f64>, value: f64, cap: usize) {
    if cap == 0 {
        return;
    }
    while buffer.len() >= cap {
        buffer.pop_front();
    }
    buffer.push_back(value);
}

fn sorted(samples: &VecDeque<f64>) -> Vec<f64> {
    let mut values: Vec<f64> = samples.iter().copied().collect();
    values.sort_by(f64::total_cmp);
    values
}

fn ratio(part: u64, total: u64) -> Option<f64> {
    (total > 0).then(|| part as f64 / total as f64)
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample at index `floor(n * q)`, clamped to the last element.
fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let idx = ((sorted.len() as f64 * q).floor() as usize).min(sorted.len() - 1);
    Some(sorted[idx])
}

fn pct(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

/// Aggregates validation, drift, health and completeness events per provider.
#[derive(Debug)]
pub struct DataQualityMetricsService {
    config: MetricsConfig,
    providers: Mutex<HashMap<String, ProviderCounters>>,
}

impl Default for DataQualityMetricsService {
    fn default() -> Self {
        Self::new(MetricsConfig::default())
    }
}

impl DataQualityMetricsService {
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            config,
            providers: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ProviderCounters>> {
        self.providers.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Metrics mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Run `f` against the provider's counters, starting a fresh window if the old one elapsed.
    fn update(&self, provider: &str, f: impl FnOnce(&mut ProviderCounters)) {
        let mut providers = self.lock();
        let counters = providers
            .entry(provider.to_string())
            .or_insert_with(ProviderCounters::new);
        if counters.expired(self.config.window) {
            *counters = ProviderCounters::new();
        }
        f(counters);
        counters.last_updated = Utc::now();
    }

    pub fn record_validation(&self, provider: &str, passed: bool, elapsed: Duration) {
        let cap = self.config.max_samples;
        self.update(provider, |c| {
            if passed {
                c.validation_passed += 1;
            } else {
                c.validation_failed += 1;
            }
            push_bounded(&mut c.validation_times_ms, elapsed.as_secs_f64() * 1000.0, cap);
        });
    }

    /// Record one drift check. `DriftSeverity::None` counts as a clean check.
    pub fn record_drift(&self, provider: &str, severity: DriftSeverity) {
        self.update(provider, |c| {
            c.drift_checks += 1;
            if severity != DriftSeverity::None {
                c.drift_detected += 1;
                *c.drift_by_severity.entry(severity).or_insert(0) += 1;
            }
        });
    }

    pub fn record_health_check(&self, provider: &str, success: bool, latency: Duration) {
        let cap = self.config.max_samples;
        self.update(provider, |c| {
            c.health_requests += 1;
            if !success {
                c.health_errors += 1;
            }
            push_bounded(&mut c.latencies_ms, latency.as_secs_f64() * 1000.0, cap);
        });
    }

    pub fn record_circuit_breaker_open(&self, provider: &str) {
        self.update(provider, |c| c.circuit_breaker_opens += 1);
    }

    pub fn record_completeness(&self, provider: &str, sample: CompletenessSample) {
        self.update(provider, |c| {
            c.completeness_samples += 1;
            c.required_present += u64::from(sample.required_present);
            c.optional_present += u64::from(sample.optional_present);
            c.total_fields += u64::from(sample.total_fields);
        });
    }

    /// Derived metrics, or `None` if nothing was recorded in the current window.
    pub fn get_metrics(&self, provider: &str) -> Option<ProviderQualityMetrics> {
        let mut providers = self.lock();
        if providers
            .get(provider)
            .is_some_and(|c| c.expired(self.config.window))
        {
            providers.remove(provider);
            return None;
        }
        providers.get(provider).map(|c| c.snapshot(provider))
    }

    /// Metrics for every live provider, sorted by name.
    pub fn all_metrics(&self) -> Vec<ProviderQualityMetrics> {
        let providers = self.lock();
        let mut all: Vec<_> = providers
            .iter()
            .filter(|(_, c)| !c.expired(self.config.window))
            .map(|(name, c)| c.snapshot(name))
            .collect();
        all.sort_by(|a, b| a.provider.cmp(&b.provider));
        all
    }

    /// Drop all counters for `provider`. Returns true if any existed.
    pub fn reset_provider(&self, provider: &str) -> bool {
        self.lock().remove(provider).is_some()
    }

    /// Evict providers whose window has elapsed. Returns the number evicted.
    pub fn sweep_expired(&self) -> usize {
        let mut providers = self.lock();
        let before = providers.len();
        providers.retain(|_, c| !c.expired(self.config.window));
        let evicted = before - providers.len();
        if evicted > 0 {
            tracing::debug!(evicted, "Evicted expired provider metrics");
        }
        evicted
    }

    /// Compare current metrics with `thresholds`. Dimensions without samples are skipped.
    pub fn check_sla(&self, provider: &str, thresholds: &SlaThresholds) -> SlaReport {
        let Some(metrics) = self.get_metrics(provider) else {
            return SlaReport {
                provider: provider.to_string(),
                compliant: false,
                violations: vec!["No metrics available".to_string()],
            };
        };

        let mut violations = Vec::new();

        if let (Some(min), Some(rate)) = (thresholds.min_pass_rate, metrics.validation.pass_rate)
            && rate < min
        {
            violations.push(format!("Pass rate {} is below minimum {}", pct(rate), pct(min)));
        }
        if let (Some(max), Some(rate)) = (thresholds.max_drift_rate, metrics.drift.drift_rate)
            && rate > max
        {
            violations.push(format!("Drift rate {} exceeds maximum {}", pct(rate), pct(max)));
        }
        if let (Some(max), Some(rate)) = (thresholds.max_error_rate, metrics.health.error_rate)
            && rate > max
        {
            violations.push(format!("Error rate {} exceeds maximum {}", pct(rate), pct(max)));
        }
        if let (Some(min), Some(score)) = (thresholds.min_completeness, metrics.completeness.score)
            && score < min
        {
            violations.push(format!(
                "Completeness score {} is below minimum {}",
                pct(score),
                pct(min)
            ));
        }

        SlaReport {
            provider: provider.to_string(),
            compliant: violations.is_empty(),
            violations,
        }
    }
}
