use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use serde_json::{Value, json};

use crate::alert::{AlertDispatcher, AlertPayload, AlertSeverity};
use crate::circuit_breaker::CircuitState;
use crate::context::IngestionContext;
use crate::drift::{DriftDetectionResult, SchemaDriftDetector, SchemaSnapshot};
use crate::error::AppError;
use crate::metrics::CompletenessSample;
use crate::models::{
    AggregateIngestionResult, HealthStatus, IngestionError, IngestionMetadata, IngestionResult,
    IngestionSummary, new_correlation_id,
};
use crate::traits::{BaselineStore, HttpTransport, Provider};
use crate::validation::Contract;

/// Maps a provider's raw payload into the shape validation and drift checks see.
pub type Normalizer = Arc<dyn Fn(Value) -> Result<Value, AppError> + Send + Sync>;

/// Dotted paths whose presence feeds the completeness score.
#[derive(Debug, Clone, Default)]
pub struct CompletenessRule {
    pub required: Vec<String>,
    pub optional: Vec<String>,
}

/// How the orchestrator treats one registered provider.
#[derive(Clone)]
pub struct ProviderSettings {
    pub enabled: bool,
    /// Provider tried once when this one fails.
    pub fallback: Option<String>,
    /// Baseline key for drift detection.
    pub schema_name: String,
    pub drift_detection: bool,
    pub validation: Option<Contract>,
    pub normalizer: Option<Normalizer>,
    pub completeness: Option<CompletenessRule>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            fallback: None,
            schema_name: "default".to_string(),
            drift_detection: true,
            validation: None,
            normalizer: None,
            completeness: None,
        }
    }
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("enabled", &self.enabled)
            .field("fallback", &self.fallback)
            .field("schema_name", &self.schema_name)
            .field("drift_detection", &self.drift_detection)
            .field("validation", &self.validation.as_ref().map(Contract::name))
            .field("normalizer", &self.normalizer.is_some())
            .field("completeness", &self.completeness)
            .finish()
    }
}

impl ProviderSettings {
    pub fn with_schema_name(mut self, schema_name: impl Into<String>) -> Self {
        self.schema_name = schema_name.into();
        self
    }

    pub fn with_fallback(mut self, provider: impl Into<String>) -> Self {
        self.fallback = Some(provider.into());
        self
    }

    pub fn with_validation(mut self, contract: Contract) -> Self {
        self.validation = Some(contract);
        self
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    pub fn with_completeness(mut self, rule: CompletenessRule) -> Self {
        self.completeness = Some(rule);
        self
    }

    pub fn with_drift_detection(mut self, enabled: bool) -> Self {
        self.drift_detection = enabled;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    /// Fetch providers concurrently in [`IngestionOrchestrator::ingest_from_all`].
    pub concurrent: bool,
    /// Dispatch an alert when an ingestion call fails.
    pub alert_on_failure: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrent: false,
            alert_on_failure: true,
        }
    }
}

struct RegisteredProvider {
    provider: Arc<dyn Provider>,
    settings: ProviderSettings,
}

struct FetchOutcome {
    data: Value,
    drift: Option<DriftDetectionResult>,
}

/// Coordinates fetch, validation, drift checks, alerts and fallback per provider.
pub struct IngestionOrchestrator<S: BaselineStore, T: HttpTransport> {
    context: Arc<IngestionContext>,
    detector: SchemaDriftDetector<S>,
    alerts: AlertDispatcher<T>,
    providers: HashMap<String, RegisteredProvider>,
    order: Vec<String>,
    config: OrchestratorConfig,
}

impl<S: BaselineStore, T: HttpTransport> IngestionOrchestrator<S, T> {
    pub fn new(
        context: Arc<IngestionContext>,
        detector: SchemaDriftDetector<S>,
        alerts: AlertDispatcher<T>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            context,
            detector,
            alerts,
            providers: HashMap::new(),
            order: Vec::new(),
            config,
        }
    }

    pub fn context(&self) -> &Arc<IngestionContext> {
        &self.context
    }

    pub fn detector(&self) -> &SchemaDriftDetector<S> {
        &self.detector
    }

    pub fn alerts(&self) -> &AlertDispatcher<T> {
        &self.alerts
    }

    /// Add a provider. Rejects duplicate names and self-referencing fallbacks.
    pub fn register(
        &mut self,
        provider: Arc<dyn Provider>,
        settings: ProviderSettings,
    ) -> Result<(), AppError> {
        let name = provider.name();
        if self.providers.contains_key(&name) {
            return Err(AppError::ConfigError(format!(
                "provider '{name}' is already registered"
            )));
        }
        if settings.fallback.as_deref() == Some(name.as_str()) {
            return Err(AppError::ConfigError(format!(
                "provider '{name}' cannot be its own fallback"
            )));
        }

        tracing::info!(
            provider = %name,
            enabled = settings.enabled,
            fallback = settings.fallback.as_deref().unwrap_or("-"),
            "Registered provider"
        );
        self.order.push(name.clone());
        self.providers
            .insert(name, RegisteredProvider { provider, settings });
        Ok(())
    }

    /// Build and register a provider. Construction or registration failures
    /// are logged and the provider is left out. Returns true if registered.
    pub fn register_with<F>(&mut self, name: &str, settings: ProviderSettings, factory: F) -> bool
    where
        F: FnOnce() -> Result<Arc<dyn Provider>, AppError>,
    {
        let result = factory().and_then(|provider| self.register(provider, settings));
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(provider = %name, error = %e, "Provider failed to initialise; skipping");
                false
            }
        }
    }

    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Registered provider names in registration order.
    pub fn provider_names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn enabled_providers(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|name| {
                self.providers
                    .get(*name)
                    .is_some_and(|p| p.settings.enabled)
            })
            .cloned()
            .collect()
    }

    pub fn settings(&self, name: &str) -> Option<&ProviderSettings> {
        self.providers.get(name).map(|p| &p.settings)
    }

    fn resolve(&self, name: &str) -> Result<&RegisteredProvider, AppError> {
        let entry = self
            .providers
            .get(name)
            .ok_or_else(|| AppError::ProviderNotFound(name.to_string()))?;
        if !entry.settings.enabled {
            return Err(AppError::ProviderDisabled(name.to_string()));
        }
        Ok(entry)
    }

    /// Ingest from one provider, falling back once if it fails and a fallback is configured.
    pub async fn ingest(&self, name: &str) -> IngestionResult {
        let correlation_id = new_correlation_id();
        self.run(name, &correlation_id, true).await
    }

    /// Ingest from every enabled provider independently. Never fails;
    /// per-provider failures show up in the summary.
    pub async fn ingest_from_all(&self) -> AggregateIngestionResult {
        let started = Instant::now();
        let names = self.enabled_providers();

        let results: Vec<(String, IngestionResult)> = if self.config.concurrent {
            join_all(names.iter().map(|name| async move {
                let correlation_id = new_correlation_id();
                (name.clone(), self.run(name, &correlation_id, false).await)
            }))
            .await
        } else {
            let mut results = Vec::with_capacity(names.len());
            for name in &names {
                let correlation_id = new_correlation_id();
                results.push((name.clone(), self.run(name, &correlation_id, false).await));
            }
            results
        };

        let successful = results.iter().filter(|(_, r)| r.success).count();
        let summary = IngestionSummary {
            total: results.len(),
            successful,
            failed: results.len() - successful,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        tracing::info!(
            total = summary.total,
            successful = summary.successful,
            failed = summary.failed,
            duration_ms = summary.duration_ms,
            "Multi-provider ingestion finished"
        );

        AggregateIngestionResult {
            success: summary.failed == 0,
            summary,
            results: results.into_iter().collect(),
        }
    }

    /// Probe one provider and record the result.
    pub async fn health_check(&self, name: &str) -> Result<HealthStatus, AppError> {
        let entry = self.resolve(name)?;
        let status = entry.provider.health_check().await;
        self.context.metrics().record_health_check(
            name,
            status.healthy,
            std::time::Duration::from_millis(status.latency_ms),
        );
        Ok(status)
    }

    /// Probe every enabled provider concurrently.
    pub async fn health_check_all(&self) -> BTreeMap<String, HealthStatus> {
        let names = self.enabled_providers();
        let statuses = join_all(names.iter().map(|name| self.health_check(name))).await;
        names
            .into_iter()
            .zip(statuses)
            .filter_map(|(name, status)| status.ok().map(|s| (name, s)))
            .collect()
    }

    /// Fetch from `name` and store the payload's schema as the new baseline.
    pub async fn rebaseline_from_provider(&self, name: &str) -> Result<SchemaSnapshot, AppError> {
        let entry = self.resolve(name)?;
        let correlation_id = new_correlation_id();
        let payload = entry.provider.fetch_data(&correlation_id).await?;
        let data = match &entry.settings.normalizer {
            Some(normalize) => normalize(payload.data)?,
            None => payload.data,
        };
        self.detector
            .rebaseline(name, &entry.settings.schema_name, &data)
            .await
    }

    async fn run(&self, name: &str, correlation_id: &str, allow_fallback: bool) -> IngestionResult {
        let started = Instant::now();

        let entry = match self.resolve(name) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(provider = %name, correlation_id = %correlation_id, error = %e, "Cannot ingest");
                return failure(name, correlation_id, started, vec![IngestionError::from_app_error(name, &e)], None);
            }
        };

        let primary_err = match self.fetch_with_validation(entry, correlation_id).await {
            Ok(outcome) => {
                tracing::info!(
                    provider = %name,
                    correlation_id = %correlation_id,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Ingestion succeeded"
                );
                return success(name, correlation_id, started, outcome, Vec::new(), None);
            }
            Err(e) => e,
        };
        let primary_error = IngestionError::from_app_error(name, &primary_err);

        let fallback = if allow_fallback {
            entry.settings.fallback.as_deref()
        } else {
            None
        };
        let Some(fallback) = fallback else {
            tracing::error!(provider = %name, correlation_id = %correlation_id, error = %primary_err, "Ingestion failed");
            self.alert_failure(
                AlertSeverity::Error,
                name,
                correlation_id,
                format!("Provider '{name}' failed: {primary_err}"),
            )
            .await;
            return failure(name, correlation_id, started, vec![primary_error], None);
        };

        tracing::warn!(
            provider = %name,
            fallback = %fallback,
            correlation_id = %correlation_id,
            error = %primary_err,
            "Primary provider failed, trying fallback"
        );

        let fallback_result = match self.resolve(fallback) {
            Ok(fb) => self.fetch_with_validation(fb, correlation_id).await,
            Err(e) => Err(e),
        };

        match fallback_result {
            Ok(outcome) => {
                tracing::info!(
                    provider = %fallback,
                    fallback_from = %name,
                    correlation_id = %correlation_id,
                    "Ingestion served by fallback provider"
                );
                success(fallback, correlation_id, started, outcome, vec![primary_error], Some(name))
            }
            Err(fallback_err) => {
                let message = format!(
                    "Primary provider '{name}' failed: {primary_err}; fallback '{fallback}' failed: {fallback_err}"
                );
                tracing::error!(
                    provider = %name,
                    fallback = %fallback,
                    correlation_id = %correlation_id,
                    "{message}"
                );
                self.alert_failure(AlertSeverity::Critical, name, correlation_id, message.clone())
                    .await;

                let mut combined = IngestionError::from_app_error(fallback, &fallback_err);
                combined.message = message;
                failure(
                    fallback,
                    correlation_id,
                    started,
                    vec![primary_error, combined],
                    Some(name),
                )
            }
        }
    }

    async fn fetch_with_validation(
        &self,
        entry: &RegisteredProvider,
        correlation_id: &str,
    ) -> Result<FetchOutcome, AppError> {
        let name = entry.provider.name();
        let settings = &entry.settings;
        let metrics = self.context.metrics();

        let breaker = self.context.breakers().get(&name);
        let was_open = breaker
            .as_ref()
            .is_some_and(|b| b.state() == CircuitState::Open);

        let fetch_started = Instant::now();
        let fetched = entry.provider.fetch_data(correlation_id).await;
        if !matches!(fetched, Err(AppError::CircuitOpen { .. })) {
            metrics.record_health_check(&name, fetched.is_ok(), fetch_started.elapsed());
        }
        if !was_open && breaker.is_some_and(|b| b.state() == CircuitState::Open) {
            metrics.record_circuit_breaker_open(&name);
        }

        let mut data = fetched?.data;
        if let Some(normalize) = &settings.normalizer {
            data = normalize(data)?;
        }

        if let Some(contract) = &settings.validation {
            let validation_started = Instant::now();
            let outcome = contract.validate(&data);
            metrics.record_validation(&name, outcome.is_ok(), validation_started.elapsed());
            if let Err(e) = outcome {
                tracing::error!(
                    provider = %name,
                    contract = %contract.name(),
                    correlation_id = %correlation_id,
                    error = %e,
                    "Payload failed contract validation"
                );
                return Err(e);
            }
        }

        if let Some(rule) = &settings.completeness {
            metrics.record_completeness(
                &name,
                CompletenessSample::from_payload(&data, &rule.required, &rule.optional),
            );
        }

        let drift = if settings.drift_detection {
            match self
                .detector
                .detect_drift(&name, &settings.schema_name, &data, correlation_id)
                .await
            {
                Ok(result) => {
                    metrics.record_drift(&name, result.severity);
                    if result.detected {
                        self.alert_drift(&name, &result).await;
                    }
                    Some(result)
                }
                Err(e) => {
                    tracing::warn!(
                        provider = %name,
                        correlation_id = %correlation_id,
                        error = %e,
                        "Drift check failed; continuing without it"
                    );
                    None
                }
            }
        } else {
            None
        };

        Ok(FetchOutcome { data, drift })
    }

    async fn alert_drift(&self, provider: &str, result: &DriftDetectionResult) {
        let Some(severity) = AlertSeverity::for_drift(result.severity) else {
            return;
        };
        let diff = &result.diff;
        let payload = AlertPayload::new(
            severity,
            format!("Schema drift detected: {provider}/{}", result.current.schema_name),
            format!(
                "{} drift: {} added, {} removed, {} modified",
                result.severity,
                diff.added.len(),
                diff.removed.len(),
                diff.modified.len()
            ),
            &result.correlation_id,
        )
        .with_provider(provider)
        .with_metadata(json!({
            "severity": result.severity,
            "diff": diff,
            "baseline_version": result.baseline.as_ref().map(|b| b.version),
            "current_hash": result.current.hash,
        }));
        self.alerts.send_alert(&payload).await;
    }

    async fn alert_failure(
        &self,
        severity: AlertSeverity,
        provider: &str,
        correlation_id: &str,
        message: String,
    ) {
        if !self.config.alert_on_failure {
            return;
        }
        let payload = AlertPayload::new(
            severity,
            format!("Ingestion failed: {provider}"),
            message,
            correlation_id,
        )
        .with_provider(provider);
        self.alerts.send_alert(&payload).await;
    }
}

fn success(
    provider: &str,
    correlation_id: &str,
    started: Instant,
    outcome: FetchOutcome,
    errors: Vec<IngestionError>,
    fallback_from: Option<&str>,
) -> IngestionResult {
    let drift = outcome.drift.as_ref();
    IngestionResult {
        success: true,
        data: Some(outcome.data),
        errors,
        metadata: IngestionMetadata {
            correlation_id: correlation_id.to_string(),
            timestamp: Utc::now(),
            provider: provider.to_string(),
            duration_ms: started.elapsed().as_millis() as u64,
            drift_detected: drift.is_some_and(|d| d.detected),
            drift_severity: drift.map(|d| d.severity),
            fallback_from: fallback_from.map(str::to_string),
        },
    }
}

fn failure(
    provider: &str,
    correlation_id: &str,
    started: Instant,
    errors: Vec<IngestionError>,
    fallback_from: Option<&str>,
) -> IngestionResult {
    IngestionResult {
        success: false,
        data: None,
        errors,
        metadata: IngestionMetadata {
            correlation_id: correlation_id.to_string(),
            timestamp: Utc::now(),
            provider: provider.to_string(),
            duration_ms: started.elapsed().as_millis() as u64,
            drift_detected: false,
            drift_severity: None,
            fallback_from: fallback_from.map(str::to_string),
        },
    }
}
