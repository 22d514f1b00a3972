//! Provider catalog: the JSON configuration file that lists which providers
//! to build and how the orchestrator treats each one.
//!
//! ```json
//! {
//!   "providers": [
//!     { "kind": "nba_cdn", "fallback": "espn", "validation_schema": "scoreboard@latest" },
//!     { "kind": "sports_feed" },
//!     { "kind": "primary_odds", "api_key_env": "ODDS_API_KEY", "enabled": false }
//!   ]
//! }
//! ```
//!
//! Every field except `kind` is optional; omitted fields take the provider's defaults.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use linesman_core::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerRegistry};
use linesman_core::error::AppError;
use linesman_core::models::ProviderConfig;
use linesman_core::orchestrator::{CompletenessRule, IngestionOrchestrator, ProviderSettings};
use linesman_core::retry::RetryPolicy;
use linesman_core::traits::{BaselineStore, HttpTransport, Provider};
use linesman_core::validation::ContractRegistry;
use serde::{Deserialize, Serialize};

use crate::providers::nba::{self, NBA_CDN_NAME};
use crate::providers::odds::{self, PRIMARY_ODDS_NAME, SECONDARY_ODDS_NAME};
use crate::providers::sports_feed::{self, SPORTS_FEED_NAME};
use crate::providers::{NbaCdnProvider, OddsFeed, OddsProvider, SportsFeedProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    NbaCdn,
    SportsFeed,
    PrimaryOdds,
    SecondaryOdds,
}

impl ProviderKind {
    pub fn default_name(self) -> &'static str {
        match self {
            ProviderKind::NbaCdn => NBA_CDN_NAME,
            ProviderKind::SportsFeed => SPORTS_FEED_NAME,
            ProviderKind::PrimaryOdds => PRIMARY_ODDS_NAME,
            ProviderKind::SecondaryOdds => SECONDARY_ODDS_NAME,
        }
    }

    pub fn default_schema_name(self) -> &'static str {
        match self {
            ProviderKind::NbaCdn | ProviderKind::SportsFeed => "scoreboard",
            ProviderKind::PrimaryOdds | ProviderKind::SecondaryOdds => "odds",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
        }
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(s: RetrySettings) -> Self {
        RetryPolicy::new(
            s.max_retries,
            Duration::from_millis(s.base_delay_ms),
            Duration::from_millis(s.max_delay_ms),
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub reset_timeout_ms: u64,
    pub half_open_max_calls: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        let config = CircuitBreakerConfig::default();
        Self {
            failure_threshold: config.failure_threshold,
            success_threshold: config.success_threshold,
            reset_timeout_ms: config.reset_timeout.as_millis() as u64,
            half_open_max_calls: config.half_open_max_calls,
        }
    }
}

impl From<BreakerSettings> for CircuitBreakerConfig {
    fn from(s: BreakerSettings) -> Self {
        CircuitBreakerConfig {
            failure_threshold: s.failure_threshold,
            success_threshold: s.success_threshold,
            reset_timeout: Duration::from_millis(s.reset_timeout_ms),
            half_open_max_calls: s.half_open_max_calls,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletenessSettings {
    pub required: Vec<String>,
    pub optional: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// One provider in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderEntry {
    pub kind: ProviderKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable holding the API key. Used when `api_key` is unset.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub rate_limit_per_minute: Option<u32>,
    #[serde(default)]
    pub retry: Option<RetrySettings>,
    #[serde(default)]
    pub circuit_breaker: Option<BreakerSettings>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub fallback: Option<String>,
    #[serde(default)]
    pub schema_name: Option<String>,
    #[serde(default = "default_true")]
    pub drift_detection: bool,
    /// Contract path or `name@version` reference, resolved through the schema directory.
    #[serde(default)]
    pub validation_schema: Option<String>,
    #[serde(default)]
    pub completeness: Option<CompletenessSettings>,
}

impl ProviderEntry {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            name: None,
            base_url: None,
            api_key: None,
            api_key_env: None,
            timeout_ms: None,
            rate_limit_per_minute: None,
            retry: None,
            circuit_breaker: None,
            headers: BTreeMap::new(),
            enabled: true,
            fallback: None,
            schema_name: None,
            drift_detection: true,
            validation_schema: None,
            completeness: None,
        }
    }

    pub fn name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.kind.default_name().to_string())
    }

    fn api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| {
            self.api_key_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok())
                .filter(|key| !key.is_empty())
        })
    }

    /// Start from the kind's defaults and apply every field that is set.
    pub fn config(&self) -> Result<ProviderConfig, AppError> {
        let key = self.api_key();
        let mut config = match self.kind {
            ProviderKind::NbaCdn => nba::default_config(),
            ProviderKind::SportsFeed => sports_feed::default_config(),
            ProviderKind::PrimaryOdds => odds::primary_config(key.clone().unwrap_or_default()),
            ProviderKind::SecondaryOdds => {
                let base_url = self.base_url.clone().ok_or_else(|| {
                    AppError::ConfigError(format!(
                        "provider '{}' requires a base_url",
                        self.name()
                    ))
                })?;
                odds::secondary_config(base_url, key.clone().unwrap_or_default())
            }
        };

        config.name = self.name();
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(key) = key {
            config.api_key = Some(key);
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config = config.with_timeout(Duration::from_millis(timeout_ms));
        }
        if let Some(rpm) = self.rate_limit_per_minute {
            config = config.with_rate_limit(rpm);
        }
        if let Some(retry) = self.retry {
            config = config.with_retry(retry.into());
        }
        if let Some(breaker) = self.circuit_breaker {
            config = config.with_circuit_breaker(breaker.into());
        }
        for (name, value) in &self.headers {
            config = config.with_header(name, value);
        }
        Ok(config)
    }

    /// Orchestration settings. Resolving a validation contract needs `contracts`.
    pub fn settings(&self, contracts: Option<&ContractRegistry>) -> Result<ProviderSettings, AppError> {
        let mut settings = ProviderSettings {
            enabled: self.enabled,
            fallback: self.fallback.clone(),
            schema_name: self
                .schema_name
                .clone()
                .unwrap_or_else(|| self.kind.default_schema_name().to_string()),
            drift_detection: self.drift_detection,
            ..ProviderSettings::default()
        };

        if let Some(reference) = &self.validation_schema {
            let registry = contracts.ok_or_else(|| {
                AppError::ConfigError(format!(
                    "provider '{}' names validation schema '{reference}' but no schema directory is configured",
                    self.name()
                ))
            })?;
            settings = settings.with_validation(registry.resolve(reference)?);
        }
        if let Some(c) = &self.completeness {
            settings = settings.with_completeness(CompletenessRule {
                required: c.required.clone(),
                optional: c.optional.clone(),
            });
        }
        Ok(settings)
    }

    /// Construct the provider over `transport`, binding its breaker from `registry`.
    pub fn build<T: HttpTransport + 'static>(
        &self,
        transport: T,
        registry: &CircuitBreakerRegistry,
    ) -> Result<Arc<dyn Provider>, AppError> {
        let config = self.config()?;
        let provider: Arc<dyn Provider> = match self.kind {
            ProviderKind::NbaCdn => Arc::new(NbaCdnProvider::new(config, transport, registry)?),
            ProviderKind::SportsFeed => Arc::new(SportsFeedProvider::new(config, transport, registry)?),
            ProviderKind::PrimaryOdds => {
                Arc::new(OddsProvider::new(OddsFeed::Primary, config, transport, registry)?)
            }
            ProviderKind::SecondaryOdds => {
                Arc::new(OddsProvider::new(OddsFeed::Secondary, config, transport, registry)?)
            }
        };
        Ok(provider)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderCatalog {
    pub providers: Vec<ProviderEntry>,
}

impl ProviderCatalog {
    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        serde_json::from_str(raw)
            .map_err(|e| AppError::ConfigError(format!("Invalid provider catalog: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!(
                "Failed to read provider catalog {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&raw)
    }

    /// NBA CDN with the ESPN feed as its fallback. Odds feeds need keys and are opt-in.
    pub fn default_catalog() -> Self {
        let mut nba = ProviderEntry::new(ProviderKind::NbaCdn);
        nba.fallback = Some(SPORTS_FEED_NAME.to_string());
        nba.completeness = Some(CompletenessSettings {
            required: vec!["scoreboard.gameDate".into(), "scoreboard.games".into()],
            optional: vec!["scoreboard.leagueName".into()],
        });
        Self {
            providers: vec![nba, ProviderEntry::new(ProviderKind::SportsFeed)],
        }
    }

    /// Build and register every entry. Entries that fail to configure or
    /// construct are logged and left out. Returns the number registered.
    pub fn register_all<S, A, T>(
        &self,
        orchestrator: &mut IngestionOrchestrator<S, A>,
        transport: &T,
        contracts: Option<&ContractRegistry>,
    ) -> usize
    where
        S: BaselineStore,
        A: HttpTransport,
        T: HttpTransport + 'static,
    {
        let breakers = Arc::clone(orchestrator.context().breakers());
        let mut registered = 0;

        for entry in &self.providers {
            let name = entry.name();
            let settings = match entry.settings(contracts) {
                Ok(settings) => settings,
                Err(e) => {
                    tracing::error!(provider = %name, error = %e, "Invalid provider settings; skipping");
                    continue;
                }
            };
            if orchestrator.register_with(&name, settings, || entry.build(transport.clone(), &breakers)) {
                registered += 1;
            }
        }

        tracing::info!(
            registered,
            configured = self.providers.len(),
            "Provider catalog loaded"
        );
        registered
    }
}
