use async_trait::async_trait;
use linesman_core::circuit_breaker::CircuitBreakerRegistry;
use linesman_core::error::AppError;
use linesman_core::models::{
    AuthStyle, HealthStatus, ProviderConfig, ProviderMetadata, ProviderPayload,
};
use linesman_core::traits::{HttpTransport, Provider};
use serde::{Deserialize, Serialize};

use super::JsonFeed;

pub const PRIMARY_ODDS_NAME: &str = "odds-primary";
pub const PRIMARY_ODDS_BASE_URL: &str = "https://api.the-odds-api.com";
pub const PRIMARY_ODDS_PATH: &str =
    "/v4/sports/basketball_nba/odds?regions=us&markets=h2h,spreads,totals&oddsFormat=american";
/// Listing sports does not count against the request quota.
pub const PRIMARY_HEALTH_PATH: &str = "/v4/sports";

pub const SECONDARY_ODDS_NAME: &str = "odds-secondary";
pub const SECONDARY_ODDS_PATH: &str = "/v1/odds/nba";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OddsFeed {
    Primary,
    Secondary,
}

impl OddsFeed {
    fn paths(self) -> (&'static str, &'static str) {
        match self {
            OddsFeed::Primary => (PRIMARY_ODDS_PATH, PRIMARY_HEALTH_PATH),
            OddsFeed::Secondary => (SECONDARY_ODDS_PATH, SECONDARY_ODDS_PATH),
        }
    }
}

/// Betting lines from a keyed odds API.
#[derive(Clone)]
pub struct OddsProvider<T: HttpTransport> {
    feed: JsonFeed<T>,
    role: OddsFeed,
}

/// The Odds API: key in the `apiKey` query parameter, tight quota.
pub fn primary_config(api_key: impl Into<String>) -> ProviderConfig {
    ProviderConfig::new(PRIMARY_ODDS_NAME, PRIMARY_ODDS_BASE_URL)
        .with_api_key(api_key, AuthStyle::QueryParam("apiKey".to_string()))
        .with_rate_limit(30)
}

/// A bearer-authenticated odds feed at `base_url`.
pub fn secondary_config(base_url: impl Into<String>, api_key: impl Into<String>) -> ProviderConfig {
    ProviderConfig::new(SECONDARY_ODDS_NAME, base_url).with_api_key(api_key, AuthStyle::Bearer)
}

impl<T: HttpTransport> OddsProvider<T> {
    /// Fails with a config error when `config` carries no API key.
    pub fn new(
        role: OddsFeed,
        config: ProviderConfig,
        transport: T,
        registry: &CircuitBreakerRegistry,
    ) -> Result<Self, AppError> {
        if config.api_key.as_deref().is_none_or(str::is_empty) {
            return Err(AppError::ConfigError(format!(
                "provider '{}' requires an API key",
                config.name
            )));
        }
        let (path, health_path) = role.paths();
        Ok(Self {
            feed: JsonFeed::new(config, transport, registry, path, health_path)?,
            role,
        })
    }

    pub fn role(&self) -> OddsFeed {
        self.role
    }
}

#[async_trait]
impl<T: HttpTransport + 'static> Provider for OddsProvider<T> {
    fn metadata(&self) -> ProviderMetadata {
        self.feed.metadata()
    }

    async fn fetch_data(&self, correlation_id: &str) -> Result<ProviderPayload, AppError> {
        self.feed.fetch(correlation_id).await
    }

    async fn health_check(&self) -> HealthStatus {
        self.feed.probe().await
    }
}
