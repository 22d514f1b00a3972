use async_trait::async_trait;
use chrono::NaiveDate;
use linesman_core::circuit_breaker::CircuitBreakerRegistry;
use linesman_core::error::AppError;
use linesman_core::models::{HealthStatus, ProviderConfig, ProviderMetadata, ProviderPayload};
use linesman_core::traits::{HttpTransport, Provider};

use super::JsonFeed;

pub const SPORTS_FEED_NAME: &str = "espn";
pub const SPORTS_FEED_BASE_URL: &str = "https://site.api.espn.com";
pub const SCOREBOARD_PATH: &str = "/apis/site/v2/sports/basketball/nba/scoreboard";

/// Secondary scoreboard feed (ESPN site API).
#[derive(Clone)]
pub struct SportsFeedProvider<T: HttpTransport> {
    feed: JsonFeed<T>,
}

pub fn default_config() -> ProviderConfig {
    ProviderConfig::new(SPORTS_FEED_NAME, SPORTS_FEED_BASE_URL).with_rate_limit(30)
}

impl<T: HttpTransport> SportsFeedProvider<T> {
    pub fn new(
        config: ProviderConfig,
        transport: T,
        registry: &CircuitBreakerRegistry,
    ) -> Result<Self, AppError> {
        Ok(Self {
            feed: JsonFeed::new(config, transport, registry, SCOREBOARD_PATH, SCOREBOARD_PATH)?,
        })
    }

    /// Scoreboard for a specific day instead of today.
    pub async fn fetch_for_date(
        &self,
        date: NaiveDate,
        correlation_id: &str,
    ) -> Result<ProviderPayload, AppError> {
        let path = format!("{SCOREBOARD_PATH}?dates={}", date.format("%Y%m%d"));
        self.feed.fetch_path(&path, correlation_id).await
    }
}

#[async_trait]
impl<T: HttpTransport + 'static> Provider for SportsFeedProvider<T> {
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
