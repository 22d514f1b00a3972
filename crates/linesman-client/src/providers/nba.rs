use async_trait::async_trait;
use linesman_core::circuit_breaker::CircuitBreakerRegistry;
use linesman_core::error::AppError;
use linesman_core::models::{HealthStatus, ProviderConfig, ProviderMetadata, ProviderPayload};
use linesman_core::traits::{HttpTransport, Provider};

use super::JsonFeed;

pub const NBA_CDN_NAME: &str = "nba-cdn";
pub const NBA_CDN_BASE_URL: &str = "https://cdn.nba.com";
pub const SCOREBOARD_PATH: &str = "/static/json/liveData/scoreboard/todaysScoreboard_00.json";
pub const DEFAULT_RATE_LIMIT: u32 = 60;

// The CDN rejects requests that do not look like they come from the site.
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
const NBA_REFERER: &str = "https://www.nba.com/";

/// Live scoreboard and box scores from the public NBA CDN.
#[derive(Clone)]
pub struct NbaCdnProvider<T: HttpTransport> {
    feed: JsonFeed<T>,
}

/// CDN base URL, browser-like headers and a conservative rate.
pub fn default_config() -> ProviderConfig {
    ProviderConfig::new(NBA_CDN_NAME, NBA_CDN_BASE_URL)
        .with_rate_limit(DEFAULT_RATE_LIMIT)
        .with_header("user-agent", BROWSER_USER_AGENT)
        .with_header("referer", NBA_REFERER)
        .with_header("origin", "https://www.nba.com")
}

pub fn boxscore_path(game_id: &str) -> Result<String, AppError> {
    if game_id.is_empty() || !game_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::Generic(format!("invalid game id '{game_id}'")));
    }
    Ok(format!("/static/json/liveData/boxscore/boxscore_{game_id}.json"))
}

impl<T: HttpTransport> NbaCdnProvider<T> {
    pub fn new(
        config: ProviderConfig,
        transport: T,
        registry: &CircuitBreakerRegistry,
    ) -> Result<Self, AppError> {
        Ok(Self {
            feed: JsonFeed::new(config, transport, registry, SCOREBOARD_PATH, SCOREBOARD_PATH)?,
        })
    }

    /// Box score for one game, through the same executor as the scoreboard.
    pub async fn fetch_boxscore(
        &self,
        game_id: &str,
        correlation_id: &str,
    ) -> Result<ProviderPayload, AppError> {
        let path = boxscore_path(game_id)?;
        self.feed.fetch_path(&path, correlation_id).await
    }
}

#[async_trait]
impl<T: HttpTransport + 'static> Provider for NbaCdnProvider<T> {
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
