use linesman_core::error::AppError;
use linesman_core::traits::HttpTransport;
use linesman_core::transport::{HttpMethod, HttpRequest, HttpResponse};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;

pub const DEFAULT_USER_AGENT: &str = "Linesman/0.1 (sports data ingestion)";

/// HTTP transport using reqwest.
///
/// Sends exactly one request per call. Timeouts, retries and rate limiting
/// belong to [`linesman_core::executor::ResilientExecutor`], so the client is
/// built without a timeout of its own.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, AppError> {
        Self::with_user_agent(DEFAULT_USER_AGENT)
    }

    pub fn with_user_agent(user_agent: &str) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AppError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_connect() {
                AppError::NetworkError(format!("Connection failed: {e}"))
            } else {
                AppError::NetworkError(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| AppError::NetworkError(format!("Failed to read response body: {e}")))?;

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            status,
            "HTTP request completed"
        );
        Ok(HttpResponse::new(status, content_type.as_deref(), body))
    }
}
