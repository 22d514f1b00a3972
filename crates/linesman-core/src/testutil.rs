//! Test utilities: handwritten mocks for the transport and provider traits.
//!
//! Mocks share state through `Arc<Mutex<_>>` so clones handed to the code
//! under test can be inspected afterwards.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};

use crate::circuit_breaker::CircuitBreaker;
use crate::error::AppError;
use crate::models::{FetchMetadata, HealthStatus, ProviderMetadata, ProviderPayload};
use crate::traits::{HttpTransport, Provider};
use crate::transport::{HttpRequest, HttpResponse};

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

/// Transport that replays queued responses and records every request.
#[derive(Clone, Default)]
pub struct MockTransport {
    /// Each call pops the first element. If empty, returns `{}` as JSON.
    responses: Arc<Mutex<Vec<Result<HttpResponse, AppError>>>>,
    /// One-shot responses matched by URL substring, checked before the queue.
    routes: Arc<Mutex<Vec<(String, Result<HttpResponse, AppError>)>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
    delay: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(responses: Vec<Result<HttpResponse, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    /// Sleep before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_route(self, url_contains: &str, response: Result<HttpResponse, AppError>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .push((url_contains.to_string(), response));
        self
    }

    pub fn push_response(&self, response: Result<HttpResponse, AppError>) {
        self.responses.lock().unwrap().push(response);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next_response(&self, url: &str) -> Result<HttpResponse, AppError> {
        {
            let mut routes = self.routes.lock().unwrap();
            if let Some(pos) = routes.iter().position(|(pattern, _)| url.contains(pattern.as_str())) {
                return routes.remove(pos).1;
            }
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(HttpResponse::ok_json("{}"))
        } else {
            responses.remove(0)
        }
    }
}

impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AppError> {
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next_response(&url)
    }
}

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

/// Provider that replays queued payloads.
#[derive(Clone)]
pub struct MockProvider {
    name: String,
    /// Each fetch pops the first element. If empty, returns `{"ok": true}`.
    payloads: Arc<Mutex<Vec<Result<Value, AppError>>>>,
    correlation_ids: Arc<Mutex<Vec<String>>>,
    calls: Arc<AtomicUsize>,
    healthy: bool,
    breaker: Option<CircuitBreaker>,
}

impl MockProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            payloads: Arc::new(Mutex::new(Vec::new())),
            correlation_ids: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(AtomicUsize::new(0)),
            healthy: true,
            breaker: None,
        }
    }

    pub fn with_payloads(self, payloads: Vec<Result<Value, AppError>>) -> Self {
        *self.payloads.lock().unwrap() = payloads;
        self
    }

    /// Route fetches through `breaker`, as a real provider's executor would.
    pub fn with_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    /// Fetches that reached the upstream (not rejected by the breaker).
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn correlation_ids(&self) -> Vec<String> {
        self.correlation_ids.lock().unwrap().clone()
    }

    fn next_payload(&self) -> Result<Value, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut payloads = self.payloads.lock().unwrap();
        if payloads.is_empty() {
            Ok(json!({"ok": true}))
        } else {
            payloads.remove(0)
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            name: self.name.clone(),
            base_url: format!("https://{}.example.com", self.name),
            timeout_ms: 1000,
            rate_limit_per_minute: 60,
        }
    }

    async fn fetch_data(&self, correlation_id: &str) -> Result<ProviderPayload, AppError> {
        self.correlation_ids
            .lock()
            .unwrap()
            .push(correlation_id.to_string());

        let data = match &self.breaker {
            Some(breaker) => breaker
                .call(|| async { self.next_payload() })
                .await
                .map_err(AppError::from)?,
            None => self.next_payload()?,
        };

        Ok(ProviderPayload {
            data,
            metadata: FetchMetadata {
                source: self.name.clone(),
                timestamp: Utc::now(),
                correlation_id: correlation_id.to_string(),
                latency_ms: 1,
            },
        })
    }

    async fn health_check(&self) -> HealthStatus {
        HealthStatus {
            provider: self.name.clone(),
            healthy: self.healthy,
            latency_ms: 1,
            error: (!self.healthy).then(|| "mock provider is down".to_string()),
            checked_at: Utc::now(),
        }
    }
}
