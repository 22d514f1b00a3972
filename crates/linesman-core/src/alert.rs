//! Best-effort alert fan-out to console, webhook, chat and email sinks.
//!
//! Every configured sink is attempted independently; a failing sink is
//! logged and reported but never blocks or fails the others.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::drift::DriftSeverity;
use crate::traits::HttpTransport;
use crate::transport::HttpRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertSeverity {
    /// Critical and high drift alert at error level, medium at warning, low at info.
    pub fn for_drift(severity: DriftSeverity) -> Option<Self> {
        match severity {
            DriftSeverity::Critical | DriftSeverity::High => Some(AlertSeverity::Error),
            DriftSeverity::Medium => Some(AlertSeverity::Warning),
            DriftSeverity::Low => Some(AlertSeverity::Info),
            DriftSeverity::None => None,
        }
    }

    fn color(self) -> &'static str {
        match self {
            AlertSeverity::Info => "#439FE0",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Error => "danger",
            AlertSeverity::Critical => "#8B0000",
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Error => "error",
            AlertSeverity::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPayload {
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl AlertPayload {
    pub fn new(
        severity: AlertSeverity,
        title: impl Into<String>,
        message: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            title: title.into(),
            message: message.into(),
            correlation_id: correlation_id.into(),
            timestamp: Utc::now(),
            provider: None,
            metadata: None,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookSinkConfig {
    pub url: String,
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatSinkConfig {
    pub webhook_url: String,
    pub channel: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailSinkConfig {
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertConfig {
    pub console: bool,
    pub webhook: Option<WebhookSinkConfig>,
    pub chat: Option<ChatSinkConfig>,
    pub email: Option<EmailSinkConfig>,
    /// Per-sink delivery timeout.
    pub timeout: Duration,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            console: true,
            webhook: None,
            chat: None,
            email: None,
            timeout: Duration::from_secs(5),
        }
    }
}

impl AlertConfig {
    /// Console only, plus any sink configured through `LINESMAN_ALERT_*` variables.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        Self {
            webhook: var("LINESMAN_ALERT_WEBHOOK_URL").map(|url| WebhookSinkConfig {
                url,
                headers: BTreeMap::new(),
            }),
            chat: var("LINESMAN_ALERT_CHAT_WEBHOOK_URL").map(|webhook_url| ChatSinkConfig {
                webhook_url,
                channel: var("LINESMAN_ALERT_CHAT_CHANNEL"),
                username: Some("linesman".to_string()),
            }),
            email: var("LINESMAN_ALERT_EMAIL_TO").map(|to| EmailSinkConfig {
                recipients: to.split(',').map(|s| s.trim().to_string()).collect(),
            }),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSink {
    Console,
    Webhook,
    Chat,
    Email,
}

/// Which sinks took an alert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchReport {
    pub delivered: Vec<AlertSink>,
    pub skipped: Vec<AlertSink>,
    pub failed: Vec<(AlertSink, String)>,
}

impl DispatchReport {
    fn record(&mut self, sink: AlertSink, outcome: Result<(), String>) {
        match outcome {
            Ok(()) => self.delivered.push(sink),
            Err(e) => self.failed.push((sink, e)),
        }
    }
}

/// Sends alerts to the sinks in its [`AlertConfig`].
#[derive(Clone)]
pub struct AlertDispatcher<T: HttpTransport> {
    transport: T,
    config: AlertConfig,
}

impl<T: HttpTransport> AlertDispatcher<T> {
    pub fn new(transport: T, config: AlertConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    pub async fn send_alert(&self, payload: &AlertPayload) -> DispatchReport {
        self.send_alert_with(&self.config, payload).await
    }

    /// Dispatch `payload` through the sinks in `config`. Never fails.
    pub async fn send_alert_with(&self, config: &AlertConfig, payload: &AlertPayload) -> DispatchReport {
        let mut report = DispatchReport::default();

        if config.console {
            log_to_console(payload);
            report.delivered.push(AlertSink::Console);
        }

        let webhook = async {
            match &config.webhook {
                Some(sink) => Some(self.post(webhook_request(sink, payload), config.timeout).await),
                None => None,
            }
        };
        let chat = async {
            match &config.chat {
                Some(sink) => Some(self.post(chat_request(sink, payload), config.timeout).await),
                None => None,
            }
        };
        let (webhook, chat) = futures::future::join(webhook, chat).await;

        for (sink, outcome) in [(AlertSink::Webhook, webhook), (AlertSink::Chat, chat)] {
            let Some(outcome) = outcome else { continue };
            if let Err(e) = &outcome {
                tracing::warn!(
                    sink = ?sink,
                    correlation_id = %payload.correlation_id,
                    error = %e,
                    "Alert delivery failed"
                );
            }
            report.record(sink, outcome);
        }

        if let Some(email) = &config.email {
            tracing::info!(
                recipients = email.recipients.len(),
                correlation_id = %payload.correlation_id,
                "Email alert delivery is not wired up; skipping"
            );
            report.skipped.push(AlertSink::Email);
        }

        report
    }

    async fn post(&self, request: HttpRequest, timeout: Duration) -> Result<(), String> {
        match tokio::time::timeout(timeout, self.transport.send(request)).await {
            Err(_) => Err(format!("timed out after {}ms", timeout.as_millis())),
            Ok(Err(e)) => Err(e.to_string()),
            Ok(Ok(response)) if response.is_success() => Ok(()),
            Ok(Ok(response)) => Err(format!("HTTP {}", response.status)),
        }
    }
}

fn log_to_console(payload: &AlertPayload) {
    let provider = payload.provider.as_deref().unwrap_or("-");
    match payload.severity {
        AlertSeverity::Info => tracing::info!(
            provider, correlation_id = %payload.correlation_id, "[ALERT] {}: {}", payload.title, payload.message
        ),
        AlertSeverity::Warning => tracing::warn!(
            provider, correlation_id = %payload.correlation_id, "[ALERT] {}: {}", payload.title, payload.message
        ),
        AlertSeverity::Error | AlertSeverity::Critical => tracing::error!(
            provider,
            correlation_id = %payload.correlation_id,
            severity = %payload.severity,
            "[ALERT] {}: {}",
            payload.title,
            payload.message
        ),
    }
}

fn webhook_request(sink: &WebhookSinkConfig, payload: &AlertPayload) -> HttpRequest {
    let body = serde_json::to_value(payload).unwrap_or_else(|_| json!({"title": payload.title}));
    let mut request = HttpRequest::post_json(&sink.url, &body);
    for (name, value) in &sink.headers {
        request = request.with_header(name, value);
    }
    request
}

fn chat_request(sink: &ChatSinkConfig, payload: &AlertPayload) -> HttpRequest {
    let mut fields = vec![json!({
        "title": "Correlation ID",
        "value": payload.correlation_id,
        "short": true
    })];
    if let Some(provider) = &payload.provider {
        fields.insert(0, json!({"title": "Provider", "value": provider, "short": true}));
    }

    let mut body = json!({
        "text": format!("[{}] {}", payload.severity.to_string().to_uppercase(), payload.title),
        "attachments": [{
            "color": payload.severity.color(),
            "title": payload.title,
            "text": payload.message,
            "fields": fields,
            "ts": payload.timestamp.timestamp(),
        }]
    });
    if let Some(channel) = &sink.channel {
        body["channel"] = json!(channel);
    }
    if let Some(username) = &sink.username {
        body["username"] = json!(username);
    }
    HttpRequest::post_json(&sink.webhook_url, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::testutil::MockTransport;
    use crate::transport::HttpResponse;

    fn payload() -> AlertPayload {
        AlertPayload::new(
            AlertSeverity::Error,
            "Schema drift detected",
            "nba-cdn/scoreboard: 1 removed",
            "cid-42",
        )
        .with_provider("nba-cdn")
    }

    fn all_sinks() -> AlertConfig {
        AlertConfig {
            console: true,
            webhook: Some(WebhookSinkConfig {
                url: "https://hooks.example.com/linesman".into(),
                headers: BTreeMap::from([("X-Token".to_string(), "abc".to_string())]),
            }),
            chat: Some(ChatSinkConfig {
                webhook_url: "https://chat.example.com/hook".into(),
                channel: Some("#data-alerts".into()),
                username: Some("linesman".into()),
            }),
            email: Some(EmailSinkConfig {
                recipients: vec!["ops@example.com".into()],
            }),
            timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn test_drift_severity_mapping() {
        assert_eq!(AlertSeverity::for_drift(DriftSeverity::Critical), Some(AlertSeverity::Error));
        assert_eq!(AlertSeverity::for_drift(DriftSeverity::High), Some(AlertSeverity::Error));
        assert_eq!(AlertSeverity::for_drift(DriftSeverity::Medium), Some(AlertSeverity::Warning));
        assert_eq!(AlertSeverity::for_drift(DriftSeverity::Low), Some(AlertSeverity::Info));
        assert_eq!(AlertSeverity::for_drift(DriftSeverity::None), None);
    }

    #[tokio::test]
    async fn test_fans_out_to_every_sink() {
        let transport = MockTransport::new();
        let dispatcher = AlertDispatcher::new(transport.clone(), all_sinks());

        let report = dispatcher.send_alert(&payload()).await;
        assert_eq!(
            report.delivered,
            vec![AlertSink::Console, AlertSink::Webhook, AlertSink::Chat]
        );
        assert_eq!(report.skipped, vec![AlertSink::Email]);
        assert!(report.failed.is_empty());

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        let webhook = requests
            .iter()
            .find(|r| r.url.contains("hooks.example.com"))
            .unwrap();
        assert_eq!(webhook.headers["x-token"], "abc");
        let body: serde_json::Value = serde_json::from_str(webhook.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["severity"], "error");
        assert_eq!(body["correlation_id"], "cid-42");

        let chat = requests.iter().find(|r| r.url.contains("chat.example.com")).unwrap();
        let body: serde_json::Value = serde_json::from_str(chat.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["channel"], "#data-alerts");
        assert_eq!(body["text"], "[ERROR] Schema drift detected");
        assert_eq!(body["attachments"][0]["fields"][0]["value"], "nba-cdn");
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_block_others() {
        let transport = MockTransport::new().with_route(
            "hooks.example.com",
            Err(AppError::NetworkError("connection refused".into())),
        );
        let dispatcher = AlertDispatcher::new(transport.clone(), all_sinks());

        let report = dispatcher.send_alert(&payload()).await;
        assert!(report.delivered.contains(&AlertSink::Chat));
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, AlertSink::Webhook);
        assert!(report.failed[0].1.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_failure() {
        let transport = MockTransport::new()
            .with_route("chat.example.com", Ok(HttpResponse::new(500, None, "oops")));
        let config = AlertConfig {
            console: false,
            webhook: None,
            email: None,
            ..all_sinks()
        };
        let dispatcher = AlertDispatcher::new(transport, config);

        let report = dispatcher.send_alert(&payload()).await;
        assert!(report.delivered.is_empty());
        assert_eq!(report.failed, vec![(AlertSink::Chat, "HTTP 500".to_string())]);
    }

    #[tokio::test]
    async fn test_console_only_makes_no_requests() {
        let transport = MockTransport::new();
        let dispatcher = AlertDispatcher::new(transport.clone(), AlertConfig::default());
        let report = dispatcher
            .send_alert(&AlertPayload::new(AlertSeverity::Info, "t", "m", "c"))
            .await;
        assert_eq!(report.delivered, vec![AlertSink::Console]);
        assert_eq!(transport.request_count(), 0);
    }
}
