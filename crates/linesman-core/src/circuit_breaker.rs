//! Circuit breaker pattern for provider resilience.
//!
//! Protects callers against cascading failures when an upstream provider
//! degrades. One breaker exists per provider name, shared through
//! [`CircuitBreakerRegistry`].
//!
//! # Circuit States
//!
//! ```text
//! CLOSED --[failure_threshold consecutive failures]--> OPEN --[reset_timeout]--> HALF_OPEN
//!   ^                                                   ^                            |
//!   |                                                   +-------[any failure]--------+
//!   +---------------------[success_threshold consecutive successes]-----------------+
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::AppError;

/// Current state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Requests are rejected immediately.
    Open,
    /// A limited number of probe requests test recovery.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit.
    pub failure_threshold: u32,

    /// Consecutive half-open successes needed to close the circuit.
    pub success_threshold: u32,

    /// Time to wait in Open before allowing probes.
    pub reset_timeout: Duration,

    /// Probes allowed in flight while half-open.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(60),
            half_open_max_calls: 3,
        }
    }
}

#[derive(Debug)]
struct CircuitBreakerInner {
    state: CircuitState,
    failures: u64,
    successes: u64,
    consecutive_failures: u32,
    consecutive_successes: u32,
    total_calls: u64,
    rejected_calls: u64,
    last_failure_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
    next_attempt_at: Option<Instant>,
    half_open_in_flight: u32,
    last_error: Option<String>,
    /// Bumped on every state change; admissions carry the value they saw.
    epoch: u64,
}

impl CircuitBreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            successes: 0,
            consecutive_failures: 0,
            consecutive_successes: 0,
            total_calls: 0,
            rejected_calls: 0,
            last_failure_at: None,
            last_success_at: None,
            next_attempt_at: None,
            half_open_in_flight: 0,
            last_error: None,
            epoch: 0,
        }
    }

    fn time_until_half_open(&self) -> Option<Duration> {
        if self.state != CircuitState::Open {
            return None;
        }
        Some(
            self.next_attempt_at
                .map(|t| t.saturating_duration_since(Instant::now()))
                .unwrap_or(Duration::ZERO),
        )
    }
}

/// Ticket for an admitted call, tied to the state it was admitted under.
#[derive(Debug, Clone, Copy)]
struct Admission {
    epoch: u64,
}

/// Read-only snapshot of a breaker for monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failures: u64,
    pub successes: u64,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub total_calls: u64,
    pub rejected_calls: u64,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub time_until_half_open: Option<Duration>,
}

/// Error type for circuit breaker operations.
#[derive(Debug)]
pub enum CircuitBreakerError {
    /// Circuit is open - request was rejected without calling the provider.
    Open { name: String, retry_after: Duration },
    /// The inner operation failed.
    Inner(AppError),
}

impl std::fmt::Display for CircuitBreakerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitBreakerError::Open { name, retry_after } => write!(
                f,
                "Circuit breaker '{}' is open. Retry after {}ms.",
                name,
                retry_after.as_millis()
            ),
            CircuitBreakerError::Inner(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CircuitBreakerError {}

impl From<CircuitBreakerError> for AppError {
    fn from(err: CircuitBreakerError) -> Self {
        match err {
            CircuitBreakerError::Open { name, retry_after } => AppError::CircuitOpen {
                provider: name,
                retry_after,
            },
            CircuitBreakerError::Inner(e) => e,
        }
    }
}

/// Thread-safe circuit breaker guarding one provider.
#[derive(Clone)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<CircuitBreakerInner>>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Arc::new(Mutex::new(CircuitBreakerInner::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Acquires the inner mutex lock, recovering from poison if necessary.
    fn lock_inner(&self) -> MutexGuard<'_, CircuitBreakerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(circuit = %self.name, "Recovered from poisoned mutex");
            poisoned.into_inner()
        })
    }

    /// Returns the current state, handling lazy Open -> HalfOpen transitions.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock_inner();
        self.maybe_transition_to_half_open(&mut inner);
        inner.state
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let mut inner = self.lock_inner();
        self.maybe_transition_to_half_open(&mut inner);

        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            failures: inner.failures,
            successes: inner.successes,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            total_calls: inner.total_calls,
            rejected_calls: inner.rejected_calls,
            last_failure_at: inner.last_failure_at,
            last_success_at: inner.last_success_at,
            last_error: inner.last_error.clone(),
            time_until_half_open: inner.time_until_half_open(),
        }
    }

    /// Executes the given operation through the circuit breaker.
    ///
    /// - Closed: executes the operation, tracks success/failure
    /// - Open: returns `CircuitBreakerError::Open` without invoking `operation`
    /// - HalfOpen: admits up to `half_open_max_calls` concurrent probes
    ///
    /// Errors for which [`AppError::should_trip_circuit`] is false are passed
    /// through without affecting the breaker. A call that finishes after the
    /// breaker changed state since its admission only updates the totals.
    pub async fn call<F, T, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let admission = self.try_acquire()?;

        let result = operation().await;

        match &result {
            Ok(_) => self.finish(admission, None),
            Err(e) if e.should_trip_circuit() => self.finish(admission, Some(e)),
            Err(_) => self.release_probe(admission),
        }

        result.map_err(CircuitBreakerError::Inner)
    }

    /// Admission check. Counts the call, or the rejection.
    fn try_acquire(&self) -> Result<Admission, CircuitBreakerError> {
        let mut inner = self.lock_inner();
        self.maybe_transition_to_half_open(&mut inner);

        match inner.state {
            CircuitState::Open => {
                inner.rejected_calls += 1;
                let retry_after = inner.time_until_half_open().unwrap_or(self.config.reset_timeout);
                tracing::debug!(
                    circuit = %self.name,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Circuit open, rejecting call"
                );
                Err(CircuitBreakerError::Open {
                    name: self.name.clone(),
                    retry_after,
                })
            }
            CircuitState::HalfOpen if inner.half_open_in_flight >= self.config.half_open_max_calls => {
                inner.rejected_calls += 1;
                Err(CircuitBreakerError::Open {
                    name: self.name.clone(),
                    retry_after: Duration::ZERO,
                })
            }
            CircuitState::HalfOpen => {
                inner.half_open_in_flight += 1;
                inner.total_calls += 1;
                Ok(Admission { epoch: inner.epoch })
            }
            CircuitState::Closed => {
                inner.total_calls += 1;
                Ok(Admission { epoch: inner.epoch })
            }
        }
    }

    fn release_probe(&self, admission: Admission) {
        let mut inner = self.lock_inner();
        if inner.epoch == admission.epoch && inner.state == CircuitState::HalfOpen {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
        }
    }

    /// Settles an admitted call. Outcomes from an earlier epoch count toward
    /// the totals but never move the state machine.
    fn finish(&self, admission: Admission, error: Option<&AppError>) {
        let mut inner = self.lock_inner();
        if inner.epoch != admission.epoch {
            tracing::debug!(
                circuit = %self.name,
                admitted_epoch = admission.epoch,
                current_epoch = inner.epoch,
                success = error.is_none(),
                "Ignoring state effect of call admitted before the last transition"
            );
            match error {
                None => {
                    inner.successes += 1;
                    inner.last_success_at = Some(Utc::now());
                }
                Some(e) => {
                    inner.failures += 1;
                    inner.last_failure_at = Some(Utc::now());
                    inner.last_error = Some(e.to_string());
                }
            }
            return;
        }

        match error {
            None => self.apply_success(&mut inner),
            Some(e) => self.apply_failure(&mut inner, e),
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock_inner();
        self.apply_success(&mut inner);
    }

    pub fn record_failure(&self, error: &AppError) {
        let mut inner = self.lock_inner();
        self.apply_failure(&mut inner, error);
    }

    fn apply_success(&self, inner: &mut CircuitBreakerInner) {
        inner.successes += 1;
        inner.last_success_at = Some(Utc::now());

        match inner.state {
            CircuitState::HalfOpen => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    tracing::info!(
                        circuit = %self.name,
                        "Circuit breaker closing after {} successful probes",
                        inner.consecutive_successes
                    );
                    inner.state = CircuitState::Closed;
                    inner.failures = 0;
                    inner.successes = 0;
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    inner.next_attempt_at = None;
                    inner.half_open_in_flight = 0;
                    inner.last_error = None;
                    inner.epoch += 1;
                }
            }
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
                inner.consecutive_successes += 1;
            }
            CircuitState::Open => {}
        }
    }

    fn apply_failure(&self, inner: &mut CircuitBreakerInner, error: &AppError) {
        inner.failures += 1;
        inner.last_failure_at = Some(Utc::now());
        inner.last_error = Some(error.to_string());

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                inner.consecutive_successes = 0;

                if inner.consecutive_failures >= self.config.failure_threshold {
                    tracing::warn!(
                        circuit = %self.name,
                        failures = inner.consecutive_failures,
                        error = %error,
                        "Circuit breaker opening after {} consecutive failures",
                        inner.consecutive_failures
                    );
                    self.open(inner);
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!(
                    circuit = %self.name,
                    error = %error,
                    "Circuit breaker probe failed, returning to open state"
                );
                self.open(inner);
            }
            CircuitState::Open => {}
        }
    }

    pub fn reset(&self) {
        let mut inner = self.lock_inner();
        tracing::info!(circuit = %self.name, "Circuit breaker manually reset");
        let total_calls = inner.total_calls;
        let rejected_calls = inner.rejected_calls;
        let epoch = inner.epoch;
        *inner = CircuitBreakerInner::new();
        inner.total_calls = total_calls;
        inner.rejected_calls = rejected_calls;
        inner.epoch = epoch + 1;
    }

    fn open(&self, inner: &mut CircuitBreakerInner) {
        inner.state = CircuitState::Open;
        inner.next_attempt_at = Some(Instant::now() + self.config.reset_timeout);
        inner.consecutive_successes = 0;
        inner.half_open_in_flight = 0;
        inner.epoch += 1;
    }

    fn maybe_transition_to_half_open(&self, inner: &mut CircuitBreakerInner) {
        if inner.state == CircuitState::Open
            && let Some(next_attempt) = inner.next_attempt_at
            && Instant::now() >= next_attempt
        {
            tracing::info!(
                circuit = %self.name,
                "Circuit breaker transitioning to half-open state"
            );
            inner.state = CircuitState::HalfOpen;
            inner.consecutive_successes = 0;
            inner.half_open_in_flight = 0;
            inner.epoch += 1;
        }
    }
}

/// Process-wide map of provider name to breaker, created lazily.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    breakers: RwLock<HashMap<String, CircuitBreaker>>,
    default_config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            default_config,
        }
    }

    /// Returns the breaker for `name`, creating it with `config` (or the
    /// registry default) on first use. Later configs for an existing name are ignored.
    pub fn get_or_create(&self, name: &str, config: Option<CircuitBreakerConfig>) -> CircuitBreaker {
        {
            let breakers = self.breakers.read().unwrap_or_else(|poisoned| {
                tracing::warn!("Circuit breaker registry lock was poisoned, recovering");
                poisoned.into_inner()
            });
            if let Some(breaker) = breakers.get(name) {
                return breaker.clone();
            }
        }

        let mut breakers = self.breakers.write().unwrap_or_else(|poisoned| {
            tracing::warn!("Circuit breaker registry lock was poisoned, recovering");
            poisoned.into_inner()
        });
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(circuit = %name, "Creating circuit breaker");
                CircuitBreaker::new(name, config.unwrap_or_else(|| self.default_config.clone()))
            })
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<CircuitBreaker> {
        self.read().get(name).cloned()
    }

    /// Stats for every breaker, sorted by name.
    pub fn stats(&self) -> Vec<CircuitBreakerStats> {
        let breakers: Vec<CircuitBreaker> = self.read().values().cloned().collect();
        let mut stats: Vec<_> = breakers.iter().map(CircuitBreaker::stats).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Reset one breaker. Returns false if no breaker exists for `name`.
    pub fn reset(&self, name: &str) -> bool {
        match self.get(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn reset_all(&self) {
        let breakers: Vec<CircuitBreaker> = self.read().values().cloned().collect();
        for breaker in breakers {
            breaker.reset();
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, CircuitBreaker>> {
        self.breakers.read().unwrap_or_else(|poisoned| {
            tracing::warn!("Circuit breaker registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn network_error() -> AppError {
        AppError::NetworkError("connection refused".into())
    }

    #[test]
    fn test_circuit_starts_closed() {
        let cb = CircuitBreaker::new("test", CircuitBreakerConfig::default());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.stats().time_until_half_open.is_none());
    }

    #[test]
    fn test_circuit_opens_after_threshold_failures() {
        let cb = CircuitBreaker::new("test", CircuitBreakerConfig::default());

        for _ in 0..4 {
            cb.record_failure(&network_error());
        }
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure(&network_error());
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let cb = CircuitBreaker::new("test", CircuitBreakerConfig::default());

        for _ in 0..4 {
            cb.record_failure(&network_error());
        }
        cb.record_success();
        for _ in 0..4 {
            cb.record_failure(&network_error());
        }

        let stats = cb.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.consecutive_failures, 4);
        assert_eq!(stats.failures, 8);
    }

    #[test]
    fn test_circuit_transitions_to_half_open() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout: Duration::from_millis(10),
            ..Default::default()
        };
        let cb = CircuitBreaker::new("test", config);

        cb.record_failure(&network_error());
        assert_eq!(cb.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_closes_on_success() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 2,
            reset_timeout: Duration::from_millis(1),
            ..Default::default()
        };
        let cb = CircuitBreaker::new("test", config);

        cb.record_failure(&network_error());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);

        let stats = cb.stats();
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.consecutive_successes, 0);
        assert!(stats.last_error.is_none());
    }

    #[test]
    fn test_half_open_reopens_on_failure() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout: Duration::from_millis(1),
            ..Default::default()
        };
        let cb = CircuitBreaker::new("test", config);

        cb.record_failure(&network_error());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success();
        cb.record_failure(&network_error());
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_manual_reset() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout: Duration::from_secs(300),
            ..Default::default()
        };
        let cb = CircuitBreaker::new("test", config);

        cb.record_failure(&network_error());
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.stats().time_until_half_open.unwrap() > Duration::from_secs(290));

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.stats().failures, 0);
    }

    #[tokio::test]
    async fn test_call_rejects_without_invoking_when_open() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout: Duration::from_secs(60),
            ..Default::default()
        };
        let cb = CircuitBreaker::new("test", config);
        cb.record_failure(&network_error());

        let invoked = AtomicU32::new(0);
        let result = cb
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, AppError>("should not execute".to_string())
            })
            .await;

        assert!(matches!(result, Err(CircuitBreakerError::Open { .. })));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(cb.stats().rejected_calls, 1);
    }

    #[tokio::test]
    async fn test_call_executes_when_closed() {
        let cb = CircuitBreaker::new("test", CircuitBreakerConfig::default());

        let result = cb
            .call(|| async { Ok::<_, AppError>("success".to_string()) })
            .await;

        assert_eq!(result.unwrap(), "success");
        let stats = cb.stats();
        assert_eq!(stats.total_calls, 1);
        assert_eq!(stats.successes, 1);
        assert!(stats.last_success_at.is_some());
    }

    #[tokio::test]
    async fn test_call_ignores_non_tripping_errors() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        };
        let cb = CircuitBreaker::new("test", config);

        let result = cb
            .call(|| async {
                Err::<(), _>(AppError::RateLimitExceeded {
                    provider: "test".into(),
                })
            })
            .await;

        assert!(matches!(
            result,
            Err(CircuitBreakerError::Inner(AppError::RateLimitExceeded { .. }))
        ));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.stats().failures, 0);
    }

    #[tokio::test]
    async fn test_half_open_limits_concurrent_probes() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout: Duration::from_millis(1),
            half_open_max_calls: 1,
            ..Default::default()
        };
        let cb = CircuitBreaker::new("test", config);
        cb.record_failure(&network_error());
        tokio::time::sleep(Duration::from_millis(5)).await;

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let probe_cb = cb.clone();
        let probe = tokio::spawn(async move {
            probe_cb
                .call(|| async move {
                    let _ = release_rx.await;
                    Ok::<_, AppError>(())
                })
                .await
        });
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        let second = cb.call(|| async { Ok::<_, AppError>(()) }).await;
        assert!(matches!(second, Err(CircuitBreakerError::Open { .. })));

        release_tx.send(()).unwrap();
        assert!(probe.await.unwrap().is_ok());

        // Slot released; another probe is admitted and closes the circuit.
        assert!(cb.call(|| async { Ok::<_, AppError>(()) }).await.is_ok());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_call_admitted_before_trip_does_not_settle_half_open() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 1,
            reset_timeout: Duration::from_millis(20),
            half_open_max_calls: 1,
        };
        let cb = CircuitBreaker::new("test", config);

        // Admitted while closed, finishes after the breaker has reopened.
        let (slow_tx, slow_rx) = tokio::sync::oneshot::channel::<()>();
        let slow_cb = cb.clone();
        let slow = tokio::spawn(async move {
            slow_cb
                .call(|| async move {
                    let _ = slow_rx.await;
                    Ok::<_, AppError>(())
                })
                .await
        });
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        let tripped = cb.call(|| async { Err::<(), _>(network_error()) }).await;
        assert!(matches!(tripped, Err(CircuitBreakerError::Inner(_))));
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let (trial_tx, trial_rx) = tokio::sync::oneshot::channel::<()>();
        let trial_cb = cb.clone();
        let trial = tokio::spawn(async move {
            trial_cb
                .call(|| async move {
                    let _ = trial_rx.await;
                    Err::<(), _>(network_error())
                })
                .await
        });
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        slow_tx.send(()).unwrap();
        assert!(slow.await.unwrap().is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.stats().consecutive_successes, 0);

        // The trial still holds the only half-open slot.
        let extra = cb.call(|| async { Ok::<_, AppError>(()) }).await;
        assert!(matches!(extra, Err(CircuitBreakerError::Open { .. })));

        trial_tx.send(()).unwrap();
        assert!(trial.await.unwrap().is_err());
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_reset_discards_outcome_of_earlier_call() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        };
        let cb = CircuitBreaker::new("test", config);

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let pending_cb = cb.clone();
        let pending = tokio::spawn(async move {
            pending_cb
                .call(|| async move {
                    let _ = release_rx.await;
                    Err::<(), _>(network_error())
                })
                .await
        });
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        cb.reset();
        release_tx.send(()).unwrap();
        assert!(pending.await.unwrap().is_err());

        let stats = cb.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.consecutive_failures, 0);
        assert_eq!(stats.failures, 1);
    }

    #[test]
    fn test_open_error_converts_to_app_error() {
        let err: AppError = CircuitBreakerError::Open {
            name: "odds".into(),
            retry_after: Duration::from_millis(1500),
        }
        .into();
        assert!(matches!(err, AppError::CircuitOpen { .. }));
        assert!(err.to_string().contains("1500ms"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_registry_reuses_breakers() {
        let registry = CircuitBreakerRegistry::default();
        let a = registry.get_or_create("nba-cdn", None);
        a.record_failure(&network_error());

        let b = registry.get_or_create(
            "nba-cdn",
            Some(CircuitBreakerConfig {
                failure_threshold: 1,
                ..Default::default()
            }),
        );
        assert_eq!(b.stats().failures, 1);
        assert_eq!(b.config().failure_threshold, 5);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_stats_and_reset() {
        let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        });
        registry.get_or_create("odds", None).record_failure(&network_error());
        registry.get_or_create("espn", None);

        let stats = registry.stats();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].name, "espn");
        assert_eq!(stats[1].state, CircuitState::Open);

        assert!(registry.reset("odds"));
        assert!(!registry.reset("missing"));
        assert_eq!(registry.get("odds").unwrap().state(), CircuitState::Closed);

        registry.get_or_create("espn", None).record_failure(&network_error());
        registry.reset_all();
        assert!(registry.stats().iter().all(|s| s.state == CircuitState::Closed));
    }

    #[test]
    fn test_registry_concurrent_get_or_create() {
        let registry = Arc::new(CircuitBreakerRegistry::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry
                        .get_or_create("shared", None)
                        .record_failure(&AppError::NetworkError("x".into()));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("shared").unwrap().stats().failures, 8);
    }
}
