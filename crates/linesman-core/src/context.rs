//! Shared ingestion state: the breaker registry and the metrics service.
//!
//! Built once at startup and handed to the orchestrator. Background work
//! (the metrics sweep) is started explicitly and stopped by [`IngestionContext::shutdown`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerRegistry};
use crate::metrics::{DataQualityMetricsService, MetricsConfig};

/// Default interval between metrics sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

struct SweepTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct IngestionContext {
    breakers: Arc<CircuitBreakerRegistry>,
    metrics: Arc<DataQualityMetricsService>,
    sweep: Mutex<Option<SweepTask>>,
}

impl Default for IngestionContext {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default(), MetricsConfig::default())
    }
}

impl IngestionContext {
    pub fn new(breaker_defaults: CircuitBreakerConfig, metrics: MetricsConfig) -> Self {
        Self {
            breakers: Arc::new(CircuitBreakerRegistry::new(breaker_defaults)),
            metrics: Arc::new(DataQualityMetricsService::new(metrics)),
            sweep: Mutex::new(None),
        }
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn metrics(&self) -> &Arc<DataQualityMetricsService> {
        &self.metrics
    }

    /// Spawn the periodic metrics sweep. Returns false if one is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_metrics_sweep(&self, interval: Duration) -> bool {
        let mut sweep = self.sweep.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Sweep mutex was poisoned, recovering");
            poisoned.into_inner()
        });
        if sweep.is_some() {
            return false;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let metrics = Arc::clone(&self.metrics);

        let handle = tokio::spawn(async move {
            tracing::debug!(interval_ms = interval.as_millis() as u64, "Metrics sweep started");
            loop {
                tokio::select! {
                    () = tokio::time::sleep(interval) => {
                        metrics.sweep_expired();
                    }
                    () = token.cancelled() => break,
                }
            }
            tracing::debug!("Metrics sweep stopped");
        });

        *sweep = Some(SweepTask { cancel, handle });
        true
    }

    pub fn sweep_running(&self) -> bool {
        self.sweep
            .lock()
            .map(|s| s.is_some())
            .unwrap_or_else(|poisoned| poisoned.into_inner().is_some())
    }

    /// Stop background work and wait for it to finish.
    pub async fn shutdown(&self) {
        let task = {
            let mut sweep = self.sweep.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            sweep.take()
        };
        if let Some(task) = task {
            task.cancel.cancel();
            if let Err(e) = task.handle.await {
                tracing::warn!(error = %e, "Metrics sweep task ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sweep_evicts_expired_and_stops_on_shutdown() {
        let context = IngestionContext::new(
            CircuitBreakerConfig::default(),
            MetricsConfig {
                window: Duration::from_millis(10),
                ..Default::default()
            },
        );
        context.metrics().record_validation("nba-cdn", true, Duration::from_millis(1));

        assert!(context.start_metrics_sweep(Duration::from_millis(15)));
        assert!(!context.start_metrics_sweep(Duration::from_millis(15)));
        assert!(context.sweep_running());

        tokio::time::sleep(Duration::from_millis(60)).await;
        // Swept by the background task, so nothing left to evict here.
        assert_eq!(context.metrics().sweep_expired(), 0);

        context.shutdown().await;
        assert!(!context.sweep_running());
        context.shutdown().await;
    }

    #[test]
    fn test_shared_registry() {
        let context = IngestionContext::default();
        context.breakers().get_or_create("odds", None);
        assert_eq!(context.breakers().len(), 1);
    }
}
