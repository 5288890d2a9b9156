//! Notifier: publishes a [`FileProcessedNotification`] after every
//! orchestrated event, with duplicate suppression, retry, and an optional
//! circuit breaker. Never fatal to the caller — a notification failure is
//! logged and counted, not propagated as an orchestration error.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;

use crate::backoff::Backoff;
use crate::config::NotificationConfig;
use crate::error::{FileHorizonError, FileHorizonResult};
use crate::idempotency::{notify_key, IdempotencyStore};
use crate::model::{FileProcessedNotification, ProcessingStatus};
use crate::sinks::MessageBus;
use crate::telemetry::Telemetry;

/// Consecutive-failure circuit breaker guarding the notifier's publish path.
/// Opens after `failure_threshold` consecutive failures, fails fast for
/// `reset_interval`, then allows one trial call (half-open).
struct CircuitBreaker {
    enabled: bool,
    failure_threshold: u32,
    reset_interval: Duration,
    consecutive_failures: AtomicU32,
    opened_at_millis: AtomicU64,
}

impl CircuitBreaker {
    fn new(config: &crate::config::CircuitBreakerConfig) -> Self {
        Self {
            enabled: config.enabled,
            failure_threshold: config.failure_threshold,
            reset_interval: Duration::from_millis(config.reset_interval_ms),
            consecutive_failures: AtomicU32::new(0),
            opened_at_millis: AtomicU64::new(0),
        }
    }

    fn is_open(&self) -> bool {
        if !self.enabled {
            return false;
        }
        let opened_at = self.opened_at_millis.load(Ordering::Relaxed);
        if opened_at == 0 {
            return false;
        }
        let now = Utc::now().timestamp_millis() as u64;
        if now.saturating_sub(opened_at) >= self.reset_interval.as_millis() as u64 {
            // Half-open: let the next call through as a trial.
            self.opened_at_millis.store(0, Ordering::Relaxed);
            return false;
        }
        true
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.opened_at_millis.store(0, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        if !self.enabled {
            return;
        }
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.failure_threshold {
            self.opened_at_millis
                .store(Utc::now().timestamp_millis() as u64, Ordering::Relaxed);
        }
    }
}

/// Publishes processing outcomes, guarded by duplicate suppression and a
/// circuit breaker over the underlying [`MessageBus`].
pub struct ProcessedFileNotifier {
    bus: std::sync::Arc<dyn MessageBus>,
    idempotency: std::sync::Arc<dyn IdempotencyStore>,
    destination: String,
    is_topic: bool,
    config: NotificationConfig,
    breaker: CircuitBreaker,
    telemetry: Telemetry,
}

impl ProcessedFileNotifier {
    pub fn new(
        bus: std::sync::Arc<dyn MessageBus>,
        idempotency: std::sync::Arc<dyn IdempotencyStore>,
        destination: impl Into<String>,
        is_topic: bool,
        config: NotificationConfig,
        telemetry: Telemetry,
    ) -> Self {
        let breaker = CircuitBreaker::new(&config.circuit_breaker);
        Self {
            bus,
            idempotency,
            destination: destination.into(),
            is_topic,
            config,
            breaker,
            telemetry,
        }
    }

    /// Publish a notification for a processed event. Always returns `Ok`
    /// from the orchestrator's point of view: failures are absorbed here.
    pub async fn notify(&self, notification: FileProcessedNotification) {
        if !self.config.enabled {
            self.telemetry.counter("notify.suppressed.disabled").incr();
            return;
        }

        let status = match notification.status {
            ProcessingStatus::Success => "success",
            ProcessingStatus::Failure => "failure",
        };
        let dedup_key = notify_key(&notification.idempotency_key, status);
        let ttl = Duration::from_secs(self.config.suppression_ttl_seconds);

        match self.idempotency.try_mark_processed(&dedup_key, ttl).await {
            Ok(false) => {
                self.telemetry.counter("notifications.suppressed").incr();
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "notifier idempotency check failed, publishing anyway");
            }
            Ok(true) => {}
        }

        if let Err(e) = self.publish_with_retry(&notification).await {
            tracing::warn!(error = %e, event = %notification.idempotency_key, "notification publish failed, dropping");
            self.telemetry.counter("notifications.failed").incr();
        } else {
            self.telemetry.counter("notifications.published").incr();
        }
    }

    async fn publish_with_retry(&self, notification: &FileProcessedNotification) -> FileHorizonResult<()> {
        if self.breaker.is_open() {
            return Err(FileHorizonError::CircuitOpen {
                resource: self.destination.clone(),
                retry_after_ms: self.config.circuit_breaker.reset_interval_ms,
            });
        }

        let envelope = serde_json::json!({
            "schemaVersion": 1,
            "protocol": notification.protocol.as_str(),
            "fullPath": notification.full_path,
            "sizeBytes": notification.size_bytes,
            "lastModifiedUtc": notification.last_modified_utc.timestamp_millis(),
            "status": match notification.status {
                ProcessingStatus::Success => "success",
                ProcessingStatus::Failure => "failure",
            },
            "processingDurationMs": notification.processing_duration_ms,
            "idempotencyKey": notification.idempotency_key,
            "correlationId": notification.correlation_id,
            "completedUtc": notification.completed_utc.timestamp_millis(),
            "destinations": notification.destinations,
        });
        let payload = serde_json::to_vec(&envelope)?;

        let mut backoff = Backoff::new(Duration::from_millis(200), Duration::from_secs(4));
        let max_attempts = 3;
        let mut last_err = None;

        for attempt in 0..max_attempts {
            let publish = self.bus.publish(
                &self.destination,
                &notification.idempotency_key,
                "application/json",
                &payload,
                self.is_topic,
            );
            let attempt_start = std::time::Instant::now();
            let outcome = tokio::time::timeout(Duration::from_millis(self.config.publish_timeout_ms), publish).await;
            crate::telemetry::record_duration(&self.telemetry.histogram("notify.publish.duration.ms"), attempt_start.elapsed());

            match outcome {
                Ok(Ok(())) => {
                    self.breaker.record_success();
                    return Ok(());
                }
                Ok(Err(e)) if e.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = backoff.register_failure();
                    tracing::warn!(error = %e, delay_ms = delay.as_millis() as u64, "notification publish failed, retrying");
                    tokio::time::sleep(backoff.jittered_delay()).await;
                    last_err = Some(e);
                }
                Ok(Err(e)) => {
                    self.breaker.record_failure();
                    return Err(e);
                }
                Err(_) => {
                    self.breaker.record_failure();
                    return Err(FileHorizonError::Timeout {
                        timeout_ms: self.config.publish_timeout_ms,
                    });
                }
            }
        }

        self.breaker.record_failure();
        Err(last_err.unwrap_or(FileHorizonError::Internal("notification publish exhausted retries".to_string())))
    }
}
