//! Background drivers: the polling loop and the processing loop, spawned
//! independently according to [`Role`] so poller and worker replicas can
//! scale separately.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{PollingConfig, Role};
use crate::orchestrator::Orchestrator;
use crate::pollers::CompositePoller;
use crate::queue::Queue;
use crate::telemetry::Telemetry;

/// Runs the polling loop on a fixed cadence. An overrunning cycle logs a
/// warning and starts the next cycle immediately rather than piling up.
pub struct PollingLoop {
    poller: Arc<CompositePoller>,
    queue: Arc<dyn Queue>,
    interval: Duration,
}

impl PollingLoop {
    pub fn new(poller: Arc<CompositePoller>, queue: Arc<dyn Queue>, config: &PollingConfig) -> Self {
        Self {
            poller,
            queue,
            interval: Duration::from_millis(config.interval_ms),
        }
    }

    pub async fn run(self) {
        loop {
            let cycle_start = tokio::time::Instant::now();
            self.poller.run_cycle(self.queue.as_ref()).await;
            let elapsed = cycle_start.elapsed();

            if elapsed >= self.interval {
                tracing::warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    interval_ms = self.interval.as_millis() as u64,
                    "poll cycle overran its interval, starting next cycle immediately"
                );
                continue;
            }
            tokio::time::sleep(self.interval - elapsed).await;
        }
    }
}

/// Runs the processing loop: drain the queue, hand each delivery to the
/// orchestrator, and acknowledge on success. Backs off adaptively when the
/// queue is empty, doubling up to 500ms and resetting on any work.
pub struct ProcessingLoop {
    orchestrator: Arc<Orchestrator>,
    queue: Arc<dyn Queue>,
    batch_limit: usize,
    telemetry: Telemetry,
}

const MAX_IDLE_BACKOFF: Duration = Duration::from_millis(500);
const MIN_IDLE_BACKOFF: Duration = Duration::from_millis(10);

impl ProcessingLoop {
    pub fn new(orchestrator: Arc<Orchestrator>, queue: Arc<dyn Queue>, batch_limit: usize, telemetry: Telemetry) -> Self {
        Self {
            orchestrator,
            queue,
            batch_limit,
            telemetry,
        }
    }

    pub async fn run(self) {
        let mut idle_backoff = MIN_IDLE_BACKOFF;

        loop {
            let deliveries = match self.queue.drain(self.batch_limit).await {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(error = %e, "queue drain failed, backing off");
                    tokio::time::sleep(idle_backoff).await;
                    idle_backoff = (idle_backoff * 2).min(MAX_IDLE_BACKOFF);
                    continue;
                }
            };

            if deliveries.is_empty() {
                tokio::time::sleep(idle_backoff).await;
                idle_backoff = (idle_backoff * 2).min(MAX_IDLE_BACKOFF);
                continue;
            }
            idle_backoff = MIN_IDLE_BACKOFF;

            for delivery in deliveries {
                match self.orchestrator.process(delivery.event.clone()).await {
                    Ok(()) => {
                        if let Err(e) = self.queue.acknowledge(&delivery.entry_id).await {
                            tracing::warn!(error = %e, event_id = %delivery.event.id, "acknowledge failed");
                        }
                    }
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            event_id = %delivery.event.id,
                            "event processing failed, leaving unacknowledged for redelivery"
                        );
                        self.telemetry.counter("processing.failed").incr();
                    }
                }
            }
        }
    }
}

/// Spawn the loops appropriate for the configured [`Role`], returning their
/// join handles so the embedder can await or abort them.
pub fn spawn(
    role: Role,
    poller: Option<Arc<CompositePoller>>,
    orchestrator: Option<Arc<Orchestrator>>,
    queue: Arc<dyn Queue>,
    polling_config: &PollingConfig,
    telemetry: Telemetry,
) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = Vec::new();

    if matches!(role, Role::Poller | Role::All) {
        let poller = poller.expect("Role::Poller/All requires a CompositePoller");
        let polling_loop = PollingLoop::new(poller, queue.clone(), polling_config);
        handles.push(tokio::spawn(polling_loop.run()));
    }

    if matches!(role, Role::Worker | Role::All) {
        let orchestrator = orchestrator.expect("Role::Worker/All requires an Orchestrator");
        let processing_loop = ProcessingLoop::new(orchestrator, queue, polling_config.batch_read_limit, telemetry);
        handles.push(tokio::spawn(processing_loop.run()));
    }

    handles
}
