//! Pollers: per-source enumeration, readiness detection, identity-key
//! dedup, and exponential backoff on failure.

mod ftp;
mod local;
mod sftp;

pub use ftp::FtpPoller;
pub use local::LocalPoller;
pub use sftp::SftpPoller;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::FileHorizonResult;
use crate::model::{new_event_id, FileEvent, FileMetadata, FileObservationSnapshot};
use crate::queue::Queue;
use crate::readiness::{check_readiness, Readiness};
use crate::telemetry::Telemetry;

/// One discovered directory entry, as reported by a protocol-specific
/// enumeration step.
#[derive(Debug, Clone)]
pub struct DiscoveredEntry {
    pub identity_key: String,
    pub source_path: String,
    pub size_bytes: u64,
    pub last_modified_utc: chrono::DateTime<Utc>,
}

/// Per-source polling state: observation snapshots and the protocol this
/// source enumerates under. Owned exclusively by one poller instance — no
/// cross-instance sharing.
pub struct SourceState {
    pub name: String,
    pub protocol: crate::model::Protocol,
    pub delete_after_transfer: bool,
    pub stability_window: chrono::Duration,
    snapshots: Mutex<HashMap<String, FileObservationSnapshot>>,
    dispatched: Mutex<HashMap<String, (u64, chrono::DateTime<Utc>)>>,
}

impl SourceState {
    pub fn new(
        name: impl Into<String>,
        protocol: crate::model::Protocol,
        delete_after_transfer: bool,
        stability_window: chrono::Duration,
    ) -> Self {
        Self {
            name: name.into(),
            protocol,
            delete_after_transfer,
            stability_window,
            snapshots: Mutex::new(HashMap::new()),
            dispatched: Mutex::new(HashMap::new()),
        }
    }
}

/// A protocol-specific poller cycle: enumerate, apply readiness, enqueue.
#[async_trait]
pub trait PollerSource: Send + Sync {
    /// Enumerate entries for this poll cycle. Errors are treated as a
    /// connection/enumeration failure and trigger the caller's backoff.
    async fn enumerate(&self) -> FileHorizonResult<Vec<DiscoveredEntry>>;

    fn state(&self) -> &SourceState;
}

/// Run one poll cycle for a single source: enumerate, apply readiness per
/// entry, suppress duplicates, and enqueue ready events.
pub async fn run_cycle(
    source: &dyn PollerSource,
    queue: &dyn Queue,
    telemetry: &Telemetry,
) -> FileHorizonResult<()> {
    let span = telemetry.span("poll.remote.source");
    let _guard = span.enter();

    let start = std::time::Instant::now();
    let entries = source.enumerate().await?;
    let state = source.state();

    let mut snapshots = state.snapshots.lock().await;
    let mut dispatched = state.dispatched.lock().await;

    for entry in entries {
        let previous = snapshots.get(&entry.identity_key).cloned();
        let now = Utc::now();
        let (readiness, snapshot) = check_readiness(
            entry.size_bytes,
            entry.last_modified_utc,
            previous.as_ref(),
            state.stability_window,
            now,
        );
        snapshots.insert(entry.identity_key.clone(), snapshot);

        if readiness != Readiness::Ready {
            telemetry.counter("files.skipped.unstable").incr();
            continue;
        }

        let already_dispatched = dispatched
            .get(&entry.identity_key)
            .map(|(size, mtime)| *size == entry.size_bytes && *mtime == entry.last_modified_utc)
            .unwrap_or(false);
        if already_dispatched {
            continue;
        }

        let event = FileEvent {
            id: new_event_id(),
            correlation_id: new_event_id(),
            metadata: FileMetadata {
                source_path: entry.source_path.clone(),
                size_bytes: entry.size_bytes,
                last_modified_utc: entry.last_modified_utc,
                hash_algorithm: "none".to_string(),
                checksum: None,
            },
            discovered_at_utc: now,
            protocol: state.protocol,
            destination_path: String::new(),
            delete_after_transfer: state.delete_after_transfer,
        };

        queue.enqueue(event).await?;
        telemetry.counter("files.discovered").incr();
        dispatched.insert(entry.identity_key.clone(), (entry.size_bytes, entry.last_modified_utc));
    }

    telemetry.counter("poll_cycles").incr();
    crate::telemetry::record_duration(&telemetry.histogram("poll.cycle.duration.ms"), start.elapsed());
    Ok(())
}

/// Composite poller driving many sources through one cycle, each guarded by
/// its own backoff window.
pub struct CompositePoller {
    sources: Vec<(Arc<dyn PollerSource>, Mutex<crate::backoff::SourceBackoff>)>,
    telemetry: Telemetry,
}

impl CompositePoller {
    pub fn new(sources: Vec<Arc<dyn PollerSource>>, telemetry: Telemetry, base: Duration, cap: Duration) -> Self {
        let sources = sources
            .into_iter()
            .map(|s| (s, Mutex::new(crate::backoff::SourceBackoff::new(base, cap))))
            .collect();
        Self { sources, telemetry }
    }

    /// Run one cycle across every configured source.
    pub async fn run_cycle(&self, queue: &dyn Queue) {
        let span = self.telemetry.span("poll.remote.cycle");
        let _guard = span.enter();

        for (source, backoff) in &self.sources {
            let now = Utc::now();
            let mut backoff = backoff.lock().await;
            if backoff.is_backing_off(now) {
                tracing::debug!(source = %source.state().name, "source in backoff window, skipping");
                continue;
            }

            match run_cycle(source.as_ref(), queue, &self.telemetry).await {
                Ok(()) => backoff.reset(),
                Err(e) => {
                    tracing::warn!(source = %source.state().name, error = %e, "poll cycle failed");
                    self.telemetry.counter("poll.source.errors").incr();
                    backoff.register_failure(now);
                }
            }
        }
    }
}
