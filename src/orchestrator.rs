//! Orchestrator: the per-event pipeline the processing loop drives.
//!
//! Nine steps under one root span (`file.orchestrate`): idempotency gate,
//! route, select the first matched plan, resolve the destination, select a
//! reader, open the source stream, invoke the sink, best-effort delete the
//! source, and always notify. Fan-out across multiple matched destinations
//! is intentionally not implemented — only the first plan is processed; see
//! the design notes for why this mismatch against the richer routing model
//! is left as-is rather than silently "fixed".

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::config::DestinationsConfig;
use crate::error::{FileHorizonError, FileHorizonResult};
use crate::idempotency::{event_key, IdempotencyStore};
use crate::model::{FileEvent, FileProcessedNotification, FileReference, Protocol, ProcessingStatus};
use crate::notifier::ProcessedFileNotifier;
use crate::readers::Reader;
use crate::router::{route, CompiledRule};
use crate::sinks::Sink;
use crate::telemetry::Telemetry;

/// Drives one [`FileEvent`] from the queue through routing, transfer, and
/// notification.
pub struct Orchestrator {
    readers: HashMap<Protocol, Arc<dyn Reader>>,
    sinks: HashMap<String, Arc<dyn Sink>>,
    rules: Vec<CompiledRule>,
    destinations: DestinationsConfig,
    idempotency: Arc<dyn IdempotencyStore>,
    idempotency_ttl: Duration,
    notifier: Arc<ProcessedFileNotifier>,
    telemetry: Telemetry,
}

impl Orchestrator {
    pub fn new(
        readers: HashMap<Protocol, Arc<dyn Reader>>,
        sinks: HashMap<String, Arc<dyn Sink>>,
        rules: Vec<CompiledRule>,
        destinations: DestinationsConfig,
        idempotency: Arc<dyn IdempotencyStore>,
        idempotency_ttl: Duration,
        notifier: Arc<ProcessedFileNotifier>,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            readers,
            sinks,
            rules,
            destinations,
            idempotency,
            idempotency_ttl,
            notifier,
            telemetry,
        }
    }

    /// Process one event to completion. Returns `Err` only for failures the
    /// caller should leave unacknowledged for redelivery; everything else
    /// (duplicate suppression, validation rejection) is `Ok(())`.
    pub async fn process(&self, event: FileEvent) -> FileHorizonResult<()> {
        let span = self.telemetry.span("file.orchestrate");
        let _guard = span.enter();
        let start = Instant::now();

        event.validate()?;

        // Step 1: idempotency gate.
        let key = event_key(&event.id);
        let first_time = self.idempotency.try_mark_processed(&key, self.idempotency_ttl).await?;
        if !first_time {
            self.telemetry.counter("orchestrate.duplicate").incr();
            tracing::debug!(event_id = %event.id, "event already processed, skipping");
            return Ok(());
        }

        let outcome = self.transfer(&event).await;

        let status = if outcome.is_ok() {
            ProcessingStatus::Success
        } else {
            ProcessingStatus::Failure
        };
        let destination_name = outcome
            .as_ref()
            .map(|name: &String| vec![name.clone()])
            .unwrap_or_default();

        self.notifier
            .notify(FileProcessedNotification {
                protocol: event.protocol,
                full_path: event.metadata.source_path.clone(),
                size_bytes: event.metadata.size_bytes,
                last_modified_utc: event.metadata.last_modified_utc,
                status,
                processing_duration_ms: start.elapsed().as_millis() as u64,
                idempotency_key: key,
                correlation_id: event.correlation_id.clone(),
                completed_utc: Utc::now(),
                destinations: destination_name,
            })
            .await;

        crate::telemetry::record_duration(&self.telemetry.histogram("processing.duration.ms"), start.elapsed());

        match outcome {
            Ok(_) => {
                self.telemetry.counter("files.processed").incr();
                Ok(())
            }
            Err(e) => {
                self.telemetry.counter("files.failed").incr();
                Err(e)
            }
        }
    }

    /// Steps 2-8: route, read, write, and best-effort delete. Returns the
    /// destination name written to, for the notification payload.
    async fn transfer(&self, event: &FileEvent) -> FileHorizonResult<String> {
        // Step 2 + 3: route, take the first matched plan.
        let plans = route(event, &self.rules, &self.destinations)?;
        let plan = plans
            .into_iter()
            .next()
            .ok_or_else(|| FileHorizonError::NoRuleMatched {
                event_id: event.id.clone(),
            })?;

        // Step 4 is implicit: `plan.kind` already carries the resolved
        // destination kind from routing.

        // Step 5: select reader.
        let reader = self
            .readers
            .get(&event.protocol)
            .ok_or_else(|| FileHorizonError::SchemeMismatch {
                expected: "a configured reader".to_string(),
                actual: event.protocol.as_str().to_string(),
            })?;

        let reference = FileReference {
            scheme: event.protocol,
            host: None,
            port: None,
            path: event.metadata.source_path.clone(),
            source_name: None,
        };

        // Step 6: open the source stream.
        let stream = {
            let span = self.telemetry.span("reader.open");
            let _guard = span.enter();
            reader.open_read(&reference).await?
        };

        // Step 7: invoke the sink.
        let sink = self
            .sinks
            .get(&plan.destination_name)
            .ok_or_else(|| FileHorizonError::UnknownDestination {
                name: plan.destination_name.clone(),
            })?;

        let bytes_written = {
            let span = self.telemetry.span("sink.write");
            let _guard = span.enter();
            sink.write(&plan.target_path, stream, &plan.options).await?
        };
        self.telemetry.histogram("transfer.bytes").record(bytes_written as f64);
        self.telemetry.counter("bytes.copied").incr_by(bytes_written);

        // Step 8: best-effort source deletion. Only supported for local
        // sources today; remote deletion is not part of any reader's
        // capability surface.
        if event.delete_after_transfer && event.protocol == Protocol::Local {
            if let Err(e) = tokio::fs::remove_file(&event.metadata.source_path).await {
                tracing::warn!(
                    path = %event.metadata.source_path,
                    error = %e,
                    "best-effort source deletion failed"
                );
                self.telemetry.counter("delete.failed").incr();
            }
        }

        Ok(plan.destination_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BusDestinationConfig, DestinationsConfig, LocalDestinationConfig, NotificationConfig};
    use crate::idempotency::InMemoryIdempotencyStore;
    use crate::model::{FileMetadata, RoutingRule};
    use crate::sinks::LocalSink;
    use async_trait::async_trait;

    struct NoopBus;

    #[async_trait]
    impl crate::sinks::MessageBus for NoopBus {
        async fn publish(
            &self,
            _destination: &str,
            _subject: &str,
            _content_type: &str,
            _payload: &[u8],
            _is_topic: bool,
        ) -> FileHorizonResult<()> {
            Ok(())
        }
    }

    fn sample_event(dir: &std::path::Path) -> FileEvent {
        let path = dir.join("a.txt");
        std::fs::write(&path, b"hello").unwrap();
        FileEvent {
            id: "evt-1".to_string(),
            correlation_id: "corr-1".to_string(),
            metadata: FileMetadata {
                source_path: path.to_string_lossy().to_string(),
                size_bytes: 5,
                last_modified_utc: Utc::now(),
                hash_algorithm: "none".to_string(),
                checksum: None,
            },
            discovered_at_utc: Utc::now(),
            protocol: Protocol::Local,
            destination_path: String::new(),
            delete_after_transfer: false,
        }
    }

    fn build_orchestrator(out_dir: &std::path::Path) -> Orchestrator {
        let mut readers: HashMap<Protocol, Arc<dyn Reader>> = HashMap::new();
        readers.insert(Protocol::Local, Arc::new(crate::readers::LocalReader::new()));

        let mut sinks: HashMap<String, Arc<dyn Sink>> = HashMap::new();
        sinks.insert(
            "OutboxA".to_string(),
            Arc::new(LocalSink::new(out_dir.to_string_lossy().to_string())),
        );

        let rule = CompiledRule::compile(RoutingRule {
            name: "all-local".to_string(),
            protocol: Some(Protocol::Local),
            path_glob: None,
            path_regex: None,
            source_name: None,
            destinations: vec!["OutboxA".to_string()],
            rename_pattern: None,
            overwrite: true,
        })
        .unwrap();

        let destinations = DestinationsConfig {
            local: vec![LocalDestinationConfig {
                name: "OutboxA".to_string(),
                root_path: out_dir.to_string_lossy().to_string(),
            }],
            sftp: vec![],
            bus: vec![BusDestinationConfig {
                name: "events".to_string(),
                topic: "events".to_string(),
                is_topic: true,
            }],
        };

        let idempotency = Arc::new(InMemoryIdempotencyStore::new());
        let notifier = Arc::new(ProcessedFileNotifier::new(
            Arc::new(NoopBus),
            idempotency.clone(),
            "events",
            true,
            NotificationConfig::default(),
            Telemetry::default(),
        ));

        Orchestrator::new(
            readers,
            sinks,
            vec![rule],
            destinations,
            idempotency,
            Duration::from_secs(86400),
            notifier,
            Telemetry::default(),
        )
    }

    #[tokio::test]
    async fn processes_event_and_writes_to_destination() {
        let in_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let event = sample_event(in_dir.path());
        let orchestrator = build_orchestrator(out_dir.path());

        orchestrator.process(event).await.unwrap();

        assert!(out_dir.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn duplicate_event_is_processed_once() {
        let in_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let event = sample_event(in_dir.path());
        let orchestrator = build_orchestrator(out_dir.path());

        orchestrator.process(event.clone()).await.unwrap();
        std::fs::remove_file(out_dir.path().join("a.txt")).unwrap();
        orchestrator.process(event).await.unwrap();

        assert!(!out_dir.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn missing_source_file_is_an_error() {
        let in_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let mut event = sample_event(in_dir.path());
        std::fs::remove_file(&event.metadata.source_path).unwrap();
        event.id = "evt-missing".to_string();
        let orchestrator = build_orchestrator(out_dir.path());

        let result = orchestrator.process(event).await;
        assert!(matches!(result, Err(FileHorizonError::FileNotFound { .. })));
    }
}
