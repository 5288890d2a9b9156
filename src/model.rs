//! Core data model: the immutable envelopes that flow between pollers,
//! the queue, and the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FileHorizonError, FileHorizonResult};

/// Protocol a [`FileEvent`] or [`FileReference`] originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Local,
    Ftp,
    Sftp,
    Synthetic,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Local => "local",
            Protocol::Ftp => "ftp",
            Protocol::Sftp => "sftp",
            Protocol::Synthetic => "synthetic",
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = FileHorizonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Protocol::Local),
            "ftp" => Ok(Protocol::Ftp),
            "sftp" => Ok(Protocol::Sftp),
            "synthetic" => Ok(Protocol::Synthetic),
            other => Err(FileHorizonError::Validation {
                field: "protocol".to_string(),
                reason: format!("unknown protocol: {other}"),
            }),
        }
    }
}

/// Immutable, authoritative description of a discovered file.
///
/// Size and modification time are authoritative for equality under the
/// enhanced-idempotency-key design (see the idempotency store).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub source_path: String,
    pub size_bytes: u64,
    pub last_modified_utc: DateTime<Utc>,
    pub hash_algorithm: String,
    pub checksum: Option<String>,
}

impl FileMetadata {
    pub fn validate(&self) -> FileHorizonResult<()> {
        if self.source_path.is_empty() {
            return Err(FileHorizonError::Validation {
                field: "source_path".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Addressing tuple decoupling readers/sinks from the event envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    pub scheme: Protocol,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: String,
    pub source_name: Option<String>,
}

/// Envelope describing a discovered, ready-to-transfer file.
///
/// Created by a poller, consumed once by the orchestrator, then either
/// acknowledged on the queue after success, or re-delivered after a claim
/// timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEvent {
    pub id: String,
    /// ULID distinct from `id`, threaded through every tracing span and the
    /// notification payload so a file's journey can be correlated across
    /// components.
    pub correlation_id: String,
    pub metadata: FileMetadata,
    pub discovered_at_utc: DateTime<Utc>,
    pub protocol: Protocol,
    pub destination_path: String,
    pub delete_after_transfer: bool,
}

impl FileEvent {
    pub fn validate(&self) -> FileHorizonResult<()> {
        if self.id.is_empty() {
            return Err(FileHorizonError::Validation {
                field: "id".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        self.metadata.validate()?;
        Ok(())
    }

    /// Canonical identity key: `{protocol}://{host}:{port}{normalizedPath}`.
    /// Local files use `local://_:/normalized/path`. Same-file re-observations
    /// across poll cycles collapse to one key.
    pub fn identity_key(&self) -> String {
        identity_key(self.protocol, None, None, &self.metadata.source_path)
    }
}

/// Build the canonical identity key for a source location.
pub fn identity_key(protocol: Protocol, host: Option<&str>, port: Option<u16>, path: &str) -> String {
    let normalized = path.replace('\\', "/");
    match protocol {
        Protocol::Local | Protocol::Synthetic => {
            format!("{}://_:/{}", protocol.as_str(), normalized.trim_start_matches('/'))
        }
        Protocol::Ftp | Protocol::Sftp => {
            let host = host.unwrap_or("_");
            let port = port.unwrap_or(0);
            format!("{}://{}:{}{}", protocol.as_str(), host, port, normalized)
        }
    }
}

/// Per-identity-key observation state, mutated only by the owning poller.
/// Serves the readiness state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct FileObservationSnapshot {
    pub size: u64,
    pub last_write_utc: DateTime<Utc>,
    pub first_observed_utc: DateTime<Utc>,
    pub last_observed_utc: DateTime<Utc>,
}

/// Destination kind, resolved from a routing rule's destination name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DestinationKind {
    Local,
    Sftp,
    MessageBus,
}

/// Write options carried by a resolved destination plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationOptions {
    pub overwrite: bool,
    pub compute_hash: bool,
    pub rename_pattern: Option<String>,
}

/// Immutable result of routing a [`FileEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationPlan {
    pub destination_name: String,
    pub target_path: String,
    pub options: DestinationOptions,
    pub kind: DestinationKind,
    pub is_topic: Option<bool>,
}

/// A single routing rule: `{name, matchOn, destinations, renamePattern?, overwrite?}`.
/// Evaluated top-to-bottom; first match wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub name: String,
    pub protocol: Option<Protocol>,
    pub path_glob: Option<String>,
    pub path_regex: Option<String>,
    pub source_name: Option<String>,
    pub destinations: Vec<String>,
    pub rename_pattern: Option<String>,
    pub overwrite: bool,
}

/// Outcome of `TryMarkProcessed`; used internally by idempotency backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdempotencyRecord {
    pub marked: bool,
}

/// Outcome recorded for a processed (or failed) `FileEvent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingStatus {
    Success,
    Failure,
}

/// Structured notification describing the outcome of processing one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileProcessedNotification {
    pub protocol: Protocol,
    pub full_path: String,
    pub size_bytes: u64,
    pub last_modified_utc: DateTime<Utc>,
    pub status: ProcessingStatus,
    pub processing_duration_ms: u64,
    pub idempotency_key: String,
    pub correlation_id: String,
    pub completed_utc: DateTime<Utc>,
    pub destinations: Vec<String>,
}

/// Generate a new event id. The spec allows ULID or UUID; we use UUID v4,
/// matching the teacher's identifier convention throughout the mesh layer.
pub fn new_event_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> FileMetadata {
        FileMetadata {
            source_path: "/tmp/in/a.txt".to_string(),
            size_bytes: 5,
            last_modified_utc: Utc::now(),
            hash_algorithm: "none".to_string(),
            checksum: None,
        }
    }

    #[test]
    fn identity_key_is_stable_across_observations() {
        let a = identity_key(Protocol::Local, None, None, "/tmp/in/a.txt");
        let b = identity_key(Protocol::Local, None, None, "/tmp/in/a.txt");
        assert_eq!(a, b);
        assert_eq!(a, "local://_:/tmp/in/a.txt");
    }

    #[test]
    fn remote_identity_key_includes_host_and_port() {
        let key = identity_key(Protocol::Sftp, Some("ftp.example.com"), Some(22), "/in/a.txt");
        assert_eq!(key, "sftp://ftp.example.com:22/in/a.txt");
    }

    #[test]
    fn rejects_empty_source_path() {
        let mut metadata = sample_metadata();
        metadata.source_path.clear();
        assert!(metadata.validate().is_err());
    }

    #[test]
    fn event_validation_rejects_empty_id() {
        let event = FileEvent {
            id: String::new(),
            correlation_id: "corr-1".to_string(),
            metadata: sample_metadata(),
            discovered_at_utc: Utc::now(),
            protocol: Protocol::Local,
            destination_path: String::new(),
            delete_after_transfer: false,
        };
        assert!(event.validate().is_err());
    }
}
