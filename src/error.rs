//! Unified Error Handling System
//!
//! A single tagged error type for every FileHorizon component, following
//! the error taxonomy from the component design: Validation, File,
//! Network/Transient, Auth, Queue, Idempotency, and an Unspecified catch-all.
//! Exceptions/library errors are translated into this taxonomy at component
//! boundaries (readers, sinks, publishers) and never leak past them.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for all FileHorizon operations.
#[derive(Error, Debug)]
pub enum FileHorizonError {
    // Validation errors — non-retriable, surfaced and (for queued events)
    // acknowledged to avoid a poison loop.
    #[error("validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("unknown destination: {name}")]
    UnknownDestination { name: String },

    #[error("no routing rule matched event {event_id}")]
    NoRuleMatched { event_id: String },

    #[error("scheme mismatch: reader for {expected} given {actual}")]
    SchemeMismatch { expected: String, actual: String },

    // File errors
    #[error("file not found: {path}")]
    FileNotFound { path: String },

    #[error("file size unstable: {path}")]
    SizeUnstable { path: String },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        source: io::Error,
        path: Option<PathBuf>,
    },

    // Network / transient errors
    #[error("connection failed to {host}:{port}: {reason}")]
    NetworkConnection {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("transient error: {0}")]
    Transient(String),

    // Auth errors
    #[error("authentication failed for source {source}: {reason}")]
    Authentication { source: String, reason: String },

    #[error("secret resolution failed for {secret_ref}")]
    SecretResolution { secret_ref: String },

    // Queue errors
    #[error("enqueue rejected: {reason}")]
    EnqueueRejected { reason: String },

    #[error("dequeue read error: {0}")]
    DequeueError(String),

    #[error("consumer group error: {0}")]
    ConsumerGroup(String),

    // Idempotency / store errors
    #[error("idempotency store error: {0}")]
    IdempotencyStore(String),

    // Serialization / wire errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Configuration errors
    #[error("configuration error: {field} - {message}")]
    Configuration { field: String, message: String },

    // Notifier circuit breaker
    #[error("circuit breaker open for {resource}, retry after {retry_after_ms}ms")]
    CircuitOpen {
        resource: String,
        retry_after_ms: u64,
    },

    // Catch-all
    #[error("internal error: {0}")]
    Internal(String),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

/// Result type alias for FileHorizon operations.
pub type FileHorizonResult<T> = Result<T, FileHorizonError>;

/// Error category for grouping related errors (used to decide retry policy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    FileSystem,
    Network,
    Auth,
    Queue,
    Idempotency,
    Configuration,
    Internal,
}

impl FileHorizonError {
    /// Get the category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            FileHorizonError::Validation { .. }
            | FileHorizonError::UnknownDestination { .. }
            | FileHorizonError::NoRuleMatched { .. }
            | FileHorizonError::SchemeMismatch { .. } => ErrorCategory::Validation,

            FileHorizonError::FileNotFound { .. }
            | FileHorizonError::SizeUnstable { .. }
            | FileHorizonError::Io { .. } => ErrorCategory::FileSystem,

            FileHorizonError::NetworkConnection { .. }
            | FileHorizonError::Timeout { .. }
            | FileHorizonError::Transient(_) => ErrorCategory::Network,

            FileHorizonError::Authentication { .. }
            | FileHorizonError::SecretResolution { .. } => ErrorCategory::Auth,

            FileHorizonError::EnqueueRejected { .. }
            | FileHorizonError::DequeueError(_)
            | FileHorizonError::ConsumerGroup(_) => ErrorCategory::Queue,

            FileHorizonError::IdempotencyStore(_) => ErrorCategory::Idempotency,

            FileHorizonError::Configuration { .. } => ErrorCategory::Configuration,

            _ => ErrorCategory::Internal,
        }
    }

    /// Is this error worth retrying at the layer that produced it?
    ///
    /// `FileNotFound` is explicitly excluded per the component design (§7):
    /// retrying a missing file wastes a cycle for no benefit. Idempotency
    /// store errors are retryable by convention — treating a store failure
    /// as "not marked" means reprocessing rather than a silent drop.
    pub fn is_retryable(&self) -> bool {
        match self {
            FileHorizonError::FileNotFound { .. } => false,
            FileHorizonError::SizeUnstable { .. } | FileHorizonError::Io { .. } => true,

            FileHorizonError::NetworkConnection { .. }
            | FileHorizonError::Timeout { .. }
            | FileHorizonError::Transient(_) => true,

            FileHorizonError::EnqueueRejected { .. }
            | FileHorizonError::DequeueError(_)
            | FileHorizonError::ConsumerGroup(_) => true,

            FileHorizonError::IdempotencyStore(_) => true,
            FileHorizonError::CircuitOpen { .. } => true,

            FileHorizonError::Validation { .. }
            | FileHorizonError::UnknownDestination { .. }
            | FileHorizonError::NoRuleMatched { .. }
            | FileHorizonError::SchemeMismatch { .. }
            | FileHorizonError::Authentication { .. }
            | FileHorizonError::SecretResolution { .. }
            | FileHorizonError::Configuration { .. }
            | FileHorizonError::Serialization(_)
            | FileHorizonError::Internal(_)
            | FileHorizonError::Unexpected(_) => false,
        }
    }
}

/// Extension trait for tagging lower-level errors with FileHorizon context
/// at component boundaries (e.g. wrapping `io::Error` when a reader opens a
/// file, or a `redis::RedisError` when the queue backend talks to the
/// broker).
pub trait ErrorContext<T> {
    fn with_context<F>(self, f: F) -> FileHorizonResult<T>
    where
        F: FnOnce() -> String;
}

impl<T> ErrorContext<T> for Result<T, io::Error> {
    fn with_context<F>(self, f: F) -> FileHorizonResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| FileHorizonError::Internal(format!("{}: {}", f(), e)))
    }
}
