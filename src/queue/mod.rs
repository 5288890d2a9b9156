//! Distributed work queue abstraction: `Enqueue` / `Drain` / `Iterate` /
//! `Acknowledge` over a stream of [`FileEvent`]s, with an in-memory backend
//! for tests and single-process deployments and a Redis Streams backend for
//! consumer-group delivery across replicas.

mod memory;
mod stream;

pub use memory::InMemoryQueue;
pub use stream::{RedisStreamConfig, RedisStreamQueue};

use async_trait::async_trait;

use crate::error::FileHorizonResult;
use crate::model::FileEvent;
use crate::validation::validate_event;

/// Opaque handle identifying a delivered entry, passed back to
/// [`Queue::acknowledge`] once processing completes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryId(pub String);

/// A delivered event paired with the entry id needed to acknowledge it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub entry_id: EntryId,
    pub event: FileEvent,
}

/// The queue abstraction every backend implements.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Validate and append an event. Structural validation happens before
    /// any I/O, so a malformed event never reaches the backend.
    async fn enqueue(&self, event: FileEvent) -> FileHorizonResult<()>;

    /// Return up to `max_batch` pending deliveries for this consumer,
    /// non-blocking.
    async fn drain(&self, max_batch: usize) -> FileHorizonResult<Vec<Delivery>>;

    /// Acknowledge successful processing of a delivered entry.
    async fn acknowledge(&self, entry_id: &EntryId) -> FileHorizonResult<()>;
}

/// Shared enqueue-time validation every backend calls before touching I/O.
pub(crate) fn validate_before_enqueue(event: &FileEvent) -> FileHorizonResult<()> {
    validate_event(event)
}
