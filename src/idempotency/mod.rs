//! Idempotency store: atomic "mark processed" with TTL, backing the
//! exactly-once-ish orchestrator gate and the notifier's duplicate
//! suppression.

mod memory;
mod redis_store;

pub use memory::InMemoryIdempotencyStore;
pub use redis_store::RedisIdempotencyStore;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::FileHorizonResult;

/// `TryMarkProcessed(key, ttl) -> bool`: atomic compare-and-set. Returns
/// `true` only on the winning call for `key` within its TTL.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn try_mark_processed(&self, key: &str, ttl: Duration) -> FileHorizonResult<bool>;
}

/// Canonical Phase-1 idempotency key for an event id.
pub fn event_key(event_id: &str) -> String {
    format!("file:{event_id}")
}

/// Notifier de-duplication key: `notify:{idempotencyKey}:{status}`.
pub fn notify_key(idempotency_key: &str, status: &str) -> String {
    format!("notify:{idempotency_key}:{status}")
}
