//! In-memory idempotency store: atomic add to a concurrent map, for tests
//! and single-node deployments.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::IdempotencyStore;
use crate::error::FileHorizonResult;

pub struct InMemoryIdempotencyStore {
    marks: DashMap<String, Instant>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self {
            marks: DashMap::new(),
        }
    }

    fn is_expired(&self, key: &str) -> bool {
        self.marks
            .get(key)
            .map(|expiry| Instant::now() >= *expiry)
            .unwrap_or(true)
    }
}

impl Default for InMemoryIdempotencyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn try_mark_processed(&self, key: &str, ttl: Duration) -> FileHorizonResult<bool> {
        if self.is_expired(key) {
            self.marks.remove(key);
        }
        let expiry = Instant::now() + ttl;
        match self.marks.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(false),
            dashmap::mapref::entry::Entry::Vacant(e) => {
                e.insert(expiry);
                Ok(true)
            }
        }
    }
}
