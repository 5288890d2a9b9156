//! Distributed idempotency store: `SET key 1 NX EX <ttl>` against the
//! shared Redis instance. Store errors are treated conservatively — return
//! `false` so the caller reprocesses rather than silently drops the event.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::IdempotencyStore;
use crate::error::{FileHorizonError, FileHorizonResult};

pub struct RedisIdempotencyStore {
    conn: ConnectionManager,
}

impl RedisIdempotencyStore {
    pub async fn connect(redis_url: &str) -> FileHorizonResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| FileHorizonError::IdempotencyStore(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| FileHorizonError::IdempotencyStore(e.to_string()))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    async fn try_mark_processed(&self, key: &str, ttl: Duration) -> FileHorizonResult<bool> {
        let mut conn = self.conn.clone();
        let options = redis::SetOptions::default()
            .conditional_set(redis::ExistenceCheck::NX)
            .with_expiration(redis::SetExpiry::EX(ttl.as_secs().max(1) as usize));

        let reply: Result<Option<String>, redis::RedisError> =
            conn.set_options(key, "1", options).await;

        match reply {
            Ok(Some(_)) => Ok(true),
            Ok(None) => Ok(false),
            Err(e) => {
                tracing::warn!(error = %e, "idempotency store error, treating as not marked");
                Err(FileHorizonError::IdempotencyStore(e.to_string()))
            }
        }
    }
}
