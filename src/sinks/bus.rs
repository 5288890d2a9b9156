//! Message bus sink: wraps content in a message envelope and publishes via
//! a [`MessageBus`] port, retrying transient failures with jittered
//! exponential backoff.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::Sink;
use crate::backoff::Backoff;
use crate::error::{FileHorizonError, FileHorizonResult};
use crate::model::DestinationOptions;

/// Abstraction over the concrete bus technology; the spec leaves "message
/// bus" abstract, so sinks depend on this port rather than a specific
/// client.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish `payload` with the given `content_type` and `subject`
    /// (conventionally the file name) to `destination`.
    async fn publish(
        &self,
        destination: &str,
        subject: &str,
        content_type: &str,
        payload: &[u8],
        is_topic: bool,
    ) -> FileHorizonResult<()>;
}

/// Redis-backed bus: `PUBLISH` for fan-out topic subscribers, `RPUSH` to a
/// named list for durable polling consumers. Reuses the same Redis instance
/// already required for the queue and idempotency store.
pub struct RedisMessageBus {
    conn: ConnectionManager,
}

impl RedisMessageBus {
    pub async fn connect(redis_url: &str) -> FileHorizonResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| FileHorizonError::Transient(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| FileHorizonError::Transient(e.to_string()))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl MessageBus for RedisMessageBus {
    async fn publish(
        &self,
        destination: &str,
        subject: &str,
        content_type: &str,
        payload: &[u8],
        is_topic: bool,
    ) -> FileHorizonResult<()> {
        let envelope = serde_json::json!({
            "contentType": content_type,
            "subject": subject,
            "payload": STANDARD.encode(payload),
        });
        let body = serde_json::to_string(&envelope)?;

        let mut conn = self.conn.clone();
        if is_topic {
            conn.publish::<_, _, ()>(destination, body)
                .await
                .map_err(|e| FileHorizonError::Transient(e.to_string()))?;
        } else {
            conn.rpush::<_, _, ()>(destination, body)
                .await
                .map_err(|e| FileHorizonError::Transient(e.to_string()))?;
        }
        Ok(())
    }
}

/// Retry policy for the bus sink: base ~200ms, cap ~4s, up to 3 retries,
/// ±25% jitter.
pub struct BusSink {
    bus: std::sync::Arc<dyn MessageBus>,
    destination: String,
    is_topic: bool,
    max_attempts: u32,
}

impl BusSink {
    pub fn new(bus: std::sync::Arc<dyn MessageBus>, destination: impl Into<String>, is_topic: bool) -> Self {
        Self {
            bus,
            destination: destination.into(),
            is_topic,
            max_attempts: 3,
        }
    }
}

#[async_trait]
impl Sink for BusSink {
    async fn write(
        &self,
        target_path: &str,
        mut content: Box<dyn AsyncRead + Send + Unpin>,
        _options: &DestinationOptions,
    ) -> FileHorizonResult<u64> {
        let mut payload = Vec::new();
        content
            .read_to_end(&mut payload)
            .await
            .map_err(|e| FileHorizonError::Io {
                source: e,
                path: None,
            })?;

        let subject = target_path
            .rsplit('/')
            .next()
            .unwrap_or(target_path)
            .to_string();

        let mut backoff = Backoff::new(Duration::from_millis(200), Duration::from_secs(4));
        let mut last_err = None;
        for attempt in 0..self.max_attempts {
            match self
                .bus
                .publish(&self.destination, &subject, "application/octet-stream", &payload, self.is_topic)
                .await
            {
                Ok(()) => return Ok(payload.len() as u64),
                Err(e) if e.is_retryable() && attempt + 1 < self.max_attempts => {
                    let delay = backoff.register_failure();
                    let jittered = backoff.jittered_delay();
                    tracing::warn!(error = %e, delay_ms = delay.as_millis() as u64, "bus publish failed, retrying");
                    tokio::time::sleep(jittered).await;
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or(FileHorizonError::Internal("bus publish exhausted retries".to_string())))
    }
}
