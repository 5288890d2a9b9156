//! Redis Streams-backed queue: one named stream, one consumer group, one
//! unique consumer name per replica. Provides at-least-once delivery via
//! `XREADGROUP ... >` and `XACK`.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, RedisError};

use super::{validate_before_enqueue, Delivery, EntryId, Queue};
use crate::error::FileHorizonError;
use crate::error::FileHorizonResult;
use crate::model::{FileEvent, FileMetadata, Protocol};
use crate::telemetry::Telemetry;

/// Stream/group/consumer naming for a replica.
#[derive(Debug, Clone)]
pub struct RedisStreamConfig {
    pub redis_url: String,
    pub stream_name: String,
    pub group_name: String,
    pub consumer_name: String,
    pub block_ms: usize,
}

impl RedisStreamConfig {
    /// Build a consumer name unique to this process: `{prefix}-{host}-{uuid}`.
    pub fn consumer_name_for(prefix: &str, host: &str) -> String {
        format!("{prefix}-{host}-{}", uuid::Uuid::new_v4())
    }
}

pub struct RedisStreamQueue {
    conn: ConnectionManager,
    config: RedisStreamConfig,
    telemetry: Telemetry,
}

impl RedisStreamQueue {
    pub async fn connect(config: RedisStreamConfig, telemetry: Telemetry) -> FileHorizonResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str()).map_err(to_queue_error)?;
        let mut conn = ConnectionManager::new(client)
            .await
            .map_err(to_queue_error)?;

        ensure_group(&mut conn, &config.stream_name, &config.group_name).await?;

        Ok(Self { conn, config, telemetry })
    }

    fn field_value_pairs(event: &FileEvent) -> Vec<(&'static str, String)> {
        vec![
            ("id", event.id.clone()),
            ("correlationId", event.correlation_id.clone()),
            ("sourcePath", event.metadata.source_path.clone()),
            ("sizeBytes", event.metadata.size_bytes.to_string()),
            (
                "lastModifiedUtc",
                event.metadata.last_modified_utc.timestamp_millis().to_string(),
            ),
            ("hashAlgorithm", event.metadata.hash_algorithm.clone()),
            ("checksum", event.metadata.checksum.clone().unwrap_or_default()),
            (
                "discoveredAtUtc",
                event.discovered_at_utc.timestamp_millis().to_string(),
            ),
            ("protocol", event.protocol.as_str().to_string()),
            ("destinationPath", event.destination_path.clone()),
            ("deleteAfterTransfer", event.delete_after_transfer.to_string()),
        ]
    }

    fn event_from_fields(fields: &std::collections::HashMap<String, redis::Value>) -> FileHorizonResult<FileEvent> {
        let get = |key: &str| -> FileHorizonResult<String> {
            fields
                .get(key)
                .and_then(|v| match v {
                    redis::Value::BulkString(bytes) => String::from_utf8(bytes.clone()).ok(),
                    redis::Value::SimpleString(s) => Some(s.clone()),
                    _ => None,
                })
                .ok_or_else(|| FileHorizonError::DequeueError(format!("missing field {key}")))
        };

        let size_bytes: u64 = get("sizeBytes")?
            .parse()
            .map_err(|_| FileHorizonError::DequeueError("invalid sizeBytes".to_string()))?;
        let last_modified_ms: i64 = get("lastModifiedUtc")?
            .parse()
            .map_err(|_| FileHorizonError::DequeueError("invalid lastModifiedUtc".to_string()))?;
        let discovered_ms: i64 = get("discoveredAtUtc")?
            .parse()
            .map_err(|_| FileHorizonError::DequeueError("invalid discoveredAtUtc".to_string()))?;
        let protocol: Protocol = get("protocol")?
            .parse()
            .map_err(|_| FileHorizonError::DequeueError("invalid protocol".to_string()))?;
        let checksum = get("checksum").ok().filter(|s| !s.is_empty());

        Ok(FileEvent {
            id: get("id")?,
            correlation_id: get("correlationId")?,
            metadata: FileMetadata {
                source_path: get("sourcePath")?,
                size_bytes,
                last_modified_utc: millis_to_utc(last_modified_ms),
                hash_algorithm: get("hashAlgorithm")?,
                checksum,
            },
            discovered_at_utc: millis_to_utc(discovered_ms),
            protocol,
            destination_path: get("destinationPath").unwrap_or_default(),
            delete_after_transfer: get("deleteAfterTransfer")
                .map(|s| s == "true")
                .unwrap_or(false),
        })
    }
}

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

async fn ensure_group(
    conn: &mut ConnectionManager,
    stream: &str,
    group: &str,
) -> FileHorizonResult<()> {
    let result: Result<(), RedisError> = conn.xgroup_create_mkstream(stream, group, "$").await;
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
        Err(e) => Err(to_queue_error(e)),
    }
}

fn to_queue_error(e: RedisError) -> FileHorizonError {
    FileHorizonError::ConsumerGroup(e.to_string())
}

#[async_trait]
impl Queue for RedisStreamQueue {
    async fn enqueue(&self, event: FileEvent) -> FileHorizonResult<()> {
        let span = self.telemetry.span("queue.enqueue");
        let _guard = span.enter();

        if let Err(e) = validate_before_enqueue(&event) {
            self.telemetry.counter("queue.enqueue.failures").incr();
            return Err(e);
        }
        let pairs = Self::field_value_pairs(&event);
        let mut conn = self.conn.clone();
        if let Err(e) = conn.xadd(&self.config.stream_name, "*", &pairs).await {
            self.telemetry.counter("queue.enqueue.failures").incr();
            return Err(FileHorizonError::EnqueueRejected {
                reason: e.to_string(),
            });
        }
        self.telemetry.counter("queue.enqueued").incr();
        Ok(())
    }

    async fn drain(&self, max_batch: usize) -> FileHorizonResult<Vec<Delivery>> {
        let span = self.telemetry.span("queue.dequeue");
        let _guard = span.enter();

        let opts = StreamReadOptions::default()
            .group(&self.config.group_name, &self.config.consumer_name)
            .count(max_batch)
            .block(self.config.block_ms);

        let mut conn = self.conn.clone();
        let reply: StreamReadReply = match conn.xread_options(&[&self.config.stream_name], &[">"], &opts).await {
            Ok(reply) => reply,
            Err(e) => {
                self.telemetry.counter("queue.dequeue.failures").incr();
                return Err(FileHorizonError::DequeueError(e.to_string()));
            }
        };

        let mut deliveries = Vec::new();
        for stream_key in reply.keys {
            for stream_id in stream_key.ids {
                let fields: std::collections::HashMap<String, redis::Value> =
                    stream_id.map.into_iter().collect();
                match Self::event_from_fields(&fields) {
                    Ok(event) => deliveries.push(Delivery {
                        entry_id: EntryId(stream_id.id.clone()),
                        event,
                    }),
                    Err(e) => {
                        // Malformed entry: log and acknowledge to avoid a poison loop.
                        tracing::warn!(entry_id = %stream_id.id, error = %e, "dropping malformed stream entry");
                        self.telemetry.counter("queue.dequeue.failures").incr();
                        let _ = self.acknowledge(&EntryId(stream_id.id.clone())).await;
                    }
                }
            }
        }
        self.telemetry.counter("queue.dequeued").incr_by(deliveries.len() as u64);
        Ok(deliveries)
    }

    async fn acknowledge(&self, entry_id: &EntryId) -> FileHorizonResult<()> {
        let mut conn = self.conn.clone();
        conn.xack(&self.config.stream_name, &self.config.group_name, &[&entry_id.0])
            .await
            .map_err(|e| FileHorizonError::ConsumerGroup(e.to_string()))?;
        Ok(())
    }
}
