//! In-memory queue backend: an unbounded ordered buffer, used for tests and
//! single-process deployments.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{validate_before_enqueue, Delivery, EntryId, Queue};
use crate::error::FileHorizonResult;
use crate::model::FileEvent;
use crate::telemetry::Telemetry;

/// Simple FIFO buffer with incrementing entry ids, guarded by a mutex. Good
/// enough for a single process; no consumer-group semantics.
pub struct InMemoryQueue {
    buffer: Mutex<VecDeque<(EntryId, FileEvent)>>,
    next_id: AtomicU64,
    telemetry: Telemetry,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::with_telemetry(Telemetry::default())
    }

    pub fn with_telemetry(telemetry: Telemetry) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
            telemetry,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Queue for InMemoryQueue {
    async fn enqueue(&self, event: FileEvent) -> FileHorizonResult<()> {
        let span = self.telemetry.span("queue.enqueue");
        let _guard = span.enter();

        if let Err(e) = validate_before_enqueue(&event) {
            self.telemetry.counter("queue.enqueue.failures").incr();
            return Err(e);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.buffer
            .lock()
            .unwrap()
            .push_back((EntryId(id.to_string()), event));
        self.telemetry.counter("queue.enqueued").incr();
        Ok(())
    }

    async fn drain(&self, max_batch: usize) -> FileHorizonResult<Vec<Delivery>> {
        let span = self.telemetry.span("queue.dequeue");
        let _guard = span.enter();

        let mut buffer = self.buffer.lock().unwrap();
        let mut deliveries = Vec::with_capacity(max_batch.min(buffer.len()));
        for _ in 0..max_batch {
            match buffer.pop_front() {
                Some((entry_id, event)) => deliveries.push(Delivery { entry_id, event }),
                None => break,
            }
        }
        self.telemetry.counter("queue.dequeued").incr_by(deliveries.len() as u64);
        Ok(deliveries)
    }

    async fn acknowledge(&self, _entry_id: &EntryId) -> FileHorizonResult<()> {
        // Entries are removed from the buffer on drain; nothing further to do.
        Ok(())
    }
}
