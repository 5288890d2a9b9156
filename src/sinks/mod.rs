//! Sink capability: writes a content stream to a destination target with
//! rename/overwrite semantics.

mod bus;
mod local;

pub use bus::{BusSink, MessageBus, RedisMessageBus};
pub use local::LocalSink;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::error::FileHorizonResult;
use crate::model::DestinationOptions;

/// A destination writer.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn write(
        &self,
        target_path: &str,
        content: Box<dyn AsyncRead + Send + Unpin>,
        options: &DestinationOptions,
    ) -> FileHorizonResult<u64>;
}
