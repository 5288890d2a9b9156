//! Reader capability: opens a byte stream and attributes for a
//! [`FileReference`], regardless of source protocol.

mod local;
mod sftp;

pub use local::LocalReader;
pub use sftp::SftpReader;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncRead;

use crate::error::FileHorizonResult;
use crate::model::FileReference;

/// Attributes returned by [`Reader::get_attributes`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderAttributes {
    pub size_bytes: u64,
    pub last_write_utc: DateTime<Utc>,
    pub hash: Option<String>,
}

/// A source opener. The returned stream exclusively owns any underlying
/// client connection: dropping the stream closes the client.
#[async_trait]
pub trait Reader: Send + Sync {
    async fn open_read(
        &self,
        reference: &FileReference,
    ) -> FileHorizonResult<Box<dyn AsyncRead + Send + Unpin>>;

    async fn get_attributes(&self, reference: &FileReference) -> FileHorizonResult<ReaderAttributes>;
}
