//! Local filesystem sink: creates parent directories as needed, streams in
//! 64 KiB chunks, and enforces the overwrite contract via the open mode.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use super::Sink;
use crate::error::{FileHorizonError, FileHorizonResult};
use crate::model::DestinationOptions;

const CHUNK_SIZE: usize = 64 * 1024;

pub struct LocalSink {
    root_path: String,
}

impl LocalSink {
    pub fn new(root_path: impl Into<String>) -> Self {
        Self {
            root_path: root_path.into(),
        }
    }

    fn resolve(&self, target_path: &str) -> std::path::PathBuf {
        std::path::Path::new(&self.root_path).join(target_path)
    }
}

#[async_trait]
impl Sink for LocalSink {
    async fn write(
        &self,
        target_path: &str,
        mut content: Box<dyn AsyncRead + Send + Unpin>,
        options: &DestinationOptions,
    ) -> FileHorizonResult<u64> {
        let full_path = self.resolve(target_path);

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FileHorizonError::Io {
                    source: e,
                    path: Some(parent.to_path_buf()),
                })?;
        }

        let mut file = if options.overwrite {
            tokio::fs::File::create(&full_path).await
        } else {
            tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&full_path)
                .await
        }
        .map_err(|e| FileHorizonError::Io {
            source: e,
            path: Some(full_path.clone()),
        })?;

        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut total: u64 = 0;
        loop {
            let read = content
                .read(&mut buffer)
                .await
                .map_err(|e| FileHorizonError::Io {
                    source: e,
                    path: Some(full_path.clone()),
                })?;
            if read == 0 {
                break;
            }
            file.write_all(&buffer[..read])
                .await
                .map_err(|e| FileHorizonError::Io {
                    source: e,
                    path: Some(full_path.clone()),
                })?;
            total += read as u64;
        }

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn options(overwrite: bool) -> DestinationOptions {
        DestinationOptions {
            overwrite,
            compute_hash: false,
            rename_pattern: None,
        }
    }

    #[tokio::test]
    async fn writes_content_and_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LocalSink::new(dir.path().join("nested").to_str().unwrap());
        let content = Box::new(Cursor::new(b"hello".to_vec()));

        let bytes = sink.write("a.txt", content, &options(true)).await.unwrap();
        assert_eq!(bytes, 5);

        let written = std::fs::read(dir.path().join("nested").join("a.txt")).unwrap();
        assert_eq!(written, b"hello");
    }

    #[tokio::test]
    async fn create_new_fails_when_overwrite_is_false_and_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"old").unwrap();

        let sink = LocalSink::new(dir.path().to_str().unwrap());
        let content = Box::new(Cursor::new(b"new".to_vec()));
        let result = sink.write("a.txt", content, &options(false)).await;
        assert!(result.is_err());
    }
}
