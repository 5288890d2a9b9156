//! Local filesystem reader: opens the file for shared read, fails fast when
//! missing rather than surfacing a bare I/O error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncRead;

use super::{Reader, ReaderAttributes};
use crate::error::{FileHorizonError, FileHorizonResult};
use crate::model::{FileReference, Protocol};

pub struct LocalReader;

impl LocalReader {
    pub fn new() -> Self {
        Self
    }

    fn require_local(reference: &FileReference) -> FileHorizonResult<()> {
        if reference.scheme != Protocol::Local {
            return Err(FileHorizonError::SchemeMismatch {
                expected: "local".to_string(),
                actual: reference.scheme.as_str().to_string(),
            });
        }
        Ok(())
    }
}

impl Default for LocalReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Reader for LocalReader {
    async fn open_read(
        &self,
        reference: &FileReference,
    ) -> FileHorizonResult<Box<dyn AsyncRead + Send + Unpin>> {
        Self::require_local(reference)?;

        let file = tokio::fs::File::open(&reference.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FileHorizonError::FileNotFound {
                    path: reference.path.clone(),
                }
            } else {
                FileHorizonError::Io {
                    source: e,
                    path: Some(reference.path.clone().into()),
                }
            }
        })?;

        Ok(Box::new(file))
    }

    async fn get_attributes(&self, reference: &FileReference) -> FileHorizonResult<ReaderAttributes> {
        Self::require_local(reference)?;

        let metadata = tokio::fs::metadata(&reference.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FileHorizonError::FileNotFound {
                    path: reference.path.clone(),
                }
            } else {
                FileHorizonError::Io {
                    source: e,
                    path: Some(reference.path.clone().into()),
                }
            }
        })?;

        let last_write_utc: DateTime<Utc> = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(ReaderAttributes {
            size_bytes: metadata.len(),
            last_write_utc,
            hash: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn local_ref(path: &str) -> FileReference {
        FileReference {
            scheme: Protocol::Local,
            host: None,
            port: None,
            path: path.to_string(),
            source_name: None,
        }
    }

    #[tokio::test]
    async fn opens_an_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"hello")
            .unwrap();

        let reader = LocalReader::new();
        let reference = local_ref(path.to_str().unwrap());
        let attrs = reader.get_attributes(&reference).await.unwrap();
        assert_eq!(attrs.size_bytes, 5);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let reader = LocalReader::new();
        let reference = local_ref("/tmp/does-not-exist-filehorizon.txt");
        let result = reader.open_read(&reference).await;
        assert!(matches!(result, Err(FileHorizonError::FileNotFound { .. })));
    }

    #[tokio::test]
    async fn scheme_mismatch_is_rejected() {
        let reader = LocalReader::new();
        let mut reference = local_ref("/tmp/a.txt");
        reference.scheme = Protocol::Sftp;
        let result = reader.open_read(&reference).await;
        assert!(matches!(result, Err(FileHorizonError::SchemeMismatch { .. })));
    }
}
