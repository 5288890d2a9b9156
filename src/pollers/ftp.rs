//! FTP poller: lists one directory level per cycle (or recurses when
//! configured), using a fresh control connection per cycle — FTP has no
//! natural connection-pooling story the way SFTP sessions do.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use globset::GlobMatcher;
use suppaftp::{types::FileType, AsyncFtpStream};

use super::{DiscoveredEntry, PollerSource, SourceState};
use crate::error::{FileHorizonError, FileHorizonResult};
use crate::model::{identity_key, Protocol};

pub struct FtpConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

pub struct FtpPoller {
    config: FtpConnectionConfig,
    root_path: String,
    glob: GlobMatcher,
    recursive: bool,
    state: SourceState,
}

impl FtpPoller {
    pub fn new(
        name: impl Into<String>,
        config: FtpConnectionConfig,
        root_path: impl Into<String>,
        glob: GlobMatcher,
        recursive: bool,
        delete_after_transfer: bool,
        stability_window: chrono::Duration,
    ) -> Self {
        Self {
            config,
            root_path: root_path.into(),
            glob,
            recursive,
            state: SourceState::new(name, Protocol::Ftp, delete_after_transfer, stability_window),
        }
    }

    async fn connect(&self) -> FileHorizonResult<AsyncFtpStream> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let mut stream = AsyncFtpStream::connect(&addr)
            .await
            .map_err(|e| FileHorizonError::NetworkConnection {
                host: self.config.host.clone(),
                port: self.config.port,
                reason: e.to_string(),
            })?;

        stream
            .login(&self.config.username, &self.config.password)
            .await
            .map_err(|e| FileHorizonError::Authentication {
                source: self.config.host.clone(),
                reason: e.to_string(),
            })?;

        stream
            .transfer_type(FileType::Binary)
            .await
            .map_err(|e| FileHorizonError::NetworkConnection {
                host: self.config.host.clone(),
                port: self.config.port,
                reason: e.to_string(),
            })?;

        Ok(stream)
    }

    async fn list_one_level(
        &self,
        stream: &mut AsyncFtpStream,
        path: &str,
        entries: &mut Vec<DiscoveredEntry>,
        depth_remaining: u32,
    ) -> FileHorizonResult<()> {
        let listing = stream
            .list(Some(path))
            .await
            .map_err(|e| FileHorizonError::Transient(e.to_string()))?;

        for line in listing {
            let Some(parsed) = suppaftp::list::File::from_str(&line).ok() else {
                continue;
            };
            let full_path = format!("{}/{}", path.trim_end_matches('/'), parsed.name());

            if parsed.is_directory() {
                if self.recursive && depth_remaining > 0 {
                    Box::pin(self.list_one_level(stream, &full_path, entries, depth_remaining - 1)).await?;
                }
                continue;
            }

            let relative = full_path.trim_start_matches(&self.root_path).trim_start_matches('/');
            if !self.glob.is_match(relative) {
                continue;
            }

            let last_modified_utc: DateTime<Utc> = DateTime::<Utc>::from(parsed.modified());

            entries.push(DiscoveredEntry {
                identity_key: identity_key(Protocol::Ftp, Some(&self.config.host), Some(self.config.port), &full_path),
                source_path: full_path,
                size_bytes: parsed.size() as u64,
                last_modified_utc,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PollerSource for FtpPoller {
    async fn enumerate(&self) -> FileHorizonResult<Vec<DiscoveredEntry>> {
        let mut stream = self.connect().await?;
        let mut entries = Vec::new();
        self.list_one_level(&mut stream, &self.root_path, &mut entries, 16)
            .await?;
        let _ = stream.quit().await;
        Ok(entries)
    }

    fn state(&self) -> &SourceState {
        &self.state
    }
}
