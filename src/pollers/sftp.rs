//! SFTP poller: one directory level per configured remote root, depth
//! controlled by the source's `recursive` flag. Shares the same pooled
//! session design as [`crate::readers::SftpReader`].

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use globset::GlobMatcher;

use super::{DiscoveredEntry, PollerSource, SourceState};
use crate::error::{FileHorizonError, FileHorizonResult};
use crate::model::{identity_key, Protocol};
use crate::readers::SftpReader;

pub struct SftpPoller {
    host: String,
    port: u16,
    root_path: String,
    glob: GlobMatcher,
    recursive: bool,
    reader: SftpReader,
    state: SourceState,
}

impl SftpPoller {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        root_path: impl Into<String>,
        glob: GlobMatcher,
        recursive: bool,
        reader: SftpReader,
        delete_after_transfer: bool,
        stability_window: chrono::Duration,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            root_path: root_path.into(),
            glob,
            recursive,
            reader,
            state: SourceState::new(name, Protocol::Sftp, delete_after_transfer, stability_window),
        }
    }
}

#[async_trait]
impl PollerSource for SftpPoller {
    async fn enumerate(&self) -> FileHorizonResult<Vec<DiscoveredEntry>> {
        let mut entries = Vec::new();
        let mut stack = vec![(self.root_path.clone(), 16u32)];

        while let Some((path, depth_remaining)) = stack.pop() {
            let listing = self
                .reader
                .list_directory(&path)
                .await
                .map_err(|e| FileHorizonError::Transient(e.to_string()))?;

            for item in listing {
                let full_path = format!("{}/{}", path.trim_end_matches('/'), item.name);
                if item.is_dir {
                    if self.recursive && depth_remaining > 0 {
                        stack.push((full_path, depth_remaining - 1));
                    }
                    continue;
                }

                let relative = full_path.trim_start_matches(&self.root_path).trim_start_matches('/');
                if !self.glob.is_match(relative) {
                    continue;
                }

                let last_modified_utc = item
                    .mtime
                    .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single())
                    .unwrap_or_else(Utc::now);

                entries.push(DiscoveredEntry {
                    identity_key: identity_key(Protocol::Sftp, Some(&self.host), Some(self.port), &full_path),
                    source_path: full_path,
                    size_bytes: item.size,
                    last_modified_utc,
                });
            }
        }

        Ok(entries)
    }

    fn state(&self) -> &SourceState {
        &self.state
    }
}
