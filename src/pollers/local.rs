//! Local poller: walks a directory tree (optionally recursive) filtered by
//! glob, with no remote connection step. An invalid or missing root path
//! flags the source as disabled until the config observer reports a change.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobMatcher};
use walkdir::WalkDir;

use super::{DiscoveredEntry, PollerSource, SourceState};
use crate::error::{FileHorizonError, FileHorizonResult};
use crate::model::{identity_key, Protocol};

pub struct LocalPoller {
    root_path: String,
    glob: GlobMatcher,
    recursive: bool,
    disabled: AtomicBool,
    state: SourceState,
}

impl LocalPoller {
    pub fn new(
        name: impl Into<String>,
        root_path: impl Into<String>,
        glob_pattern: &str,
        recursive: bool,
        delete_after_transfer: bool,
        stability_window: chrono::Duration,
    ) -> FileHorizonResult<Self> {
        let glob = Glob::new(glob_pattern)
            .map_err(|e| FileHorizonError::Configuration {
                field: "file_sources.glob".to_string(),
                message: e.to_string(),
            })?
            .compile_matcher();

        Ok(Self {
            root_path: root_path.into(),
            glob,
            recursive,
            disabled: AtomicBool::new(false),
            state: SourceState::new(name, Protocol::Local, delete_after_transfer, stability_window),
        })
    }

    fn max_depth(&self) -> usize {
        if self.recursive {
            usize::MAX
        } else {
            1
        }
    }
}

#[async_trait]
impl PollerSource for LocalPoller {
    async fn enumerate(&self) -> FileHorizonResult<Vec<DiscoveredEntry>> {
        if !std::path::Path::new(&self.root_path).is_dir() {
            self.disabled.store(true, Ordering::Relaxed);
            return Err(FileHorizonError::FileNotFound {
                path: self.root_path.clone(),
            });
        }
        if self.disabled.swap(false, Ordering::Relaxed) {
            tracing::info!(source = %self.state.name, "local source re-enabled");
        }

        let root_path = self.root_path.clone();
        let glob = self.glob.clone();
        let max_depth = self.max_depth();

        tokio::task::spawn_blocking(move || {
            let mut entries = Vec::new();
            for entry in WalkDir::new(&root_path)
                .max_depth(max_depth)
                .into_iter()
                .filter_map(Result::ok)
            {
                if entry.file_type().is_dir() {
                    continue;
                }
                let relative = entry
                    .path()
                    .strip_prefix(&root_path)
                    .unwrap_or(entry.path())
                    .to_string_lossy()
                    .replace('\\', "/");
                if !glob.is_match(&relative) {
                    continue;
                }

                let metadata = match entry.metadata() {
                    Ok(m) => m,
                    Err(_) => continue,
                };
                let last_modified_utc: DateTime<Utc> = metadata
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());

                let source_path = entry.path().to_string_lossy().to_string();
                let key = identity_key(Protocol::Local, None, None, &source_path);

                entries.push(DiscoveredEntry {
                    identity_key: key,
                    source_path,
                    size_bytes: metadata.len(),
                    last_modified_utc,
                });
            }
            entries
        })
        .await
        .map_err(|e| FileHorizonError::Internal(e.to_string()))
    }

    fn state(&self) -> &SourceState {
        &self.state
    }
}
