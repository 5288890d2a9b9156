//! Unified Configuration Module
//!
//! Consolidates every configurable surface of the pipeline into a single
//! coherent tree with proper validation, defaults, and a builder pattern.

use crate::error::{FileHorizonError, FileHorizonResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Unified configuration for the whole pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileHorizonConfig {
    pub pipeline: PipelineConfig,
    pub polling: PollingConfig,
    pub features: FeatureFlags,
    pub file_sources: Vec<LocalSourceConfig>,
    pub remote_file_sources: RemoteSourcesConfig,
    pub destinations: DestinationsConfig,
    pub routing: RoutingConfig,
    pub transfer: TransferConfig,
    pub idempotency: IdempotencyConfig,
    pub notification: NotificationConfig,
    pub telemetry: TelemetryConfig,
}

/// The role a process plays: which background loops it runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    /// Runs only the polling loop.
    Poller,
    /// Runs only the processing loop.
    Worker,
    /// Runs both loops.
    All,
}

impl Default for Role {
    fn default() -> Self {
        Role::All
    }
}

/// Top-level pipeline role configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub role: Role,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { role: Role::All }
    }
}

/// Polling loop cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub batch_read_limit: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            batch_read_limit: 32,
        }
    }
}

/// Feature toggles for the background drivers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlags {
    pub enable_local_poller: bool,
    pub enable_ftp_poller: bool,
    pub enable_sftp_poller: bool,
    pub enable_file_transfer: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_local_poller: true,
            enable_ftp_poller: false,
            enable_sftp_poller: false,
            enable_file_transfer: true,
        }
    }
}

/// A locally-watched source directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalSourceConfig {
    pub name: String,
    pub root_path: String,
    pub glob: String,
    pub recursive: bool,
    pub delete_after_transfer: bool,
    pub stability_window_ms: u64,
}

impl Default for LocalSourceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            root_path: String::new(),
            glob: "**/*".to_string(),
            recursive: true,
            delete_after_transfer: false,
            stability_window_ms: 2_000,
        }
    }
}

/// Credential reference for a remote source; the actual secret is resolved
/// out-of-band through a `SecretResolver` port, never embedded here.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    pub username: String,
    pub secret_ref: Option<String>,
}

/// Remote poller sources grouped by protocol.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RemoteSourcesConfig {
    pub ftp: Vec<FtpSourceConfig>,
    pub sftp: Vec<SftpSourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtpSourceConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub root_path: String,
    pub glob: String,
    pub recursive: bool,
    pub auth: AuthConfig,
    pub delete_after_transfer: bool,
    pub stability_window_ms: u64,
}

impl Default for FtpSourceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            host: String::new(),
            port: 21,
            root_path: "/".to_string(),
            glob: "**/*".to_string(),
            recursive: false,
            auth: AuthConfig::default(),
            delete_after_transfer: false,
            stability_window_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SftpSourceConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub root_path: String,
    pub glob: String,
    pub recursive: bool,
    pub auth: AuthConfig,
    pub delete_after_transfer: bool,
    pub stability_window_ms: u64,
}

impl Default for SftpSourceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            host: String::new(),
            port: 22,
            root_path: "/".to_string(),
            glob: "**/*".to_string(),
            recursive: false,
            auth: AuthConfig::default(),
            delete_after_transfer: false,
            stability_window_ms: 2_000,
        }
    }
}

/// Destination pools, by kind.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DestinationsConfig {
    pub local: Vec<LocalDestinationConfig>,
    pub sftp: Vec<SftpDestinationConfig>,
    pub bus: Vec<BusDestinationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalDestinationConfig {
    pub name: String,
    pub root_path: String,
}

impl Default for LocalDestinationConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            root_path: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SftpDestinationConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub root_path: String,
    pub auth: AuthConfig,
}

impl Default for SftpDestinationConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            host: String::new(),
            port: 22,
            root_path: "/".to_string(),
            auth: AuthConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusDestinationConfig {
    pub name: String,
    pub topic: String,
    pub is_topic: bool,
}

impl Default for BusDestinationConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            topic: String::new(),
            is_topic: true,
        }
    }
}

/// Routing table: ordered rules, first match wins.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RoutingConfig {
    pub rules: Vec<RoutingRuleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRuleConfig {
    pub name: String,
    pub protocol: Option<String>,
    pub path_glob: Option<String>,
    pub path_regex: Option<String>,
    pub source_name: Option<String>,
    pub destinations: Vec<String>,
    pub rename_pattern: Option<String>,
    pub overwrite: bool,
}

impl Default for RoutingRuleConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            protocol: None,
            path_glob: None,
            path_regex: None,
            source_name: None,
            destinations: Vec::new(),
            rename_pattern: None,
            overwrite: false,
        }
    }
}

/// Transfer mechanics: chunking, retry, and checksum behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    pub chunk_size_bytes: usize,
    pub retry: RetryConfig,
    pub checksum: ChecksumConfig,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: 64 * 1024,
            retry: RetryConfig::default(),
            checksum: ChecksumConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub cap_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 200,
            cap_delay_ms: 4_000,
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecksumConfig {
    pub compute_hash: bool,
    pub algorithm: String,
}

impl Default for ChecksumConfig {
    fn default() -> Self {
        Self {
            compute_hash: false,
            algorithm: "none".to_string(),
        }
    }
}

/// Idempotency store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyConfig {
    pub enabled: bool,
    pub ttl_seconds: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 24 * 3600,
        }
    }
}

impl IdempotencyConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Processed-file notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub suppression_ttl_seconds: u64,
    pub publish_timeout_ms: u64,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            suppression_ttl_seconds: 600,
            publish_timeout_ms: 5_000,
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub reset_interval_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            failure_threshold: 5,
            reset_interval_ms: 30_000,
        }
    }
}

/// Telemetry emission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub histogram_reservoir_size: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            histogram_reservoir_size: 1_024,
        }
    }
}

/// Configuration builder with validation and defaults.
#[derive(Default)]
pub struct ConfigBuilder {
    config: FileHorizonConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: FileHorizonConfig::default(),
        }
    }

    pub fn pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.config.pipeline = pipeline;
        self
    }

    pub fn polling(mut self, polling: PollingConfig) -> Self {
        self.config.polling = polling;
        self
    }

    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.config.features = features;
        self
    }

    pub fn file_sources(mut self, sources: Vec<LocalSourceConfig>) -> Self {
        self.config.file_sources = sources;
        self
    }

    pub fn remote_file_sources(mut self, sources: RemoteSourcesConfig) -> Self {
        self.config.remote_file_sources = sources;
        self
    }

    pub fn destinations(mut self, destinations: DestinationsConfig) -> Self {
        self.config.destinations = destinations;
        self
    }

    pub fn routing(mut self, routing: RoutingConfig) -> Self {
        self.config.routing = routing;
        self
    }

    pub fn transfer(mut self, transfer: TransferConfig) -> Self {
        self.config.transfer = transfer;
        self
    }

    pub fn idempotency(mut self, idempotency: IdempotencyConfig) -> Self {
        self.config.idempotency = idempotency;
        self
    }

    pub fn notification(mut self, notification: NotificationConfig) -> Self {
        self.config.notification = notification;
        self
    }

    pub fn telemetry(mut self, telemetry: TelemetryConfig) -> Self {
        self.config.telemetry = telemetry;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> FileHorizonResult<FileHorizonConfig> {
        self.validate()?;
        Ok(self.config)
    }

    fn validate(&self) -> FileHorizonResult<()> {
        let cfg = &self.config;

        let mut names = std::collections::HashSet::new();
        for dest in cfg
            .destinations
            .local
            .iter()
            .map(|d| &d.name)
            .chain(cfg.destinations.sftp.iter().map(|d| &d.name))
            .chain(cfg.destinations.bus.iter().map(|d| &d.name))
        {
            if dest.is_empty() {
                return Err(FileHorizonError::Configuration {
                    field: "destinations".to_string(),
                    message: "destination name cannot be empty".to_string(),
                });
            }
            if !names.insert(dest.clone()) {
                return Err(FileHorizonError::Configuration {
                    field: "destinations".to_string(),
                    message: format!("duplicate destination name: {dest}"),
                });
            }
        }

        let mut source_names = std::collections::HashSet::new();
        for name in cfg
            .file_sources
            .iter()
            .map(|s| &s.name)
            .chain(cfg.remote_file_sources.ftp.iter().map(|s| &s.name))
            .chain(cfg.remote_file_sources.sftp.iter().map(|s| &s.name))
        {
            if name.is_empty() {
                return Err(FileHorizonError::Configuration {
                    field: "file_sources".to_string(),
                    message: "source name cannot be empty".to_string(),
                });
            }
            if !source_names.insert(name.clone()) {
                return Err(FileHorizonError::Configuration {
                    field: "file_sources".to_string(),
                    message: format!("duplicate source name: {name}"),
                });
            }
        }

        for source in &cfg.remote_file_sources.ftp {
            if source.port == 0 {
                return Err(FileHorizonError::Configuration {
                    field: "remote_file_sources.ftp.port".to_string(),
                    message: format!("source {} has port 0", source.name),
                });
            }
            if source.auth.secret_ref.is_none() && !source.auth.username.is_empty() {
                return Err(FileHorizonError::Configuration {
                    field: "remote_file_sources.ftp.auth".to_string(),
                    message: format!("source {} names a username but no secret_ref", source.name),
                });
            }
        }

        for source in &cfg.remote_file_sources.sftp {
            if source.port == 0 {
                return Err(FileHorizonError::Configuration {
                    field: "remote_file_sources.sftp.port".to_string(),
                    message: format!("source {} has port 0", source.name),
                });
            }
            if source.auth.secret_ref.is_none() && !source.auth.username.is_empty() {
                return Err(FileHorizonError::Configuration {
                    field: "remote_file_sources.sftp.auth".to_string(),
                    message: format!("source {} names a username but no secret_ref", source.name),
                });
            }
        }

        for dest in &cfg.destinations.sftp {
            if dest.port == 0 {
                return Err(FileHorizonError::Configuration {
                    field: "destinations.sftp.port".to_string(),
                    message: format!("destination {} has port 0", dest.name),
                });
            }
        }

        if cfg.transfer.retry.base_delay_ms > cfg.transfer.retry.cap_delay_ms {
            return Err(FileHorizonError::Configuration {
                field: "transfer.retry".to_string(),
                message: "base_delay_ms cannot exceed cap_delay_ms".to_string(),
            });
        }

        if cfg.idempotency.enabled && cfg.idempotency.ttl_seconds < 1 {
            return Err(FileHorizonError::Configuration {
                field: "idempotency.ttl_seconds".to_string(),
                message: "ttl_seconds must be at least 1".to_string(),
            });
        }

        if cfg.transfer.chunk_size_bytes == 0 {
            return Err(FileHorizonError::Configuration {
                field: "transfer.chunk_size_bytes".to_string(),
                message: "chunk_size_bytes cannot be 0".to_string(),
            });
        }

        Ok(())
    }
}
