//! FileHorizon — a horizontally scalable managed file transfer pipeline.
//!
//! FileHorizon discovers files on heterogeneous sources (local directories,
//! FTP, SFTP), coordinates exactly-once-ish processing across replicas via a
//! shared stream with consumer-group semantics, and delivers bytes to
//! configured sinks (local filesystem, SFTP, message bus destinations).
//!
//! # Architecture
//!
//! 1. **Pollers** enumerate sources, detect readiness, and enqueue events.
//! 2. **Queue** carries events with at-least-once delivery.
//! 3. **Orchestrator** routes, reads, writes, notifies, and optionally
//!    deletes the source for each event, gated by an idempotency store.
//! 4. **Background drivers** run the polling loop and processing loop,
//!    independently scalable via process [`config::Role`].
//!
//! # Quick Start
//!
//! ```rust
//! use filehorizon::config::ConfigBuilder;
//!
//! let config = ConfigBuilder::new().build().expect("default config is valid");
//! println!("role: {:?}", config.pipeline.role);
//! ```

pub mod backoff;
pub mod config;
pub mod drivers;
pub mod error;
pub mod idempotency;
pub mod model;
pub mod notifier;
pub mod orchestrator;
pub mod pollers;
pub mod queue;
pub mod readers;
pub mod readiness;
pub mod router;
pub mod sinks;
pub mod telemetry;
pub mod validation;

pub use config::{ConfigBuilder, FileHorizonConfig};
pub use error::{ErrorContext, FileHorizonError, FileHorizonResult};
pub use model::{DestinationPlan, FileEvent, FileMetadata, FileReference};
pub use orchestrator::Orchestrator;
pub use telemetry::Telemetry;
