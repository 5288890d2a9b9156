//! Structural validation for events entering the pipeline.
//!
//! Pollers validate before enqueueing; the queue validates again on
//! `enqueue` so a malformed entry never reaches a stream backend.

use crate::error::{FileHorizonError, FileHorizonResult};
use crate::model::FileEvent;

/// Validate a [`FileEvent`] against the structural invariants from the data
/// model: non-empty id, non-empty source path, non-negative size (enforced
/// by the `u64` type itself).
pub fn validate_event(event: &FileEvent) -> FileHorizonResult<()> {
    event.validate()?;

    if event.metadata.source_path.trim().is_empty() {
        return Err(FileHorizonError::Validation {
            field: "metadata.source_path".to_string(),
            reason: "must not be blank".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FileMetadata, Protocol};
    use chrono::Utc;

    fn valid_event() -> FileEvent {
        FileEvent {
            id: "evt-1".to_string(),
            correlation_id: "corr-1".to_string(),
            metadata: FileMetadata {
                source_path: "/tmp/in/a.txt".to_string(),
                size_bytes: 5,
                last_modified_utc: Utc::now(),
                hash_algorithm: "none".to_string(),
                checksum: None,
            },
            discovered_at_utc: Utc::now(),
            protocol: Protocol::Local,
            destination_path: String::new(),
            delete_after_transfer: false,
        }
    }

    #[test]
    fn accepts_a_well_formed_event() {
        assert!(validate_event(&valid_event()).is_ok());
    }

    #[test]
    fn rejects_blank_source_path() {
        let mut event = valid_event();
        event.metadata.source_path = "   ".to_string();
        assert!(validate_event(&event).is_err());
    }
}
