//! Snapshot store errors

use crate::types::SnapshotId;

/// Errors raised by [`crate::SnapshotStore`]
///
/// Unknown ids are the only lookup failures; capture and commit do not
/// otherwise fail under normal memory conditions.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Unknown snapshot id
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(SnapshotId),

    /// Control is not in the active set
    #[error("control not active: {0}")]
    ControlNotActive(String),

    /// Commit delta was not a map
    #[error("invalid mutation delta: expected map, got {kind}")]
    InvalidDelta {
        /// Variant name of the rejected delta
        kind: &'static str,
    },
}
