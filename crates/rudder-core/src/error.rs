//! Coordinator error taxonomy

use rudder_policy::PolicyError;
use rudder_store::StoreError;
use thiserror::Error;

/// Errors surfaced by the transaction coordinator
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Mutation rejected its input before any state was touched
    #[error("validation failed: {0}")]
    Validation(String),

    /// Acting role lacks a required permission
    #[error("actor '{actor_id}' lacks permission '{permission}'")]
    Permission {
        /// Actor whose role was checked
        actor_id: String,
        /// Permission the operation requires
        permission: String,
    },

    /// Policy chain denied the operation
    #[error("policy denied: {reasons}")]
    PolicyViolation {
        /// All deny reasons, joined with "; "
        reasons: String,
    },

    /// Referenced control is not active
    #[error("control not found: {0}")]
    NotFound(String),

    /// Mutation execution failed; state has been rolled back
    #[error("apply failed: {message}")]
    Apply {
        /// What went wrong
        message: String,
        /// Underlying cause, when the mutation supplied one
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Audit sink refused the entry; the transaction was rolled back
    #[error("audit write failed: {0}")]
    Audit(String),

    /// Snapshot store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Policy infrastructure failure (not a denial)
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

impl CoordinatorError {
    /// Apply failure without an underlying cause
    #[must_use]
    pub fn apply(message: impl Into<String>) -> Self {
        Self::Apply {
            message: message.into(),
            source: None,
        }
    }

    /// True for permission and policy rejections, which fail before any
    /// state is touched
    #[inline]
    #[must_use]
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            Self::Permission { .. } | Self::PolicyViolation { .. }
        )
    }
}
