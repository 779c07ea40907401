//! Policy chain errors

/// Errors raised by [`crate::PolicyChain`] management operations
///
/// Evaluation itself never surfaces a policy's internal error: the chain
/// converts it to a deny verdict (fail-closed).
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// Malformed policy rejected at registration
    #[error("policy validation failed: {0}")]
    ValidationFailed(String),

    /// Unknown policy id
    #[error("policy not found: {0}")]
    PolicyNotFound(String),

    /// A policy's internal evaluation failure
    #[error("policy evaluation failed: {0}")]
    EvaluationFailed(String),
}
