//! Safety policy
//!
//! Static deny-lists for operations and resources that must never be
//! touched through the control plane, plus a warn-list for operations that
//! are allowed but deserve operator attention.

use crate::error::PolicyError;
use crate::verdict::{Policy, PolicyContext, PolicyDecision};
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Deny-list / warn-list safety rules
#[derive(Debug, Default)]
pub struct SafetyPolicy {
    priority: u32,
    forbidden_operations: BTreeSet<String>,
    protected_resources: BTreeSet<String>,
    risky_operations: BTreeSet<String>,
}

impl SafetyPolicy {
    /// Default safety priority (below owner locks, above rate limiting)
    pub const DEFAULT_PRIORITY: u32 = 800;

    /// Empty rule set at the default priority
    #[must_use]
    pub fn new() -> Self {
        Self {
            priority: Self::DEFAULT_PRIORITY,
            ..Self::default()
        }
    }

    /// Override the evaluation priority
    #[inline]
    #[must_use]
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Deny an operation outright
    #[inline]
    #[must_use]
    pub fn forbid_operation(mut self, operation: impl Into<String>) -> Self {
        self.forbidden_operations.insert(operation.into());
        self
    }

    /// Deny any operation against a resource
    #[inline]
    #[must_use]
    pub fn protect_resource(mut self, resource_id: impl Into<String>) -> Self {
        self.protected_resources.insert(resource_id.into());
        self
    }

    /// Allow an operation but attach a warning
    #[inline]
    #[must_use]
    pub fn warn_on_operation(mut self, operation: impl Into<String>) -> Self {
        self.risky_operations.insert(operation.into());
        self
    }
}

#[async_trait]
impl Policy for SafetyPolicy {
    fn id(&self) -> &str {
        "safety"
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn validate(&self) -> Result<(), PolicyError> {
        if self.priority == crate::OWNER_LOCK_PRIORITY {
            return Err(PolicyError::ValidationFailed(
                "safety policy may not use the owner-lock priority".to_string(),
            ));
        }
        Ok(())
    }

    async fn evaluate(&self, ctx: &PolicyContext) -> Result<PolicyDecision, PolicyError> {
        if self.forbidden_operations.contains(&ctx.operation) {
            return Ok(PolicyDecision::deny(format!(
                "operation '{}' is forbidden by safety policy",
                ctx.operation
            )));
        }
        if let Some(resource_id) = &ctx.resource_id {
            if self.protected_resources.contains(resource_id) {
                return Ok(PolicyDecision::deny(format!(
                    "resource '{resource_id}' is protected by safety policy"
                )));
            }
        }
        let mut decision = PolicyDecision::allow();
        if self.risky_operations.contains(&ctx.operation) {
            decision = decision.with_warning(format!(
                "operation '{}' is flagged as risky",
                ctx.operation
            ));
        }
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verdict::Outcome;

    #[tokio::test]
    async fn forbidden_operation_denies() {
        let policy = SafetyPolicy::new().forbid_operation("factory-reset");
        let ctx = PolicyContext::new("u1", "factory-reset", "admin");
        let decision = policy.evaluate(&ctx).await.unwrap();
        assert_eq!(decision.outcome, Outcome::Deny);
    }

    #[tokio::test]
    async fn protected_resource_denies_any_operation() {
        let policy = SafetyPolicy::new().protect_resource("prod-db");
        let ctx = PolicyContext::new("u1", "update", "admin").with_resource("prod-db");
        let decision = policy.evaluate(&ctx).await.unwrap();
        assert_eq!(decision.outcome, Outcome::Deny);
    }

    #[tokio::test]
    async fn risky_operation_allows_with_warning() {
        let policy = SafetyPolicy::new().warn_on_operation("bulk-update");
        let ctx = PolicyContext::new("u1", "bulk-update", "admin");
        let decision = policy.evaluate(&ctx).await.unwrap();
        assert_eq!(decision.outcome, Outcome::Allow);
        assert_eq!(decision.warnings.len(), 1);
    }

    #[test]
    fn owner_lock_priority_is_rejected() {
        let policy = SafetyPolicy::new().with_priority(u32::MAX);
        assert!(matches!(
            policy.validate(),
            Err(PolicyError::ValidationFailed(_))
        ));
    }
}
