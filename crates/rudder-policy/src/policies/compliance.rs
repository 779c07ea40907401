//! Compliance policy
//!
//! Change-governance rule: configured operations must carry required
//! context-metadata keys (change ticket, reason, approver) before they may
//! proceed.

use crate::error::PolicyError;
use crate::verdict::{Policy, PolicyContext, PolicyDecision};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};

/// Required-metadata governance rules per operation
#[derive(Debug, Default)]
pub struct CompliancePolicy {
    priority: u32,
    required: HashMap<String, BTreeSet<String>>,
}

impl CompliancePolicy {
    /// Default compliance priority
    pub const DEFAULT_PRIORITY: u32 = 400;

    /// Empty rule set at the default priority
    #[must_use]
    pub fn new() -> Self {
        Self {
            priority: Self::DEFAULT_PRIORITY,
            required: HashMap::new(),
        }
    }

    /// Override the evaluation priority
    #[inline]
    #[must_use]
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Require a metadata key for an operation
    #[must_use]
    pub fn require_key(
        mut self,
        operation: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        self.required
            .entry(operation.into())
            .or_default()
            .insert(key.into());
        self
    }
}

#[async_trait]
impl Policy for CompliancePolicy {
    fn id(&self) -> &str {
        "compliance"
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    async fn evaluate(&self, ctx: &PolicyContext) -> Result<PolicyDecision, PolicyError> {
        let Some(required) = self.required.get(&ctx.operation) else {
            return Ok(PolicyDecision::allow());
        };
        let missing: Vec<&str> = required
            .iter()
            .filter(|key| {
                ctx.metadata
                    .get(key.as_str())
                    .map_or(true, |v| v.trim().is_empty())
            })
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            Ok(PolicyDecision::allow())
        } else {
            Ok(PolicyDecision::deny(format!(
                "operation '{}' requires metadata: {}",
                ctx.operation,
                missing.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verdict::Outcome;

    #[tokio::test]
    async fn unlisted_operation_allows() {
        let policy = CompliancePolicy::new().require_key("apply", "ticket");
        let ctx = PolicyContext::new("u1", "read", "operator");
        assert_eq!(policy.evaluate(&ctx).await.unwrap().outcome, Outcome::Allow);
    }

    #[tokio::test]
    async fn missing_key_denies_and_names_it() {
        let policy = CompliancePolicy::new()
            .require_key("apply", "ticket")
            .require_key("apply", "reason");
        let ctx = PolicyContext::new("u1", "apply", "operator").with_metadata("ticket", "CHG-7");

        let decision = policy.evaluate(&ctx).await.unwrap();
        assert_eq!(decision.outcome, Outcome::Deny);
        assert!(decision.reason.unwrap().contains("reason"));
    }

    #[tokio::test]
    async fn blank_value_counts_as_missing() {
        let policy = CompliancePolicy::new().require_key("apply", "ticket");
        let ctx = PolicyContext::new("u1", "apply", "operator").with_metadata("ticket", "  ");
        assert_eq!(policy.evaluate(&ctx).await.unwrap().outcome, Outcome::Deny);
    }

    #[tokio::test]
    async fn complete_metadata_allows() {
        let policy = CompliancePolicy::new().require_key("apply", "ticket");
        let ctx = PolicyContext::new("u1", "apply", "operator").with_metadata("ticket", "CHG-7");
        assert_eq!(policy.evaluate(&ctx).await.unwrap().outcome, Outcome::Allow);
    }
}
