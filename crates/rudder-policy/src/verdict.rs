//! Policy trait, evaluation context, and verdicts

use crate::error::PolicyError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Evaluation context for one requested operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyContext {
    /// Requesting actor
    pub actor_id: String,
    /// Requested operation name
    pub operation: String,
    /// Target resource, when the operation has one
    pub resource_id: Option<String>,
    /// Actor's role type
    pub role_type: String,
    /// Free-form request metadata (change tickets, reasons, ...)
    pub metadata: BTreeMap<String, String>,
}

impl PolicyContext {
    /// Context for an operation without a target resource
    #[must_use]
    pub fn new(
        actor_id: impl Into<String>,
        operation: impl Into<String>,
        role_type: impl Into<String>,
    ) -> Self {
        Self {
            actor_id: actor_id.into(),
            operation: operation.into(),
            resource_id: None,
            role_type: role_type.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Set the target resource
    #[inline]
    #[must_use]
    pub fn with_resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Add one metadata entry
    #[inline]
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A single policy's stance on a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// No objection
    Allow,
    /// Objection; the chain denies unless an override is present
    Deny,
    /// Authoritative allow that outranks denials. Honored only from
    /// maximum-priority policies (the owner acting on their own lock);
    /// the chain downgrades it to a plain allow from anything lower.
    AllowOverride,
}

/// One policy's decision for one context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    /// Stance
    pub outcome: Outcome,
    /// Denial reason (or override justification)
    pub reason: Option<String>,
    /// Non-blocking advisories
    pub warnings: Vec<String>,
}

impl PolicyDecision {
    /// Plain allow
    #[inline]
    #[must_use]
    pub fn allow() -> Self {
        Self {
            outcome: Outcome::Allow,
            reason: None,
            warnings: Vec::new(),
        }
    }

    /// Deny with a reason
    #[inline]
    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Deny,
            reason: Some(reason.into()),
            warnings: Vec::new(),
        }
    }

    /// Authoritative allow (owner self-access)
    #[inline]
    #[must_use]
    pub fn allow_override(reason: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::AllowOverride,
            reason: Some(reason.into()),
            warnings: Vec::new(),
        }
    }

    /// Attach a warning
    #[inline]
    #[must_use]
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// Aggregated chain verdict; ephemeral, produced per call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyVerdict {
    /// Final decision
    pub allowed: bool,
    /// Concatenated deny reasons (all denying policies, `"; "`-joined)
    pub reason: Option<String>,
    /// Every policy that was evaluated, in evaluation order
    pub evaluated_policies: Vec<String>,
    /// Warnings from every evaluated policy
    pub warnings: Vec<String>,
}

/// An allow/deny rule evaluator
///
/// Policies own their internal state and must be internally synchronized;
/// the chain evaluates them through a shared reference.
#[async_trait]
pub trait Policy: Send + Sync + Debug {
    /// Stable identifier, unique within a chain
    fn id(&self) -> &str;

    /// Evaluation priority; higher evaluates first. [`crate::OWNER_LOCK_PRIORITY`]
    /// is reserved for owner locks.
    fn priority(&self) -> u32;

    /// Registration-time sanity check
    ///
    /// # Errors
    /// `ValidationFailed` when the policy is misconfigured.
    fn validate(&self) -> Result<(), PolicyError> {
        Ok(())
    }

    /// Evaluate one request
    ///
    /// # Errors
    /// An `Err` is treated by the chain as a denial, never as an allow.
    async fn evaluate(&self, ctx: &PolicyContext) -> Result<PolicyDecision, PolicyError>;
}
