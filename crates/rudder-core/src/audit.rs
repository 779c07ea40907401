//! Audit trail
//!
//! Every transaction that reaches the pipeline leaves exactly one audit
//! entry: success or failure for applies and reverts, a preview entry for
//! previews. Permission and validation rejections happen before the
//! pipeline and leave none.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of operation the entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    /// A control was applied (or the apply failed)
    Apply,
    /// A control was reverted
    Revert,
    /// A preview was served
    Preview,
}

/// How the operation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditResult {
    /// Committed
    Success,
    /// Denied by policy
    Denied,
    /// Failed and rolled back
    Failure,
}

/// One audit trail entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Control instance id
    pub control_id: String,
    /// Mutation kind
    pub kind: String,
    /// Acting identity
    pub actor_id: String,
    /// When the entry was written
    pub at: DateTime<Utc>,
    /// Operation recorded
    pub action: AuditAction,
    /// How it ended
    pub result: AuditResult,
    /// Deny reasons, failure message, or preview summary
    pub detail: String,
}

impl AuditEntry {
    pub(crate) fn new(
        control_id: impl Into<String>,
        kind: impl Into<String>,
        actor_id: impl Into<String>,
        action: AuditAction,
        result: AuditResult,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            control_id: control_id.into(),
            kind: kind.into(),
            actor_id: actor_id.into(),
            at: Utc::now(),
            action,
            result,
            detail: detail.into(),
        }
    }
}

/// Destination for audit entries
///
/// Sinks usually talk to external storage, so `record` is async.
#[async_trait]
pub trait AuditSink: Send + Sync + fmt::Debug {
    /// Persist one entry
    ///
    /// # Errors
    /// Returns a message when the entry could not be persisted; inside the
    /// commit region the coordinator treats that as a transaction failure.
    async fn record(&self, entry: AuditEntry) -> Result<(), String>;
}

/// Audit sink that emits structured log events
#[derive(Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<(), String> {
        tracing::info!(
            control = %entry.control_id,
            kind = %entry.kind,
            actor = %entry.actor_id,
            action = ?entry.action,
            result = ?entry.result,
            detail = %entry.detail,
            "audit"
        );
        Ok(())
    }
}
