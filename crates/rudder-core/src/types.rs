//! Coordinator request and result types

use rudder_policy::PolicyVerdict;
use rudder_store::{ControlRecord, ControlStatus, SnapshotId, StateChange};
use rudder_value::{DiffEntry, Value};
use std::collections::BTreeMap;

/// Per-apply options
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Run a preview first and abort if the preview's policy verdict denies
    pub preview_first: bool,
    /// Context metadata; fed to policy evaluation and stamped on the
    /// pre-mutation snapshot
    pub metadata: BTreeMap<String, String>,
}

impl ApplyOptions {
    /// Attach one metadata key
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Request a preview before the real apply
    #[inline]
    #[must_use]
    pub fn preview_first(mut self) -> Self {
        self.preview_first = true;
        self
    }
}

/// Result of a committed apply
#[derive(Debug, Clone)]
pub struct AppliedControl {
    /// Generated control instance id
    pub control_id: String,
    /// Pre-mutation snapshot the control pairs with
    pub snapshot_id: SnapshotId,
    /// Systems the mutation declared it touches
    pub affected_systems: Vec<String>,
    /// The committed state transition
    pub change: StateChange,
    /// Verdict the policy chain returned
    pub verdict: PolicyVerdict,
}

/// Result of a revert
#[derive(Debug, Clone)]
pub struct RevertedControl {
    /// The control that was undone
    pub control_id: String,
    /// Pre-mutation snapshot the control was paired with, when it is
    /// still retained
    pub reverted_to: Option<SnapshotId>,
    /// The reverting state transition
    pub change: StateChange,
}

/// Result of a preview: what an apply would do, without doing it
#[derive(Debug, Clone)]
pub struct PreviewReport {
    /// Verdict the policy chain would return for the real apply
    pub verdict: PolicyVerdict,
    /// Systems the mutation declares it would touch
    pub affected_systems: Vec<String>,
    /// Structural difference between live state and the projected state
    pub diff: Vec<DiffEntry>,
    /// The projected post-apply state
    pub projected: BTreeMap<String, Value>,
}

impl PreviewReport {
    /// Whether the real apply would be admitted by policy
    #[inline]
    #[must_use]
    pub fn would_apply(&self) -> bool {
        self.verdict.allowed
    }
}

/// Failure handling for a batch of mutations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchMode {
    /// Apply every mutation; failures do not stop the rest
    #[default]
    BestEffort,
    /// First failure reverts all prior successes, in reverse order
    Atomic,
}

/// Per-mutation outcomes of a batch apply, in input order
#[derive(Debug)]
pub struct BatchReport {
    /// One result per submitted mutation
    pub results: Vec<Result<AppliedControl, crate::error::CoordinatorError>>,
}

impl BatchReport {
    /// Whether every mutation committed
    #[must_use]
    pub fn all_applied(&self) -> bool {
        self.results.iter().all(Result::is_ok)
    }

    /// Control ids of the committed mutations
    #[must_use]
    pub fn applied_ids(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .map(|a| a.control_id.as_str())
            .collect()
    }
}

/// One page of ledger entries, newest-first
#[derive(Debug, Clone)]
pub struct ControlPage {
    /// Entries on this page
    pub items: Vec<ControlRecord>,
    /// Zero-based page index
    pub page: usize,
    /// Requested page size
    pub page_size: usize,
    /// Matching entries across all pages
    pub total: usize,
}

impl ControlPage {
    /// Whether a later page exists
    #[inline]
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.page_size != 0 && (self.page + 1) * self.page_size < self.total
    }
}

/// Ledger filter for [`crate::TransactionCoordinator::list`]; unset fields
/// match everything
#[derive(Debug, Clone, Default)]
pub struct ControlFilter {
    /// Only controls of this mutation kind
    pub kind: Option<String>,
    /// Only controls applied by this actor
    pub actor_id: Option<String>,
    /// Only controls with this status
    pub status: Option<ControlStatus>,
}

impl ControlFilter {
    /// Filter matching every ledger entry
    #[inline]
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Restrict to one mutation kind
    #[must_use]
    pub fn for_kind(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            ..Self::default()
        }
    }

    pub(crate) fn matches(&self, record: &ControlRecord) -> bool {
        if let Some(kind) = &self.kind {
            if &record.kind != kind {
                return false;
            }
        }
        if let Some(actor_id) = &self.actor_id {
            if &record.actor_id != actor_id {
                return false;
            }
        }
        if let Some(status) = &self.status {
            if &record.status != status {
                return false;
            }
        }
        true
    }
}
