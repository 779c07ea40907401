//! Snapshot store data model

use chrono::{DateTime, Utc};
use rudder_value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

/// Collision-resistant snapshot identifier (UUID v4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotId(Uuid);

impl SnapshotId {
    /// Generate a fresh id
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Immutable, timestamped deep copy of full state plus the active-control
/// set at capture time
///
/// Owned exclusively by the store; destroyed on retention eviction or
/// explicit age-based cleanup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Snapshot id
    pub id: SnapshotId,
    /// Capture time
    pub created_at: DateTime<Utc>,
    /// Deep-copied state tree; never aliases live state
    pub state: BTreeMap<String, Value>,
    /// Controls active when the snapshot was taken
    pub active_controls: BTreeSet<String>,
    /// Caller-supplied tags
    pub metadata: BTreeMap<String, String>,
}

/// Outcome of an applied control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlStatus {
    /// Applied and committed
    Success,
    /// Mutation or commit failed
    Failed,
    /// Some affected systems updated, others not
    Partial,
}

/// One applied, revertible control
///
/// Created on commit, removed on revert. Paired 1:1 with the pre-mutation
/// snapshot, which is the basis for a full rollback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlRecord {
    /// Unique control instance id
    pub control_id: String,
    /// Mutation kind (discriminates control types for listing/filtering)
    pub kind: String,
    /// Actor that applied the control
    pub actor_id: String,
    /// Commit time
    pub applied_at: DateTime<Utc>,
    /// Pre-mutation snapshot this control pairs with
    pub snapshot_id: SnapshotId,
    /// Systems the mutation declared it touches
    pub affected_systems: Vec<String>,
    /// Commit outcome
    pub status: ControlStatus,
}

/// Classification of a state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
    /// First commit of a control
    Apply,
    /// Control reverted or snapshot restored
    Revert,
    /// Re-commit of an already-active control
    Modify,
}

/// One entry in the append-only state-transition log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    /// Control (or snapshot, for restores) that caused the transition
    pub control_id: String,
    /// Transition time
    pub at: DateTime<Utc>,
    /// Affected keys before the transition
    pub before: Value,
    /// Affected keys after the transition
    pub after: Value,
    /// Transition classification
    pub change_type: ChangeType,
}

/// Commit parameters for [`crate::SnapshotStore::commit_mutation`]
#[derive(Debug, Clone)]
pub struct CommitRequest {
    /// Unique control instance id
    pub control_id: String,
    /// Mutation kind
    pub kind: String,
    /// Applying actor
    pub actor_id: String,
    /// Declared affected systems
    pub affected_systems: Vec<String>,
    /// Pre-mutation snapshot the control record pairs with
    pub snapshot_id: SnapshotId,
}

/// Result of a successful [`crate::SnapshotStore::commit_mutation`]
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    /// Change-log entry describing the commit
    pub change: StateChange,
    /// Follow-up capture of the post-commit state; discard it when the
    /// transaction is rolled back afterwards
    pub follow_up: SnapshotId,
}

/// Snapshot query filter; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilter {
    /// Only snapshots whose active set contains this control
    pub control_id: Option<String>,
    /// Only snapshots captured inside this closed interval
    pub time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl QueryFilter {
    /// Filter matching every snapshot
    #[inline]
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Restrict to snapshots that have `control_id` active
    #[inline]
    #[must_use]
    pub fn for_control(control_id: impl Into<String>) -> Self {
        Self {
            control_id: Some(control_id.into()),
            ..Self::default()
        }
    }

    pub(crate) fn matches(&self, snapshot: &StateSnapshot) -> bool {
        if let Some(control_id) = &self.control_id {
            if !snapshot.active_controls.contains(control_id) {
                return false;
            }
        }
        if let Some((from, to)) = &self.time_range {
            if snapshot.created_at < *from || snapshot.created_at > *to {
                return false;
            }
        }
        true
    }

    /// Stable cache key for this filter
    pub(crate) fn cache_key(&self) -> String {
        let control = self.control_id.as_deref().unwrap_or("*");
        match &self.time_range {
            Some((from, to)) => {
                format!("{control}|{}|{}", from.timestamp_micros(), to.timestamp_micros())
            }
            None => format!("{control}|*|*"),
        }
    }
}
