//! Snapshot store
//!
//! Single owner of live state, snapshots, control records, and the state
//! change log. The transaction coordinator serializes mutating access; the
//! store itself is a plain `&mut self` structure with no interior locking.

use crate::error::StoreError;
use crate::types::{
    ChangeType, CommitOutcome, CommitRequest, ControlRecord, ControlStatus, QueryFilter,
    SnapshotId, StateChange, StateSnapshot,
};
use chrono::{Duration, Utc};
use rudder_cache::ResultCache;
use rudder_value::{diff, merge_overlay, DiffEntry, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// Snapshot store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum retained snapshots; the oldest is evicted beyond this
    pub retention: usize,
    /// Whether snapshot/query lookups go through the result cache
    pub cache_enabled: bool,
    /// Default TTL for cached query results
    pub query_cache_ttl: std::time::Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            retention: 50,
            cache_enabled: true,
            query_cache_ttl: std::time::Duration::from_secs(30),
        }
    }
}

impl StoreConfig {
    /// Config with a specific retention bound
    #[inline]
    #[must_use]
    pub fn with_retention(retention: usize) -> Self {
        Self {
            retention,
            ..Self::default()
        }
    }

    /// Disable result caching (results must not change, only latency)
    #[inline]
    #[must_use]
    pub fn without_cache(mut self) -> Self {
        self.cache_enabled = false;
        self
    }
}

/// Versioned snapshot store
///
/// Holds the live state tree, immutable snapshots (oldest-first, bounded by
/// retention), active control records with their undo data, and the
/// append-only state change log.
#[derive(Debug)]
pub struct SnapshotStore {
    live: BTreeMap<String, Value>,
    snapshots: VecDeque<StateSnapshot>,
    active_controls: BTreeSet<String>,
    records: Vec<ControlRecord>,
    // Per-control inverse overlay captured at commit time; applying it
    // through merge_overlay undoes the control.
    undo: HashMap<String, BTreeMap<String, Value>>,
    changes: Vec<StateChange>,
    query_cache: ResultCache<String, Vec<StateSnapshot>>,
    snapshot_cache: ResultCache<SnapshotId, StateSnapshot>,
    config: StoreConfig,
}

impl SnapshotStore {
    /// Create a store around an initial live state
    #[must_use]
    pub fn new(initial: BTreeMap<String, Value>, config: StoreConfig) -> Self {
        Self {
            live: initial,
            snapshots: VecDeque::new(),
            active_controls: BTreeSet::new(),
            records: Vec::new(),
            undo: HashMap::new(),
            changes: Vec::new(),
            query_cache: ResultCache::with_ttl(config.query_cache_ttl),
            snapshot_cache: ResultCache::new(),
            config,
        }
    }

    /// Current live state as an owned value tree
    #[must_use]
    pub fn live_state(&self) -> Value {
        Value::Map(self.live.clone())
    }

    /// Borrow the live state map
    #[inline]
    #[must_use]
    pub fn live(&self) -> &BTreeMap<String, Value> {
        &self.live
    }

    /// Controls currently active
    #[inline]
    #[must_use]
    pub fn active_controls(&self) -> &BTreeSet<String> {
        &self.active_controls
    }

    /// Active control records, oldest-first
    #[inline]
    #[must_use]
    pub fn records(&self) -> &[ControlRecord] {
        &self.records
    }

    /// Record for one active control
    #[must_use]
    pub fn record(&self, control_id: &str) -> Option<&ControlRecord> {
        self.records.iter().find(|r| r.control_id == control_id)
    }

    /// Append-only state-transition log, oldest-first
    #[inline]
    #[must_use]
    pub fn change_log(&self) -> &[StateChange] {
        &self.changes
    }

    /// Query-cache counters, for observability
    #[must_use]
    pub fn cache_stats(&self) -> rudder_cache::CacheStats {
        self.query_cache.stats()
    }

    /// Capture an immutable snapshot of live state
    ///
    /// Deep-copies the state tree and active-control set, stores the
    /// snapshot, and evicts oldest-first past the retention bound.
    pub fn capture(&mut self, metadata: BTreeMap<String, String>) -> SnapshotId {
        let snapshot = StateSnapshot {
            id: SnapshotId::new(),
            created_at: Utc::now(),
            state: self.live.clone(),
            active_controls: self.active_controls.clone(),
            metadata,
        };
        let id = snapshot.id;
        tracing::debug!(snapshot = %id, "captured state snapshot");
        self.snapshots.push_back(snapshot);
        self.enforce_retention();
        self.query_cache.clear();
        id
    }

    fn enforce_retention(&mut self) {
        while self.snapshots.len() > self.config.retention {
            if let Some(evicted) = self.snapshots.pop_front() {
                tracing::debug!(snapshot = %evicted.id, "evicted snapshot past retention");
                self.snapshot_cache.remove(&evicted.id);
            }
        }
    }

    /// Replace live state with a snapshot's copy
    ///
    /// Restores both the state tree and the active-control set, and appends
    /// a `Revert` entry to the change log.
    ///
    /// # Errors
    /// [`StoreError::SnapshotNotFound`] for an unknown id.
    pub fn restore(&mut self, id: SnapshotId) -> Result<(), StoreError> {
        let snapshot = self
            .snapshots
            .iter()
            .find(|s| s.id == id)
            .ok_or(StoreError::SnapshotNotFound(id))?;

        let before = Value::Map(self.live.clone());
        self.live = snapshot.state.clone();
        self.active_controls = snapshot.active_controls.clone();

        // Records and undo data for controls that are no longer active
        // describe commits this restore just undid.
        let active = self.active_controls.clone();
        self.records.retain(|r| active.contains(&r.control_id));
        self.undo.retain(|control_id, _| active.contains(control_id));

        self.changes.push(StateChange {
            control_id: id.to_string(),
            at: Utc::now(),
            before,
            after: Value::Map(self.live.clone()),
            change_type: ChangeType::Revert,
        });
        self.query_cache.clear();
        tracing::info!(snapshot = %id, "restored state from snapshot");
        Ok(())
    }

    /// Merge a mutation's delta into live state
    ///
    /// Shallow key-level overlay: every top-level key in `delta` replaces
    /// the live key, and the delete sentinel removes it. Records per-key
    /// before/after, marks the control active (a re-commit of an active
    /// control logs as `Modify`), and takes a follow-up capture whose id
    /// the outcome reports for later discard on rollback.
    ///
    /// # Errors
    /// [`StoreError::InvalidDelta`] when `delta` is not a map.
    pub fn commit_mutation(
        &mut self,
        request: CommitRequest,
        delta: &Value,
    ) -> Result<CommitOutcome, StoreError> {
        let delta_map = delta.as_map().ok_or(StoreError::InvalidDelta {
            kind: delta.kind_name(),
        })?;

        let mut before = BTreeMap::new();
        let mut inverse = BTreeMap::new();
        for key in delta_map.keys() {
            match self.live.get(key) {
                Some(prev) => {
                    before.insert(key.clone(), prev.clone());
                    inverse.insert(key.clone(), prev.clone());
                }
                // Key did not exist: reverting must remove it again.
                None => {
                    inverse.insert(key.clone(), Value::delete_marker());
                }
            }
        }

        merge_overlay(&mut self.live, delta_map);

        let mut after = BTreeMap::new();
        for key in delta_map.keys() {
            if let Some(value) = self.live.get(key) {
                after.insert(key.clone(), value.clone());
            }
        }

        let already_active = self.active_controls.contains(&request.control_id);
        let change_type = if already_active {
            ChangeType::Modify
        } else {
            ChangeType::Apply
        };

        // Keep the earliest before-values so reverting a re-committed
        // control returns to the state preceding its first commit.
        let undo = self.undo.entry(request.control_id.clone()).or_default();
        for (key, value) in inverse {
            undo.entry(key).or_insert(value);
        }

        self.active_controls.insert(request.control_id.clone());
        // Follow-up capture of the post-commit state.
        let follow_up = self.capture(BTreeMap::from([(
            "control".to_string(),
            request.control_id.clone(),
        )]));

        if already_active {
            self.records.retain(|r| r.control_id != request.control_id);
        }
        self.records.push(ControlRecord {
            control_id: request.control_id.clone(),
            kind: request.kind,
            actor_id: request.actor_id,
            applied_at: Utc::now(),
            snapshot_id: request.snapshot_id,
            affected_systems: request.affected_systems,
            status: ControlStatus::Success,
        });

        let change = StateChange {
            control_id: request.control_id,
            at: Utc::now(),
            before: Value::Map(before),
            after: Value::Map(after),
            change_type,
        };
        self.changes.push(change.clone());
        self.query_cache.clear();
        tracing::info!(control = %change.control_id, ?change_type, "committed mutation");
        Ok(CommitOutcome { change, follow_up })
    }

    /// Undo one active control
    ///
    /// Restores the per-key before-values recorded at commit and removes
    /// the control from the active set.
    ///
    /// # Errors
    /// [`StoreError::ControlNotActive`] when the control is not active.
    pub fn revert_control(&mut self, control_id: &str) -> Result<StateChange, StoreError> {
        if !self.active_controls.contains(control_id) {
            return Err(StoreError::ControlNotActive(control_id.to_string()));
        }
        let undo = self
            .undo
            .remove(control_id)
            .ok_or_else(|| StoreError::ControlNotActive(control_id.to_string()))?;

        let mut before = BTreeMap::new();
        for key in undo.keys() {
            if let Some(value) = self.live.get(key) {
                before.insert(key.clone(), value.clone());
            }
        }

        merge_overlay(&mut self.live, &undo);

        let mut after = BTreeMap::new();
        for key in undo.keys() {
            if let Some(value) = self.live.get(key) {
                after.insert(key.clone(), value.clone());
            }
        }

        self.active_controls.remove(control_id);
        self.records.retain(|r| r.control_id != control_id);

        let change = StateChange {
            control_id: control_id.to_string(),
            at: Utc::now(),
            before: Value::Map(before),
            after: Value::Map(after),
            change_type: ChangeType::Revert,
        };
        self.changes.push(change.clone());
        self.query_cache.clear();
        tracing::info!(control = %control_id, "reverted control");
        Ok(change)
    }

    /// Look up one snapshot
    #[must_use]
    pub fn get_snapshot(&self, id: SnapshotId) -> Option<StateSnapshot> {
        if self.config.cache_enabled {
            if let Some(snapshot) = self.snapshot_cache.get(&id) {
                return Some(snapshot);
            }
        }
        let snapshot = self.snapshots.iter().find(|s| s.id == id).cloned()?;
        if self.config.cache_enabled {
            self.snapshot_cache.insert(id, snapshot.clone());
        }
        Some(snapshot)
    }

    /// Snapshots matching `filter`, newest-first
    #[must_use]
    pub fn query(&self, filter: &QueryFilter) -> Vec<StateSnapshot> {
        let key = filter.cache_key();
        if self.config.cache_enabled {
            if let Some(cached) = self.query_cache.get(&key) {
                return cached;
            }
        }
        let mut matches: Vec<StateSnapshot> = self
            .snapshots
            .iter()
            .rev()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        // rev() already yields newest-first; keep the explicit ordering in
        // case the backing collection changes.
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if self.config.cache_enabled {
            self.query_cache.insert(key, matches.clone());
        }
        matches
    }

    /// All snapshots, newest-first
    #[must_use]
    pub fn list_snapshots(&self) -> Vec<StateSnapshot> {
        self.query(&QueryFilter::any())
    }

    /// Structural difference between two snapshots
    ///
    /// # Errors
    /// [`StoreError::SnapshotNotFound`] when either id is unknown.
    pub fn diff(&self, a: SnapshotId, b: SnapshotId) -> Result<Vec<DiffEntry>, StoreError> {
        let left = self
            .get_snapshot(a)
            .ok_or(StoreError::SnapshotNotFound(a))?;
        let right = self
            .get_snapshot(b)
            .ok_or(StoreError::SnapshotNotFound(b))?;
        Ok(diff(
            &Value::Map(left.state),
            &Value::Map(right.state),
        ))
    }

    /// Destroy snapshots older than `age`; returns how many were removed
    pub fn cleanup_older_than(&mut self, age: Duration) -> usize {
        let cutoff = Utc::now() - age;
        let before = self.snapshots.len();
        let cache = &self.snapshot_cache;
        self.snapshots.retain(|s| {
            let keep = s.created_at >= cutoff;
            if !keep {
                cache.remove(&s.id);
            }
            keep
        });
        let removed = before - self.snapshots.len();
        if removed > 0 {
            self.query_cache.clear();
            tracing::debug!(removed, "cleaned up aged snapshots");
        }
        removed
    }

    /// Drop one snapshot without touching live state
    ///
    /// Used for throwaway preview snapshots so they never count against
    /// retention; returns false for an unknown id.
    pub fn discard_snapshot(&mut self, id: SnapshotId) -> bool {
        let before = self.snapshots.len();
        self.snapshots.retain(|s| s.id != id);
        let removed = self.snapshots.len() < before;
        if removed {
            self.snapshot_cache.remove(&id);
            self.query_cache.clear();
        }
        removed
    }

    /// Number of retained snapshots
    #[inline]
    #[must_use]
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }
}
