//! Transaction coordinator
//!
//! Drives every governed mutation through the fixed pipeline: permission
//! check, policy evaluation, pre-mutation snapshot, mutation, commit,
//! audit. Any failure after the snapshot restores it, so a transaction is
//! either fully committed or leaves no state behind.

use crate::audit::{AuditAction, AuditEntry, AuditResult, AuditSink, TracingAuditSink};
use crate::error::CoordinatorError;
use crate::mutation::Mutation;
use crate::observer::{ControlEvent, CoordinatorObserver};
use crate::phase::{PhaseTracker, TxnPhase};
use crate::role::{Role, PERM_APPLY, PERM_PREVIEW, PERM_REVERT};
use crate::types::{
    AppliedControl, ApplyOptions, BatchMode, BatchReport, ControlFilter, ControlPage,
    PreviewReport, RevertedControl,
};
use rudder_policy::{Policy, PolicyChain, PolicyContext, PolicyError, PolicyVerdict};
use rudder_store::{
    CommitRequest, ControlRecord, ControlStatus, QueryFilter, SnapshotId, SnapshotStore,
    StateSnapshot, StoreConfig, StoreError,
};
use rudder_value::{diff, merge_overlay, DiffEntry, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use ulid::Ulid;

/// Coordinates governed mutations against a single snapshot store
///
/// The store mutex is held across the snapshot, mutation, commit, and
/// audit steps, so concurrent applies serialize and each one sees the
/// state its predecessor committed.
#[derive(Debug)]
pub struct TransactionCoordinator {
    store: Mutex<SnapshotStore>,
    policies: RwLock<PolicyChain>,
    audit: Arc<dyn AuditSink>,
    observers: Vec<Arc<dyn CoordinatorObserver>>,
    // Includes failed applies; store records cover active controls only.
    ledger: parking_lot::Mutex<Vec<ControlRecord>>,
}

/// Builder for [`TransactionCoordinator`]
#[derive(Debug, Default)]
pub struct CoordinatorBuilder {
    initial: BTreeMap<String, Value>,
    config: Option<StoreConfig>,
    audit: Option<Arc<dyn AuditSink>>,
    observers: Vec<Arc<dyn CoordinatorObserver>>,
}

impl CoordinatorBuilder {
    /// Seed the live state
    #[must_use]
    pub fn initial_state(mut self, state: BTreeMap<String, Value>) -> Self {
        self.initial = state;
        self
    }

    /// Override the store configuration
    #[must_use]
    pub fn store_config(mut self, config: StoreConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the default tracing audit sink
    #[must_use]
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Attach an event observer
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn CoordinatorObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Build the coordinator
    #[must_use]
    pub fn build(self) -> TransactionCoordinator {
        let config = self.config.unwrap_or_default();
        TransactionCoordinator {
            store: Mutex::new(SnapshotStore::new(self.initial, config)),
            policies: RwLock::new(PolicyChain::new()),
            audit: self.audit.unwrap_or_else(|| Arc::new(TracingAuditSink)),
            observers: self.observers,
            ledger: parking_lot::Mutex::new(Vec::new()),
        }
    }
}

impl TransactionCoordinator {
    /// Start building a coordinator
    #[must_use]
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::default()
    }

    /// Coordinator over `initial` state with defaults everywhere
    #[must_use]
    pub fn new(initial: BTreeMap<String, Value>) -> Self {
        Self::builder().initial_state(initial).build()
    }

    // ---- policy management ----

    /// Register a policy on the chain
    ///
    /// # Errors
    /// [`PolicyError::ValidationFailed`] for invalid or duplicate policies.
    pub async fn register_policy(&self, policy: Arc<dyn Policy>) -> Result<(), PolicyError> {
        self.policies.write().await.register(policy)
    }

    /// Re-enable a registered policy
    ///
    /// # Errors
    /// [`PolicyError::PolicyNotFound`] for an unknown id.
    pub async fn enable_policy(&self, id: &str) -> Result<(), PolicyError> {
        self.policies.write().await.enable(id)
    }

    /// Disable a registered policy without removing it
    ///
    /// # Errors
    /// [`PolicyError::PolicyNotFound`] for an unknown id.
    pub async fn disable_policy(&self, id: &str) -> Result<(), PolicyError> {
        self.policies.write().await.disable(id)
    }

    /// Ids of registered policies, in evaluation order
    pub async fn policy_ids(&self) -> Vec<String> {
        self.policies.read().await.policy_ids()
    }

    // ---- pipeline ----

    /// Apply a mutation through the full governance pipeline
    ///
    /// # Errors
    /// - [`CoordinatorError::Permission`] before any pipeline work
    /// - [`CoordinatorError::PolicyViolation`] when the chain denies
    /// - [`CoordinatorError::Validation`] when the mutation rejects input
    /// - [`CoordinatorError::Apply`] / [`CoordinatorError::Store`] /
    ///   [`CoordinatorError::Audit`] after rollback to the pre-mutation
    ///   snapshot
    pub async fn apply(
        &self,
        mutation: &dyn Mutation,
        role: &dyn Role,
        options: ApplyOptions,
    ) -> Result<AppliedControl, CoordinatorError> {
        let control_id = Ulid::new().to_string();
        let mut phase = PhaseTracker::new();

        check_permission(role, PERM_APPLY)?;
        phase.advance(TxnPhase::PermissionChecked);

        // The requested dry-run runs before governance: a mutation that
        // cannot even project a delta never reaches the policy chain.
        if options.preview_first {
            self.dry_run(mutation).await?;
        }

        let verdict = self.evaluate(mutation, role, &options.metadata).await;
        if !verdict.allowed {
            phase.fail();
            let reasons = verdict
                .reason
                .unwrap_or_else(|| "policy denied".to_string());
            self.audit_best_effort(AuditEntry::new(
                &control_id,
                mutation.kind(),
                role.actor_id(),
                AuditAction::Apply,
                AuditResult::Denied,
                reasons.clone(),
            ))
            .await;
            return Err(CoordinatorError::PolicyViolation { reasons });
        }
        phase.advance(TxnPhase::PolicyEvaluated);

        let mut store = self.store.lock().await;
        mutation.validate(store.live())?;

        let mut metadata = options.metadata.clone();
        metadata.insert("control".to_string(), control_id.clone());
        let snapshot_id = store.capture(metadata);
        phase.advance(TxnPhase::Snapshotted);

        let delta = match mutation.apply(store.live()).await {
            Ok(delta) => delta,
            Err(err) => {
                return self
                    .abort(&mut store, &mut phase, mutation, role, &control_id, snapshot_id, err)
                    .await;
            }
        };
        phase.advance(TxnPhase::Mutated);

        let request = CommitRequest {
            control_id: control_id.clone(),
            kind: mutation.kind().to_string(),
            actor_id: role.actor_id().to_string(),
            affected_systems: mutation.affected_systems(),
            snapshot_id,
        };
        let outcome = match store.commit_mutation(request, &delta) {
            Ok(outcome) => outcome,
            Err(err) => {
                return self
                    .abort(&mut store, &mut phase, mutation, role, &control_id, snapshot_id, err.into())
                    .await;
            }
        };

        let entry = AuditEntry::new(
            &control_id,
            mutation.kind(),
            role.actor_id(),
            AuditAction::Apply,
            AuditResult::Success,
            format!("applied by '{}'", role.actor_id()),
        );
        if let Err(message) = self.audit.record(entry).await {
            // The rolled-back commit must not leave its post-commit
            // capture queryable.
            store.discard_snapshot(outcome.follow_up);
            return self
                .abort(
                    &mut store,
                    &mut phase,
                    mutation,
                    role,
                    &control_id,
                    snapshot_id,
                    CoordinatorError::Audit(message),
                )
                .await;
        }
        phase.advance(TxnPhase::Audited);

        if let Some(record) = store.record(&control_id) {
            self.ledger.lock().push(record.clone());
        }
        drop(store);

        phase.advance(TxnPhase::Committed);
        tracing::info!(control = %control_id, kind = %mutation.kind(), "control applied");
        self.notify(&ControlEvent::Applied {
            control_id: control_id.clone(),
        });
        Ok(AppliedControl {
            control_id,
            snapshot_id,
            affected_systems: mutation.affected_systems(),
            change: outcome.change,
            verdict,
        })
    }

    /// Show what a mutation would do, with zero observable side effects
    ///
    /// Runs the mutation's preview against a copy of live state inside a
    /// throwaway snapshot; live state, the snapshot list, and the change
    /// log are untouched afterwards.
    ///
    /// # Errors
    /// [`CoordinatorError::Permission`], [`CoordinatorError::Validation`],
    /// or the mutation's own preview failure. A policy denial is reported
    /// in the verdict, not as an error.
    pub async fn preview(
        &self,
        mutation: &dyn Mutation,
        role: &dyn Role,
        metadata: BTreeMap<String, String>,
    ) -> Result<PreviewReport, CoordinatorError> {
        check_permission(role, PERM_PREVIEW)?;
        let verdict = self.evaluate(mutation, role, &metadata).await;
        let control_id = Ulid::new().to_string();

        let mut store = self.store.lock().await;
        mutation.validate(store.live())?;

        // Throwaway rollback guard; discarded below so previews never
        // count against retention.
        let guard_id = store.capture(BTreeMap::from([(
            "preview".to_string(),
            control_id.clone(),
        )]));

        let result = mutation.preview(store.live()).await;
        let delta = match result {
            Ok(delta) => delta,
            Err(err) => {
                store.discard_snapshot(guard_id);
                return Err(err);
            }
        };
        let Some(delta_map) = delta.as_map() else {
            store.discard_snapshot(guard_id);
            return Err(StoreError::InvalidDelta {
                kind: delta.kind_name(),
            }
            .into());
        };

        let mut projected = store.live().clone();
        merge_overlay(&mut projected, delta_map);
        let entries = diff(&store.live_state(), &Value::Map(projected.clone()));
        store.discard_snapshot(guard_id);
        drop(store);

        self.audit_best_effort(AuditEntry::new(
            &control_id,
            mutation.kind(),
            role.actor_id(),
            AuditAction::Preview,
            if verdict.allowed {
                AuditResult::Success
            } else {
                AuditResult::Denied
            },
            format!("{} change(s) projected", entries.len()),
        ))
        .await;
        self.notify(&ControlEvent::Previewed {
            control_id: control_id.clone(),
        });
        Ok(PreviewReport {
            verdict,
            affected_systems: mutation.affected_systems(),
            diff: entries,
            projected,
        })
    }

    /// Revert one active control, restoring the values it overwrote
    ///
    /// Keys other controls changed afterwards keep their later values.
    ///
    /// # Errors
    /// - [`CoordinatorError::Permission`] when the role lacks revert
    /// - [`CoordinatorError::PolicyViolation`] when the chain denies
    /// - [`CoordinatorError::NotFound`] for an unknown or inactive control
    pub async fn revert(
        &self,
        control_id: &str,
        role: &dyn Role,
    ) -> Result<RevertedControl, CoordinatorError> {
        check_permission(role, PERM_REVERT)?;

        let ctx = PolicyContext::new(role.actor_id(), "revert", role.role_type())
            .with_resource(control_id);
        let verdict = self.policies.read().await.evaluate(&ctx).await;
        let kind = self
            .ledger
            .lock()
            .iter()
            .find(|r| r.control_id == control_id)
            .map_or_else(String::new, |r| r.kind.clone());
        if !verdict.allowed {
            let reasons = verdict
                .reason
                .unwrap_or_else(|| "policy denied".to_string());
            self.audit_best_effort(AuditEntry::new(
                control_id,
                kind,
                role.actor_id(),
                AuditAction::Revert,
                AuditResult::Denied,
                reasons.clone(),
            ))
            .await;
            return Err(CoordinatorError::PolicyViolation { reasons });
        }

        let mut store = self.store.lock().await;
        // The paired snapshot may already be past retention.
        let reverted_to = store
            .record(control_id)
            .map(|r| r.snapshot_id)
            .filter(|id| store.get_snapshot(*id).is_some());
        let change = match store.revert_control(control_id) {
            Ok(change) => change,
            Err(StoreError::ControlNotActive(id)) => {
                return Err(CoordinatorError::NotFound(id));
            }
            Err(err) => return Err(err.into()),
        };
        drop(store);

        self.ledger.lock().retain(|r| r.control_id != control_id);
        // The revert itself already committed; a sink failure here is
        // logged, not raised.
        self.audit_best_effort(AuditEntry::new(
            control_id,
            kind,
            role.actor_id(),
            AuditAction::Revert,
            AuditResult::Success,
            format!("reverted by '{}'", role.actor_id()),
        ))
        .await;
        tracing::info!(control = %control_id, "control reverted");
        self.notify(&ControlEvent::Reverted {
            control_id: control_id.to_string(),
        });
        Ok(RevertedControl {
            control_id: control_id.to_string(),
            reverted_to,
            change,
        })
    }

    /// Apply a batch of mutations in order
    ///
    /// [`BatchMode::Atomic`] reverts prior successes in reverse order on
    /// the first failure and marks every other slot aborted.
    pub async fn apply_batch(
        &self,
        mutations: &[Box<dyn Mutation>],
        role: &dyn Role,
        mode: BatchMode,
        options: ApplyOptions,
    ) -> BatchReport {
        let mut results: Vec<Result<AppliedControl, CoordinatorError>> =
            Vec::with_capacity(mutations.len());
        let mut applied: Vec<String> = Vec::new();

        for (index, mutation) in mutations.iter().enumerate() {
            match self.apply(mutation.as_ref(), role, options.clone()).await {
                Ok(outcome) => {
                    applied.push(outcome.control_id.clone());
                    results.push(Ok(outcome));
                }
                Err(err) => {
                    results.push(Err(err));
                    if mode == BatchMode::Atomic {
                        for control_id in applied.iter().rev() {
                            if let Err(revert_err) = self.revert(control_id, role).await {
                                tracing::error!(
                                    control = %control_id,
                                    error = %revert_err,
                                    "batch rollback revert failed"
                                );
                            }
                        }
                        for result in &mut results {
                            if result.is_ok() {
                                *result = Err(CoordinatorError::apply("atomic batch aborted"));
                            }
                        }
                        for _ in (index + 1)..mutations.len() {
                            results.push(Err(CoordinatorError::apply("atomic batch aborted")));
                        }
                        break;
                    }
                }
            }
        }
        BatchReport { results }
    }

    // ---- ledger and store access ----

    /// One page of ledger entries matching `filter`, newest-first
    ///
    /// Includes failed applies; reverted controls are removed. `page` is
    /// zero-based.
    pub fn list(&self, filter: &ControlFilter, page: usize, page_size: usize) -> ControlPage {
        let matching: Vec<ControlRecord> = self
            .ledger
            .lock()
            .iter()
            .rev()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        let total = matching.len();
        let items = if page_size == 0 {
            Vec::new()
        } else {
            matching
                .into_iter()
                .skip(page * page_size)
                .take(page_size)
                .collect()
        };
        ControlPage {
            items,
            page,
            page_size,
            total,
        }
    }

    /// Copy of the live state map
    pub async fn live_state(&self) -> BTreeMap<String, Value> {
        self.store.lock().await.live().clone()
    }

    /// Capture a manual snapshot
    pub async fn snapshot(&self, metadata: BTreeMap<String, String>) -> SnapshotId {
        self.store.lock().await.capture(metadata)
    }

    /// Restore live state from a snapshot
    ///
    /// Controls not active in the snapshot are pruned from the ledger;
    /// failed entries are kept for traceability.
    ///
    /// # Errors
    /// [`CoordinatorError::Permission`] or a store failure.
    pub async fn restore_snapshot(
        &self,
        id: SnapshotId,
        role: &dyn Role,
    ) -> Result<(), CoordinatorError> {
        check_permission(role, PERM_REVERT)?;
        let mut store = self.store.lock().await;
        store.restore(id)?;
        let active = store.active_controls().clone();
        drop(store);
        self.ledger
            .lock()
            .retain(|r| r.status != ControlStatus::Success || active.contains(&r.control_id));
        Ok(())
    }

    /// Snapshots matching `filter`, newest-first
    pub async fn snapshots(&self, filter: &QueryFilter) -> Vec<StateSnapshot> {
        self.store.lock().await.query(filter)
    }

    /// Look up one snapshot
    pub async fn get_snapshot(&self, id: SnapshotId) -> Option<StateSnapshot> {
        self.store.lock().await.get_snapshot(id)
    }

    /// Structural difference between two snapshots
    ///
    /// # Errors
    /// [`CoordinatorError::Store`] when either id is unknown.
    pub async fn diff_snapshots(
        &self,
        a: SnapshotId,
        b: SnapshotId,
    ) -> Result<Vec<DiffEntry>, CoordinatorError> {
        Ok(self.store.lock().await.diff(a, b)?)
    }

    /// Destroy snapshots older than `age`; returns how many were removed
    pub async fn cleanup_snapshots_older_than(&self, age: chrono::Duration) -> usize {
        self.store.lock().await.cleanup_older_than(age)
    }

    /// Store cache statistics
    pub async fn cache_stats(&self) -> rudder_store::CacheStats {
        self.store.lock().await.cache_stats()
    }

    // ---- internals ----

    async fn evaluate(
        &self,
        mutation: &dyn Mutation,
        role: &dyn Role,
        metadata: &BTreeMap<String, String>,
    ) -> PolicyVerdict {
        let mut ctx = PolicyContext::new(role.actor_id(), mutation.operation(), role.role_type());
        if let Some(resource) = mutation.resource_id() {
            ctx = ctx.with_resource(resource);
        }
        for (key, value) in metadata {
            ctx = ctx.with_metadata(key.clone(), value.clone());
        }
        self.policies.read().await.evaluate(&ctx).await
    }

    // Preview pass used by preview_first: checks the mutation can produce
    // a well-formed delta before the real pipeline snapshots anything.
    async fn dry_run(&self, mutation: &dyn Mutation) -> Result<(), CoordinatorError> {
        let store = self.store.lock().await;
        let state = store.live().clone();
        drop(store);
        let delta = mutation.preview(&state).await?;
        if delta.as_map().is_none() {
            return Err(StoreError::InvalidDelta {
                kind: delta.kind_name(),
            }
            .into());
        }
        Ok(())
    }

    // Failure path after the pre-mutation snapshot: restore it, record a
    // failed ledger entry, write the single failure audit entry, and hand
    // back the original error.
    #[allow(clippy::too_many_arguments)]
    async fn abort<T>(
        &self,
        store: &mut SnapshotStore,
        phase: &mut PhaseTracker,
        mutation: &dyn Mutation,
        role: &dyn Role,
        control_id: &str,
        snapshot_id: SnapshotId,
        err: CoordinatorError,
    ) -> Result<T, CoordinatorError> {
        phase.fail();
        if let Err(restore_err) = store.restore(snapshot_id) {
            tracing::error!(
                control = %control_id,
                error = %restore_err,
                "rollback restore failed"
            );
        }
        phase.advance(TxnPhase::RolledBack);

        self.ledger.lock().push(ControlRecord {
            control_id: control_id.to_string(),
            kind: mutation.kind().to_string(),
            actor_id: role.actor_id().to_string(),
            applied_at: chrono::Utc::now(),
            snapshot_id,
            affected_systems: mutation.affected_systems(),
            status: ControlStatus::Failed,
        });
        self.audit_best_effort(AuditEntry::new(
            control_id,
            mutation.kind(),
            role.actor_id(),
            AuditAction::Apply,
            AuditResult::Failure,
            err.to_string(),
        ))
        .await;
        tracing::warn!(control = %control_id, error = %err, "transaction rolled back");
        self.notify(&ControlEvent::RolledBack {
            control_id: control_id.to_string(),
        });
        Err(err)
    }

    // A sink failure outside the commit region must not mask the outcome.
    async fn audit_best_effort(&self, entry: AuditEntry) {
        if let Err(message) = self.audit.record(entry).await {
            tracing::error!(error = %message, "audit sink rejected entry");
        }
    }

    fn notify(&self, event: &ControlEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}

fn check_permission(role: &dyn Role, permission: &str) -> Result<(), CoordinatorError> {
    if role.has_permission(permission) {
        Ok(())
    } else {
        Err(CoordinatorError::Permission {
            actor_id: role.actor_id().to_string(),
            permission: permission.to_string(),
        })
    }
}
