//! Policy governance through the coordinator: denials, owner locks,
//! previews, and required metadata.

use pretty_assertions::assert_eq;
use rudder_core::{
    ApplyOptions, AuditAction, AuditResult, ControlFilter, CoordinatorError, SetValues,
    TransactionCoordinator,
};
use rudder_policy::{CompliancePolicy, OwnerLockPolicy, SafetyPolicy};
use rudder_store::QueryFilter;
use rudder_testkit::{
    bystander, coordinator_with, int_state, operator, MalformedMutation, MemoryAuditSink,
    ScriptedMutation,
};
use rudder_value::{DiffKind, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

#[tokio::test]
async fn denial_reports_every_deny_reason() {
    let coordinator = coordinator_with(&[]);
    coordinator
        .register_policy(Arc::new(SafetyPolicy::new().forbid_operation("apply")))
        .await
        .unwrap();
    coordinator
        .register_policy(Arc::new(
            CompliancePolicy::new().require_key("apply", "ticket"),
        ))
        .await
        .unwrap();

    let err = coordinator
        .apply(
            &SetValues::new("tune").set("x", 1_i64),
            &operator("u1"),
            ApplyOptions::default(),
        )
        .await
        .unwrap_err();

    let CoordinatorError::PolicyViolation { reasons } = err else {
        panic!("expected policy violation");
    };
    // Both policies ran; neither short-circuited the other.
    assert!(reasons.contains("forbidden by safety policy"));
    assert!(reasons.contains("requires metadata"));
    assert!(reasons.contains("; "));
}

#[tokio::test]
async fn denied_apply_leaves_one_denied_audit_entry() {
    let sink = Arc::new(MemoryAuditSink::new());
    let coordinator = TransactionCoordinator::builder()
        .audit_sink(sink.clone())
        .build();
    coordinator
        .register_policy(Arc::new(SafetyPolicy::new().forbid_operation("apply")))
        .await
        .unwrap();

    let _ = coordinator
        .apply(
            &SetValues::new("tune").set("x", 1_i64),
            &operator("u1"),
            ApplyOptions::default(),
        )
        .await
        .unwrap_err();

    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, AuditAction::Apply);
    assert_eq!(entries[0].result, AuditResult::Denied);
    assert!(coordinator.list(&ControlFilter::any(), 0, 50).items.is_empty());
}

#[tokio::test]
async fn owner_lock_blocks_non_owner_and_admits_owner() {
    let coordinator = coordinator_with(&[("R1.mode", 0)]);
    let locks = Arc::new(OwnerLockPolicy::new());
    coordinator.register_policy(locks.clone()).await.unwrap();
    assert!(locks.add_lock("R1", "u1", ["delete".to_string()]));

    let mutation = ScriptedMutation::setting("guarded", "R1.mode", 1_i64)
        .with_operation("delete")
        .on_resource("R1");

    let err = coordinator
        .apply(&mutation, &operator("u2"), ApplyOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::PolicyViolation { .. }));
    assert_eq!(
        coordinator.live_state().await.get("R1.mode"),
        Some(&Value::from(0_i64))
    );

    // The owner overrides their own lock.
    coordinator
        .apply(&mutation, &operator("u1"), ApplyOptions::default())
        .await
        .unwrap();
    assert_eq!(
        coordinator.live_state().await.get("R1.mode"),
        Some(&Value::from(1_i64))
    );
}

#[tokio::test]
async fn owner_lock_override_outranks_other_denials() {
    let coordinator = coordinator_with(&[]);
    let locks = Arc::new(OwnerLockPolicy::new());
    coordinator.register_policy(locks.clone()).await.unwrap();
    coordinator
        .register_policy(Arc::new(SafetyPolicy::new().forbid_operation("delete")))
        .await
        .unwrap();
    assert!(locks.add_lock("R1", "u1", ["delete".to_string()]));

    let mutation = ScriptedMutation::setting("guarded", "gone", 1_i64)
        .with_operation("delete")
        .on_resource("R1");

    let applied = coordinator
        .apply(&mutation, &operator("u1"), ApplyOptions::default())
        .await
        .unwrap();
    assert!(applied.verdict.allowed);
}

#[tokio::test]
async fn disabled_policy_no_longer_denies() {
    let coordinator = coordinator_with(&[]);
    coordinator
        .register_policy(Arc::new(SafetyPolicy::new().forbid_operation("apply")))
        .await
        .unwrap();
    let mutation = SetValues::new("tune").set("x", 1_i64);

    assert!(coordinator
        .apply(&mutation, &operator("u1"), ApplyOptions::default())
        .await
        .is_err());

    coordinator.disable_policy("safety").await.unwrap();
    coordinator
        .apply(&mutation, &operator("u1"), ApplyOptions::default())
        .await
        .unwrap();

    coordinator.enable_policy("safety").await.unwrap();
    assert!(coordinator
        .apply(&mutation, &operator("u1"), ApplyOptions::default())
        .await
        .is_err());
}

#[tokio::test]
async fn warnings_flow_into_the_verdict() {
    let coordinator = coordinator_with(&[]);
    coordinator
        .register_policy(Arc::new(SafetyPolicy::new().warn_on_operation("apply")))
        .await
        .unwrap();

    let applied = coordinator
        .apply(
            &SetValues::new("tune").set("x", 1_i64),
            &operator("u1"),
            ApplyOptions::default(),
        )
        .await
        .unwrap();
    assert!(applied.verdict.allowed);
    assert_eq!(applied.verdict.warnings.len(), 1);
}

#[tokio::test]
async fn required_metadata_is_fed_from_apply_options() {
    let coordinator = coordinator_with(&[]);
    coordinator
        .register_policy(Arc::new(
            CompliancePolicy::new().require_key("apply", "ticket"),
        ))
        .await
        .unwrap();
    let mutation = SetValues::new("tune").set("x", 1_i64);

    assert!(coordinator
        .apply(&mutation, &operator("u1"), ApplyOptions::default())
        .await
        .is_err());

    coordinator
        .apply(
            &mutation,
            &operator("u1"),
            ApplyOptions::default().with_metadata("ticket", "CHG-42"),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn preview_projects_without_side_effects() {
    let sink = Arc::new(MemoryAuditSink::new());
    let coordinator = TransactionCoordinator::builder()
        .initial_state(int_state(&[("limit", 1)]))
        .audit_sink(sink.clone())
        .build();
    let snapshots_before = coordinator.snapshots(&QueryFilter::any()).await.len();

    let report = coordinator
        .preview(
            &SetValues::new("tune").set("limit", 5_i64),
            &operator("u1"),
            BTreeMap::new(),
        )
        .await
        .unwrap();

    assert!(report.would_apply());
    assert_eq!(report.diff.len(), 1);
    assert_eq!(report.diff[0].path.to_string(), "limit");
    assert_eq!(report.diff[0].kind, DiffKind::Modified);
    assert_eq!(report.projected.get("limit"), Some(&Value::from(5_i64)));

    // Live state, the snapshot list, and the ledger are untouched.
    assert_eq!(coordinator.live_state().await, int_state(&[("limit", 1)]));
    assert_eq!(
        coordinator.snapshots(&QueryFilter::any()).await.len(),
        snapshots_before
    );
    assert!(coordinator.list(&ControlFilter::any(), 0, 50).items.is_empty());

    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, AuditAction::Preview);
}

#[tokio::test]
async fn preview_is_idempotent() {
    let coordinator = coordinator_with(&[("limit", 1)]);
    let mutation = SetValues::new("tune").set("limit", 5_i64);

    let first = coordinator
        .preview(&mutation, &operator("u1"), BTreeMap::new())
        .await
        .unwrap();
    let second = coordinator
        .preview(&mutation, &operator("u1"), BTreeMap::new())
        .await
        .unwrap();

    assert_eq!(first.diff, second.diff);
    assert_eq!(first.projected, second.projected);
}

#[tokio::test]
async fn preview_reports_denial_instead_of_failing() {
    let coordinator = coordinator_with(&[]);
    coordinator
        .register_policy(Arc::new(SafetyPolicy::new().forbid_operation("apply")))
        .await
        .unwrap();

    let report = coordinator
        .preview(
            &SetValues::new("tune").set("x", 1_i64),
            &operator("u1"),
            BTreeMap::new(),
        )
        .await
        .unwrap();

    assert!(!report.would_apply());
    assert_eq!(report.diff.len(), 1);
}

#[tokio::test]
async fn preview_requires_permission() {
    let coordinator = coordinator_with(&[]);
    let err = coordinator
        .preview(
            &SetValues::new("tune").set("x", 1_i64),
            &bystander("u2"),
            BTreeMap::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::Permission { .. }));
}

#[tokio::test]
async fn preview_first_aborts_before_any_snapshot() {
    let sink = Arc::new(MemoryAuditSink::new());
    let coordinator = TransactionCoordinator::builder()
        .audit_sink(sink.clone())
        .build();

    let err = coordinator
        .apply(
            &MalformedMutation,
            &operator("u1"),
            ApplyOptions::default().preview_first(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CoordinatorError::Store(_)));
    // The dry run caught it before the pipeline snapshotted anything.
    assert!(sink.is_empty());
    assert!(coordinator.list(&ControlFilter::any(), 0, 50).items.is_empty());
}

#[tokio::test]
async fn preview_first_runs_before_the_policy_chain() {
    let sink = Arc::new(MemoryAuditSink::new());
    let coordinator = TransactionCoordinator::builder()
        .audit_sink(sink.clone())
        .build();
    coordinator
        .register_policy(Arc::new(SafetyPolicy::new().forbid_operation("apply")))
        .await
        .unwrap();

    // Both the dry run and the chain would reject this; the dry-run
    // failure surfaces, and no denial is recorded.
    let err = coordinator
        .apply(
            &MalformedMutation,
            &operator("u1"),
            ApplyOptions::default().preview_first(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CoordinatorError::Store(_)));
    assert!(sink.is_empty());
}

#[tokio::test]
async fn policy_ids_reflect_evaluation_order() {
    let coordinator = coordinator_with(&[]);
    coordinator
        .register_policy(Arc::new(CompliancePolicy::new()))
        .await
        .unwrap();
    let locks = Arc::new(OwnerLockPolicy::new());
    coordinator.register_policy(locks).await.unwrap();

    // Owner lock holds the maximum priority and evaluates first.
    assert_eq!(coordinator.policy_ids().await, vec!["owner-lock", "compliance"]);
}
