//! Apply/revert pipeline behavior: commit, audit, rollback, permissions.

use pretty_assertions::assert_eq;
use rudder_core::{
    ApplyOptions, AuditAction, AuditResult, ControlEvent, ControlFilter, CoordinatorError,
    SetValues, TransactionCoordinator,
};
use rudder_store::{ControlStatus, QueryFilter, StoreError};
use rudder_testkit::{
    bystander, coordinator_with, int_state, operator, FailingMutation, MalformedMutation,
    MemoryAuditSink, RecordingObserver,
};
use rudder_value::Value;
use std::sync::Arc;

fn audited_coordinator(
    entries: &[(&str, i64)],
) -> (TransactionCoordinator, Arc<MemoryAuditSink>, Arc<RecordingObserver>) {
    rudder_testkit::init_tracing();
    let sink = Arc::new(MemoryAuditSink::new());
    let observer = Arc::new(RecordingObserver::new());
    let coordinator = TransactionCoordinator::builder()
        .initial_state(int_state(entries))
        .audit_sink(sink.clone())
        .observer(observer.clone())
        .build();
    (coordinator, sink, observer)
}

#[tokio::test]
async fn apply_commits_audits_and_notifies() {
    let (coordinator, sink, observer) = audited_coordinator(&[("limit", 1)]);
    let mutation = SetValues::new("tune").set("limit", 5_i64);

    let applied = coordinator
        .apply(&mutation, &operator("u1"), ApplyOptions::default())
        .await
        .unwrap();

    let live = coordinator.live_state().await;
    assert_eq!(live.get("limit"), Some(&Value::from(5_i64)));

    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, AuditAction::Apply);
    assert_eq!(entries[0].result, AuditResult::Success);
    assert_eq!(entries[0].control_id, applied.control_id);

    let ledger = coordinator.list(&ControlFilter::any(), 0, 50).items;
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].status, ControlStatus::Success);

    assert_eq!(
        observer.events(),
        vec![ControlEvent::Applied {
            control_id: applied.control_id
        }]
    );
}

#[tokio::test]
async fn apply_without_permission_is_rejected_untraced() {
    let (coordinator, sink, _) = audited_coordinator(&[("limit", 1)]);
    let mutation = SetValues::new("tune").set("limit", 5_i64);

    let err = coordinator
        .apply(&mutation, &bystander("u2"), ApplyOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, CoordinatorError::Permission { .. }));
    assert!(err.is_denial());
    assert!(sink.is_empty());
    assert_eq!(
        coordinator.live_state().await.get("limit"),
        Some(&Value::from(1_i64))
    );
}

#[tokio::test]
async fn validation_failure_leaves_no_trace() {
    let (coordinator, sink, _) = audited_coordinator(&[]);
    // Empty overlay fails the mutation's own validation.
    let mutation = SetValues::new("tune");

    let err = coordinator
        .apply(&mutation, &operator("u1"), ApplyOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, CoordinatorError::Validation(_)));
    assert!(sink.is_empty());
    assert!(coordinator.list(&ControlFilter::any(), 0, 50).items.is_empty());
}

#[tokio::test]
async fn failed_apply_rolls_back_with_one_failure_entry() {
    let (coordinator, sink, observer) = audited_coordinator(&[("limit", 1)]);

    let err = coordinator
        .apply(
            &FailingMutation::new("backend exploded"),
            &operator("u1"),
            ApplyOptions::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CoordinatorError::Apply { .. }));
    assert_eq!(
        coordinator.live_state().await,
        int_state(&[("limit", 1)])
    );

    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].result, AuditResult::Failure);
    assert!(entries[0].detail.contains("backend exploded"));

    let ledger = coordinator.list(&ControlFilter::any(), 0, 50).items;
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].status, ControlStatus::Failed);

    assert!(matches!(
        observer.events().as_slice(),
        [ControlEvent::RolledBack { .. }]
    ));
}

#[tokio::test]
async fn malformed_delta_rolls_back() {
    let (coordinator, sink, _) = audited_coordinator(&[("limit", 1)]);

    let err = coordinator
        .apply(&MalformedMutation, &operator("u1"), ApplyOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CoordinatorError::Store(StoreError::InvalidDelta { .. })
    ));
    assert_eq!(
        coordinator.live_state().await,
        int_state(&[("limit", 1)])
    );
    assert_eq!(sink.len(), 1);
    assert_eq!(sink.entries()[0].result, AuditResult::Failure);
}

#[tokio::test]
async fn audit_sink_failure_rolls_back_the_commit() {
    let (coordinator, sink, _) = audited_coordinator(&[("limit", 1)]);
    let mutation = SetValues::new("tune").set("limit", 5_i64);

    sink.fail_next();
    let err = coordinator
        .apply(&mutation, &operator("u1"), ApplyOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, CoordinatorError::Audit(_)));
    // Committed state was restored from the pre-mutation snapshot.
    assert_eq!(
        coordinator.live_state().await,
        int_state(&[("limit", 1)])
    );
    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].result, AuditResult::Failure);

    // Only the rollback point survives; the post-commit capture was
    // discarded along with the transaction.
    let snapshots = coordinator.snapshots(&QueryFilter::any()).await;
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].state, int_state(&[("limit", 1)]));
}

#[tokio::test]
async fn revert_restores_values_and_clears_ledger() {
    let (coordinator, sink, observer) = audited_coordinator(&[("limit", 1)]);
    let mutation = SetValues::new("tune").set("limit", 5_i64).set("extra", 9_i64);

    let applied = coordinator
        .apply(&mutation, &operator("u1"), ApplyOptions::default())
        .await
        .unwrap();

    let reverted = coordinator
        .revert(&applied.control_id, &operator("u1"))
        .await
        .unwrap();

    assert_eq!(reverted.reverted_to, Some(applied.snapshot_id));
    assert_eq!(coordinator.live_state().await, int_state(&[("limit", 1)]));
    assert!(coordinator.list(&ControlFilter::any(), 0, 50).items.is_empty());

    let entries = sink.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].action, AuditAction::Revert);
    assert_eq!(entries[1].result, AuditResult::Success);

    assert_eq!(observer.events().len(), 2);
    assert!(matches!(
        observer.events()[1],
        ControlEvent::Reverted { .. }
    ));
}

#[tokio::test]
async fn revert_unknown_control_is_not_found() {
    let coordinator = coordinator_with(&[]);
    let err = coordinator
        .revert("no-such-control", &operator("u1"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::NotFound(_)));
}

#[tokio::test]
async fn revert_requires_permission() {
    let coordinator = coordinator_with(&[]);
    let err = coordinator
        .revert("anything", &bystander("u2"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::Permission { .. }));
}

#[tokio::test]
async fn reverting_one_control_keeps_later_changes() {
    let coordinator = coordinator_with(&[("x", 1), ("y", 1)]);
    let first = coordinator
        .apply(
            &SetValues::new("tune").set("x", 2_i64),
            &operator("u1"),
            ApplyOptions::default(),
        )
        .await
        .unwrap();
    coordinator
        .apply(
            &SetValues::new("tune").set("y", 2_i64),
            &operator("u1"),
            ApplyOptions::default(),
        )
        .await
        .unwrap();

    coordinator
        .revert(&first.control_id, &operator("u1"))
        .await
        .unwrap();

    let live = coordinator.live_state().await;
    assert_eq!(live.get("x"), Some(&Value::from(1_i64)));
    assert_eq!(live.get("y"), Some(&Value::from(2_i64)));
    assert_eq!(coordinator.list(&ControlFilter::any(), 0, 50).items.len(), 1);
}

#[tokio::test]
async fn deleted_keys_come_back_on_revert() {
    let coordinator = coordinator_with(&[("doomed", 7)]);
    let applied = coordinator
        .apply(
            &SetValues::new("cleanup").delete("doomed"),
            &operator("u1"),
            ApplyOptions::default(),
        )
        .await
        .unwrap();

    assert!(!coordinator.live_state().await.contains_key("doomed"));

    coordinator
        .revert(&applied.control_id, &operator("u1"))
        .await
        .unwrap();
    assert_eq!(
        coordinator.live_state().await.get("doomed"),
        Some(&Value::from(7_i64))
    );
}

#[tokio::test]
async fn ledger_filters_by_kind_and_actor() {
    let coordinator = coordinator_with(&[]);
    coordinator
        .apply(
            &SetValues::new("tune").set("a", 1_i64),
            &operator("u1"),
            ApplyOptions::default(),
        )
        .await
        .unwrap();
    coordinator
        .apply(
            &SetValues::new("rollout").set("b", 2_i64),
            &operator("u2"),
            ApplyOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(coordinator.list(&ControlFilter::for_kind("tune"), 0, 50).items.len(), 1);
    let by_actor = ControlFilter {
        actor_id: Some("u2".to_string()),
        ..ControlFilter::default()
    };
    assert_eq!(coordinator.list(&by_actor, 0, 50).items.len(), 1);
    assert_eq!(coordinator.list(&ControlFilter::any(), 0, 50).items.len(), 2);
}

#[tokio::test]
async fn ledger_pages_are_newest_first() {
    let coordinator = coordinator_with(&[]);
    for i in 0..5_i64 {
        coordinator
            .apply(
                &SetValues::new("tune").set("x", i),
                &operator("u1"),
                ApplyOptions::default(),
            )
            .await
            .unwrap();
    }

    let first = coordinator.list(&ControlFilter::any(), 0, 2);
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.total, 5);
    assert!(first.has_more());
    // Newest entry leads.
    assert!(first.items[0].applied_at >= first.items[1].applied_at);

    let last = coordinator.list(&ControlFilter::any(), 2, 2);
    assert_eq!(last.items.len(), 1);
    assert!(!last.has_more());
}
