//! Testing utilities for the Rudder workspace
//!
//! Shared mutations, sinks, and fixtures for coordinator tests.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rudder_core::{
    AuditEntry, AuditSink, ControlEvent, CoordinatorError, CoordinatorObserver, Mutation,
    StandardRole, TransactionCoordinator,
};
use rudder_value::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Install a test-friendly tracing subscriber; repeated calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

/// Mutation that emits a fixed delta overlay.
#[derive(Debug, Clone)]
pub struct ScriptedMutation {
    pub kind: String,
    pub operation: String,
    pub resource: Option<String>,
    pub delta: Value,
}

impl ScriptedMutation {
    pub fn new(kind: &str, delta: Value) -> Self {
        Self {
            kind: kind.to_string(),
            operation: "apply".to_string(),
            resource: None,
            delta,
        }
    }

    pub fn setting(kind: &str, key: &str, value: impl Into<Value>) -> Self {
        Self::new(kind, Value::from_iter([(key.to_string(), value.into())]))
    }

    #[must_use]
    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = operation.to_string();
        self
    }

    #[must_use]
    pub fn on_resource(mut self, resource: &str) -> Self {
        self.resource = Some(resource.to_string());
        self
    }
}

#[async_trait]
impl Mutation for ScriptedMutation {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn affected_systems(&self) -> Vec<String> {
        vec!["test".to_string()]
    }

    fn resource_id(&self) -> Option<String> {
        self.resource.clone()
    }

    fn operation(&self) -> &str {
        &self.operation
    }

    async fn apply(&self, _state: &BTreeMap<String, Value>) -> Result<Value, CoordinatorError> {
        Ok(self.delta.clone())
    }
}

/// Mutation whose apply always fails; previews succeed with an empty delta.
#[derive(Debug)]
pub struct FailingMutation {
    pub kind: String,
    pub message: String,
}

impl FailingMutation {
    pub fn new(message: &str) -> Self {
        Self {
            kind: "failing".to_string(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl Mutation for FailingMutation {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn affected_systems(&self) -> Vec<String> {
        vec!["test".to_string()]
    }

    async fn apply(&self, _state: &BTreeMap<String, Value>) -> Result<Value, CoordinatorError> {
        Err(CoordinatorError::apply(self.message.clone()))
    }

    async fn preview(&self, _state: &BTreeMap<String, Value>) -> Result<Value, CoordinatorError> {
        Ok(Value::empty_map())
    }
}

/// Mutation that emits a non-map delta, which the store must reject.
#[derive(Debug)]
pub struct MalformedMutation;

#[async_trait]
impl Mutation for MalformedMutation {
    fn kind(&self) -> &str {
        "malformed"
    }

    fn affected_systems(&self) -> Vec<String> {
        vec!["test".to_string()]
    }

    async fn apply(&self, _state: &BTreeMap<String, Value>) -> Result<Value, CoordinatorError> {
        Ok(Value::from(42_i64))
    }
}

/// Audit sink that keeps entries in memory for assertions.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
    fail_next: AtomicBool,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next record call fail.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<(), String> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err("sink unavailable".to_string());
        }
        self.entries.lock().push(entry);
        Ok(())
    }
}

/// Observer that records every event it sees.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ControlEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ControlEvent> {
        self.events.lock().clone()
    }
}

impl CoordinatorObserver for RecordingObserver {
    fn on_event(&self, event: &ControlEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Role with every control permission.
pub fn operator(actor_id: &str) -> StandardRole {
    StandardRole::operator(actor_id)
}

/// Role with no permissions at all.
pub fn bystander(actor_id: &str) -> StandardRole {
    StandardRole::new(actor_id, "bystander")
}

/// State map from integer entries.
pub fn int_state(entries: &[(&str, i64)]) -> BTreeMap<String, Value> {
    entries
        .iter()
        .map(|(k, v)| ((*k).to_string(), Value::from(*v)))
        .collect()
}

/// Coordinator seeded with `entries` and default configuration.
pub fn coordinator_with(entries: &[(&str, i64)]) -> TransactionCoordinator {
    TransactionCoordinator::new(int_state(entries))
}
