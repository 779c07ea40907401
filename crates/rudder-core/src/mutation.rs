//! Mutation abstraction
//!
//! A mutation reads the live state and produces a delta overlay (a map
//! `Value`). The coordinator merges the overlay into live state and records
//! the inverse for revert; a mutation never writes state itself.

use crate::error::CoordinatorError;
use async_trait::async_trait;
use rudder_value::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A governed state mutation
#[async_trait]
pub trait Mutation: Send + Sync + fmt::Debug {
    /// Mutation kind, used for ledger listing and filtering
    fn kind(&self) -> &str;

    /// Systems this mutation declares it touches
    fn affected_systems(&self) -> Vec<String>;

    /// Resource this mutation targets, if any; fed to resource-scoped
    /// policies such as owner locks
    fn resource_id(&self) -> Option<String> {
        None
    }

    /// Operation name fed to policy evaluation
    fn operation(&self) -> &str {
        "apply"
    }

    /// Reject structurally invalid requests before any pipeline work
    ///
    /// # Errors
    /// [`CoordinatorError::Validation`] when the mutation cannot run
    /// against `state`.
    fn validate(&self, _state: &BTreeMap<String, Value>) -> Result<(), CoordinatorError> {
        Ok(())
    }

    /// Produce the delta overlay to merge into live state
    ///
    /// # Errors
    /// [`CoordinatorError::Apply`] when the mutation cannot compute its
    /// delta; the coordinator rolls back to the pre-mutation snapshot.
    async fn apply(&self, state: &BTreeMap<String, Value>) -> Result<Value, CoordinatorError>;

    /// Delta the mutation would produce, for previewing
    ///
    /// Defaults to [`Mutation::apply`]; override when the real apply has
    /// effects beyond computing the delta.
    ///
    /// # Errors
    /// Same as [`Mutation::apply`].
    async fn preview(&self, state: &BTreeMap<String, Value>) -> Result<Value, CoordinatorError> {
        self.apply(state).await
    }
}

/// Key/value overlay mutation
///
/// The bread-and-butter control: set (or delete, via the delete marker)
/// a fixed set of top-level keys.
#[derive(Debug, Clone)]
pub struct SetValues {
    kind: String,
    affected: Vec<String>,
    resource: Option<String>,
    entries: BTreeMap<String, Value>,
}

impl SetValues {
    /// Empty overlay of the given kind
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            affected: vec!["config".to_string()],
            resource: None,
            entries: BTreeMap::new(),
        }
    }

    /// Set one key
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Delete one key
    #[must_use]
    pub fn delete(mut self, key: impl Into<String>) -> Self {
        self.entries.insert(key.into(), Value::delete_marker());
        self
    }

    /// Declare the affected systems
    #[must_use]
    pub fn affecting(mut self, systems: Vec<String>) -> Self {
        self.affected = systems;
        self
    }

    /// Target a named resource for resource-scoped policies
    #[must_use]
    pub fn on_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }
}

#[async_trait]
impl Mutation for SetValues {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn affected_systems(&self) -> Vec<String> {
        self.affected.clone()
    }

    fn resource_id(&self) -> Option<String> {
        self.resource.clone()
    }

    fn validate(&self, _state: &BTreeMap<String, Value>) -> Result<(), CoordinatorError> {
        if self.entries.is_empty() {
            return Err(CoordinatorError::Validation(
                "overlay mutation has no entries".to_string(),
            ));
        }
        Ok(())
    }

    async fn apply(&self, _state: &BTreeMap<String, Value>) -> Result<Value, CoordinatorError> {
        Ok(Value::Map(self.entries.clone()))
    }
}
