//! Owner locks
//!
//! An owner lock protects a resource/operation pair. Requests against a
//! locked pair are denied for every actor except the declared owner, who
//! receives an authoritative override that outranks all other policies.
//! Only the owner can remove a lock; no role or policy can bypass that.

use crate::error::PolicyError;
use crate::verdict::{Policy, PolicyContext, PolicyDecision};
use crate::OWNER_LOCK_PRIORITY;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

/// Operation wildcard: a lock on `"*"` covers every operation
pub const ALL_OPERATIONS: &str = "*";

#[derive(Debug, Clone)]
struct LockEntry {
    owner: String,
    operations: BTreeSet<String>,
}

/// Immutable, owner-only-bypassable resource protections
///
/// Priority is fixed at [`OWNER_LOCK_PRIORITY`] and cannot be lowered.
#[derive(Debug, Default)]
pub struct OwnerLockPolicy {
    locks: RwLock<HashMap<String, LockEntry>>,
}

impl OwnerLockPolicy {
    /// Empty lock table
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock operations on a resource for an owner
    ///
    /// Open to any caller. A resource already locked by a different owner
    /// is left untouched (the existing owner's protection is immutable);
    /// returns false in that case. Locking again as the same owner extends
    /// the operation set.
    pub fn add_lock(
        &self,
        resource_id: impl Into<String>,
        owner_id: impl Into<String>,
        operations: impl IntoIterator<Item = String>,
    ) -> bool {
        let resource_id = resource_id.into();
        let owner_id = owner_id.into();
        let mut locks = self.locks.write();
        match locks.get_mut(&resource_id) {
            Some(entry) if entry.owner != owner_id => {
                tracing::warn!(
                    resource = %resource_id,
                    "refused lock: resource already locked by another owner"
                );
                false
            }
            Some(entry) => {
                entry.operations.extend(operations);
                true
            }
            None => {
                locks.insert(
                    resource_id,
                    LockEntry {
                        owner: owner_id,
                        operations: operations.into_iter().collect(),
                    },
                );
                true
            }
        }
    }

    /// Remove a lock; a no-op returning false for anyone but the owner
    pub fn remove_lock(&self, resource_id: &str, actor_id: &str) -> bool {
        let mut locks = self.locks.write();
        match locks.get(resource_id) {
            Some(entry) if entry.owner == actor_id => {
                locks.remove(resource_id);
                true
            }
            Some(_) => {
                tracing::warn!(
                    resource = %resource_id,
                    actor = %actor_id,
                    "non-owner attempted lock removal"
                );
                false
            }
            None => false,
        }
    }

    /// Whether a resource/operation pair is locked
    #[must_use]
    pub fn is_locked(&self, resource_id: &str, operation: &str) -> bool {
        self.locks.read().get(resource_id).is_some_and(|entry| {
            entry.operations.contains(ALL_OPERATIONS) || entry.operations.contains(operation)
        })
    }

    /// Declared owner of a resource, if locked
    #[must_use]
    pub fn owner_of(&self, resource_id: &str) -> Option<String> {
        self.locks.read().get(resource_id).map(|e| e.owner.clone())
    }
}

#[async_trait]
impl Policy for OwnerLockPolicy {
    fn id(&self) -> &str {
        "owner-lock"
    }

    fn priority(&self) -> u32 {
        OWNER_LOCK_PRIORITY
    }

    async fn evaluate(&self, ctx: &PolicyContext) -> Result<PolicyDecision, PolicyError> {
        let Some(resource_id) = &ctx.resource_id else {
            return Ok(PolicyDecision::allow());
        };
        let locks = self.locks.read();
        let Some(entry) = locks.get(resource_id) else {
            return Ok(PolicyDecision::allow());
        };
        let covered = entry.operations.contains(ALL_OPERATIONS)
            || entry.operations.contains(&ctx.operation);
        if !covered {
            return Ok(PolicyDecision::allow());
        }
        if entry.owner == ctx.actor_id {
            Ok(PolicyDecision::allow_override(format!(
                "owner of '{resource_id}' acting on own lock"
            )))
        } else {
            Ok(PolicyDecision::deny(format!(
                "resource '{resource_id}' operation '{}' is owner-locked",
                ctx.operation
            )))
        }
    }
}
