//! Versioned snapshot store for the Rudder control plane
//!
//! Owns the live state tree and every snapshot taken of it. Provides the
//! rollback guarantees the transaction coordinator depends on:
//! - [`SnapshotStore::capture`] / [`SnapshotStore::restore`] for whole-state
//!   rollback points
//! - [`SnapshotStore::commit_mutation`] / [`SnapshotStore::revert_control`]
//!   for per-control overlay commits and their inverses
//! - an append-only [`StateChange`] log forming the state-transition audit
//!   trail (distinct from the external policy/permission audit log)
//!
//! Snapshots are immutable deep copies; live state is never aliased by a
//! snapshot. A retention bound evicts oldest-first.

pub mod error;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use rudder_cache::CacheStats;
pub use store::{SnapshotStore, StoreConfig};
pub use types::{
    ChangeType, CommitOutcome, CommitRequest, ControlRecord, ControlStatus, QueryFilter,
    SnapshotId, StateChange, StateSnapshot,
};
