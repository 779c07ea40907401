//! Rudder transaction coordinator
//!
//! The control plane's front door: every state mutation goes through
//! [`TransactionCoordinator::apply`], which runs the governance pipeline
//! (permission check, policy evaluation, pre-mutation snapshot, mutation,
//! commit, audit) and rolls back to the snapshot on any failure past it.
//!
//! - [`Mutation`] is the seam domain controls implement
//! - [`Role`] carries actor identity and permissions
//! - [`AuditSink`] receives one entry per pipeline transaction
//! - [`CoordinatorObserver`] gets lifecycle events for applied, reverted,
//!   previewed, and rolled-back controls

pub mod audit;
pub mod coordinator;
pub mod error;
pub mod mutation;
pub mod observer;
pub mod phase;
pub mod role;
pub mod types;

pub use audit::{AuditAction, AuditEntry, AuditResult, AuditSink, TracingAuditSink};
pub use coordinator::{CoordinatorBuilder, TransactionCoordinator};
pub use error::CoordinatorError;
pub use mutation::{Mutation, SetValues};
pub use observer::{ControlEvent, CoordinatorObserver};
pub use phase::{allowed_transitions, transition_allowed, TxnPhase};
pub use role::{Role, StandardRole, PERM_APPLY, PERM_PREVIEW, PERM_REVERT};
pub use types::{
    AppliedControl, ApplyOptions, BatchMode, BatchReport, ControlFilter, ControlPage,
    PreviewReport, RevertedControl,
};
