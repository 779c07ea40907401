//! Policy chain for the Rudder control plane
//!
//! Ordered, pluggable allow/deny evaluators consulted before any commit:
//! - [`PolicyChain`] - evaluates every enabled policy by descending
//!   priority, fail-closed, no short-circuit
//! - [`OwnerLockPolicy`] - immutable owner-only protections, fixed at
//!   maximum priority
//! - [`SafetyPolicy`], [`AbusePolicy`], [`CompliancePolicy`] - built-in
//!   governance rules
//!
//! A policy's internal failure is converted to a denial, never propagated
//! and never treated as an allow.

pub mod chain;
pub mod error;
pub mod policies;
pub mod verdict;

pub use chain::PolicyChain;
pub use error::PolicyError;
pub use policies::{AbusePolicy, CompliancePolicy, OwnerLockPolicy, SafetyPolicy};
pub use verdict::{Outcome, Policy, PolicyContext, PolicyDecision, PolicyVerdict};

/// Priority reserved for owner locks; no other policy should use it
pub const OWNER_LOCK_PRIORITY: u32 = u32::MAX;
