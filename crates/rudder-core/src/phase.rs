//! Transaction phase machine
//!
//! Every apply moves through a fixed phase sequence; a failure after the
//! snapshot phase transitions through `Failed` into `RolledBack`.

/// Phases of one coordinated transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnPhase {
    /// Not started
    Idle,
    /// Acting role holds the required permission
    PermissionChecked,
    /// Policy chain allowed the operation
    PolicyEvaluated,
    /// Pre-mutation snapshot captured
    Snapshotted,
    /// Mutation produced its delta
    Mutated,
    /// Audit entry written
    Audited,
    /// Transaction complete
    Committed,
    /// Transaction aborted
    Failed,
    /// State restored from the pre-mutation snapshot
    RolledBack,
}

/// Phases reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: TxnPhase) -> &'static [TxnPhase] {
    use TxnPhase::{
        Audited, Committed, Failed, Idle, Mutated, PermissionChecked, PolicyEvaluated,
        RolledBack, Snapshotted,
    };
    match from {
        Idle => &[PermissionChecked, Failed],
        PermissionChecked => &[PolicyEvaluated, Failed],
        PolicyEvaluated => &[Snapshotted, Failed],
        Snapshotted => &[Mutated, Failed],
        Mutated => &[Audited, Failed],
        Audited => &[Committed, Failed],
        Failed => &[RolledBack],
        Committed | RolledBack => &[],
    }
}

/// Whether `from -> to` is a legal single-step transition
#[inline]
#[must_use]
pub fn transition_allowed(from: TxnPhase, to: TxnPhase) -> bool {
    allowed_transitions(from).contains(&to)
}

/// Tracks the phase of one in-flight transaction
#[derive(Debug)]
pub(crate) struct PhaseTracker {
    phase: TxnPhase,
}

impl PhaseTracker {
    pub(crate) fn new() -> Self {
        Self {
            phase: TxnPhase::Idle,
        }
    }

    #[cfg(test)]
    pub(crate) fn current(&self) -> TxnPhase {
        self.phase
    }

    // Illegal transitions are coordinator bugs, not runtime conditions.
    pub(crate) fn advance(&mut self, to: TxnPhase) {
        debug_assert!(
            transition_allowed(self.phase, to),
            "illegal phase transition {:?} -> {:?}",
            self.phase,
            to
        );
        tracing::trace!(from = ?self.phase, ?to, "phase transition");
        self.phase = to;
    }

    pub(crate) fn fail(&mut self) {
        self.advance(TxnPhase::Failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_fully_connected() {
        let order = [
            TxnPhase::Idle,
            TxnPhase::PermissionChecked,
            TxnPhase::PolicyEvaluated,
            TxnPhase::Snapshotted,
            TxnPhase::Mutated,
            TxnPhase::Audited,
            TxnPhase::Committed,
        ];
        for pair in order.windows(2) {
            assert!(transition_allowed(pair[0], pair[1]), "{pair:?}");
        }
    }

    #[test]
    fn every_working_phase_can_fail() {
        for from in [
            TxnPhase::Idle,
            TxnPhase::PermissionChecked,
            TxnPhase::PolicyEvaluated,
            TxnPhase::Snapshotted,
            TxnPhase::Mutated,
            TxnPhase::Audited,
        ] {
            assert!(transition_allowed(from, TxnPhase::Failed));
        }
    }

    #[test]
    fn terminal_phases_go_nowhere() {
        assert!(allowed_transitions(TxnPhase::Committed).is_empty());
        assert!(allowed_transitions(TxnPhase::RolledBack).is_empty());
        assert_eq!(
            allowed_transitions(TxnPhase::Failed),
            &[TxnPhase::RolledBack]
        );
    }

    #[test]
    fn skipping_phases_is_illegal() {
        assert!(!transition_allowed(TxnPhase::Idle, TxnPhase::Snapshotted));
        assert!(!transition_allowed(
            TxnPhase::PermissionChecked,
            TxnPhase::Committed
        ));
        assert!(!transition_allowed(TxnPhase::Committed, TxnPhase::Idle));
    }

    #[test]
    fn tracker_follows_the_pipeline() {
        let mut tracker = PhaseTracker::new();
        assert_eq!(tracker.current(), TxnPhase::Idle);
        tracker.advance(TxnPhase::PermissionChecked);
        tracker.advance(TxnPhase::PolicyEvaluated);
        tracker.fail();
        assert_eq!(tracker.current(), TxnPhase::Failed);
        tracker.advance(TxnPhase::RolledBack);
        assert_eq!(tracker.current(), TxnPhase::RolledBack);
    }
}
