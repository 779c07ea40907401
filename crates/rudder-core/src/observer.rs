//! Coordinator lifecycle events

use std::fmt;

/// Event emitted after a coordinator operation completes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    /// A control committed
    Applied {
        /// Committed control id
        control_id: String,
    },
    /// A control was reverted
    Reverted {
        /// Reverted control id
        control_id: String,
    },
    /// A preview was served
    Previewed {
        /// Preview transaction id
        control_id: String,
    },
    /// A failed transaction was rolled back
    RolledBack {
        /// Failed control id
        control_id: String,
    },
}

/// Listener for coordinator events, called synchronously as each
/// operation settles
pub trait CoordinatorObserver: Send + Sync + fmt::Debug {
    /// Handle one event; must not block
    fn on_event(&self, event: &ControlEvent);
}
