//! Actor roles and permissions

use std::collections::BTreeSet;
use std::fmt;

/// Permission required to apply a control
pub const PERM_APPLY: &str = "control.apply";
/// Permission required to revert a control
pub const PERM_REVERT: &str = "control.revert";
/// Permission required to preview a control
pub const PERM_PREVIEW: &str = "control.preview";

/// An acting identity with a role type and a permission set
pub trait Role: Send + Sync + fmt::Debug {
    /// Stable actor identity (rate limits and owner locks key on this)
    fn actor_id(&self) -> &str;

    /// Role classification fed to policy evaluation
    fn role_type(&self) -> &str;

    /// Whether this role holds `permission`
    fn has_permission(&self, permission: &str) -> bool;
}

/// Role with an explicit granted-permission set
#[derive(Debug, Clone)]
pub struct StandardRole {
    actor_id: String,
    role_type: String,
    granted: BTreeSet<String>,
}

impl StandardRole {
    /// Role with no permissions
    #[must_use]
    pub fn new(actor_id: impl Into<String>, role_type: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            role_type: role_type.into(),
            granted: BTreeSet::new(),
        }
    }

    /// Grant one permission
    #[must_use]
    pub fn grant(mut self, permission: impl Into<String>) -> Self {
        self.granted.insert(permission.into());
        self
    }

    /// Operator role holding apply, revert, and preview
    #[must_use]
    pub fn operator(actor_id: impl Into<String>) -> Self {
        Self::new(actor_id, "operator")
            .grant(PERM_APPLY)
            .grant(PERM_REVERT)
            .grant(PERM_PREVIEW)
    }

    /// Read-only role holding preview only
    #[must_use]
    pub fn viewer(actor_id: impl Into<String>) -> Self {
        Self::new(actor_id, "viewer").grant(PERM_PREVIEW)
    }
}

impl Role for StandardRole {
    fn actor_id(&self) -> &str {
        &self.actor_id
    }

    fn role_type(&self) -> &str {
        &self.role_type
    }

    fn has_permission(&self, permission: &str) -> bool {
        self.granted.contains(permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_holds_all_control_permissions() {
        let role = StandardRole::operator("u1");
        assert!(role.has_permission(PERM_APPLY));
        assert!(role.has_permission(PERM_REVERT));
        assert!(role.has_permission(PERM_PREVIEW));
        assert_eq!(role.role_type(), "operator");
    }

    #[test]
    fn viewer_cannot_apply() {
        let role = StandardRole::viewer("u1");
        assert!(role.has_permission(PERM_PREVIEW));
        assert!(!role.has_permission(PERM_APPLY));
    }
}
