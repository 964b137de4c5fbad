use serde::{Deserialize, Serialize};

/// Stable audit action identifiers emitted by the RBAC services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    /// Emitted when a custom role is created.
    RoleCreated,
    /// Emitted when a custom role is changed.
    RoleUpdated,
    /// Emitted when a custom role is deleted.
    RoleDeleted,
    /// Emitted when a role is assigned to a user.
    RoleAssigned,
    /// Emitted when an assignment is removed by an administrator.
    RoleUnassigned,
    /// Emitted when an assignment gets a new expiration.
    RoleAssignmentExtended,
    /// Emitted when the sweep materializes an expiration.
    RoleAssignmentExpired,
}

impl AuditAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoleCreated => "rbac.role.created",
            Self::RoleUpdated => "rbac.role.updated",
            Self::RoleDeleted => "rbac.role.deleted",
            Self::RoleAssigned => "rbac.assignment.created",
            Self::RoleUnassigned => "rbac.assignment.removed",
            Self::RoleAssignmentExtended => "rbac.assignment.extended",
            Self::RoleAssignmentExpired => "rbac.assignment.expired",
        }
    }
}
