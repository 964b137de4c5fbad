use async_trait::async_trait;
use chrono::{DateTime, Utc};
use warden_core::{AppResult, OrganizationId};
use warden_domain::{ActionImplication, PermissionKey, Role, RoleChanges, RoleId};

/// Input payload for creating custom roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRoleInput {
    /// Role name, unique in organization scope.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Grants to attach to the role.
    pub permissions: Vec<PermissionKey>,
    /// Roles to inherit from.
    pub parent_role_ids: Vec<RoleId>,
}

/// Partial update of a custom role; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateRoleInput {
    /// New role name.
    pub name: Option<String>,
    /// New description; blank clears it.
    pub description: Option<String>,
    /// Replacement grants.
    pub permissions: Option<Vec<PermissionKey>>,
    /// Replacement parent roles.
    pub parent_role_ids: Option<Vec<RoleId>>,
}

impl From<UpdateRoleInput> for RoleChanges {
    fn from(value: UpdateRoleInput) -> Self {
        Self {
            name: value.name,
            description: value.description,
            permissions: value.permissions,
            parent_role_ids: value.parent_role_ids,
        }
    }
}

/// Role counts visible to one organization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleStatistics {
    /// Predefined plus custom roles.
    pub total: usize,
    /// Organization-owned roles.
    pub custom: usize,
    /// System-owned roles.
    pub predefined: usize,
}

/// Repository port for role definitions.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Lists predefined roles plus the organization's live custom roles.
    async fn list_roles(&self, organization_id: OrganizationId) -> AppResult<Vec<Role>>;

    /// Finds a live role visible to the organization.
    async fn find_role(
        &self,
        organization_id: OrganizationId,
        role_id: RoleId,
    ) -> AppResult<Option<Role>>;

    /// Persists a new custom role.
    ///
    /// Fails with `Conflict` on a duplicate name or when the organization
    /// already owns `max_custom_roles` live custom roles.
    async fn create_role(&self, role: &Role, max_custom_roles: u32) -> AppResult<()>;

    /// Replaces a custom role's content. Fails with `Conflict` on a duplicate name.
    async fn update_role(&self, role: &Role) -> AppResult<()>;

    /// Soft deletes a custom role.
    async fn delete_role(
        &self,
        organization_id: OrganizationId,
        role_id: RoleId,
        deleted_at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Lists the configured action implication rules.
    async fn list_action_implications(&self) -> AppResult<Vec<ActionImplication>>;
}
