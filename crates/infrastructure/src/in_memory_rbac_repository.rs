use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use warden_application::{PermissionCatalogRepository, RoleAssignmentRepository, RoleRepository};
use warden_core::{Actor, AppError, AppResult, OrganizationId, UserId};
use warden_domain::{
    ActionImplication, AssignmentState, Permission, PermissionKey, Role, RoleAssignment,
    RoleHierarchy, RoleId,
};

mod assignments;
mod roles;

/// In-memory RBAC store: permission registry, role catalog and assignment ledger.
///
/// All state sits behind one lock, so every write checks its invariants
/// against the same snapshot it mutates. Role deletion and assignment
/// inserts, and concurrent parent changes, are therefore serialized.
#[derive(Debug, Default)]
pub struct InMemoryRbacRepository {
    state: RwLock<RbacState>,
}

impl InMemoryRbacRepository {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Default)]
struct RbacState {
    roles: HashMap<RoleId, StoredRole>,
    permissions: Vec<Permission>,
    implications: Vec<ActionImplication>,
    assignments: Vec<RoleAssignment>,
}

#[derive(Debug, Clone)]
struct StoredRole {
    role: Role,
    deleted_at: Option<DateTime<Utc>>,
}

impl StoredRole {
    fn is_live_for(&self, organization_id: OrganizationId) -> bool {
        self.deleted_at.is_none() && self.role.is_visible_to(organization_id)
    }
}

impl RbacState {
    fn live_roles(&self, organization_id: OrganizationId) -> impl Iterator<Item = &Role> {
        self.roles
            .values()
            .filter(move |stored| stored.is_live_for(organization_id))
            .map(|stored| &stored.role)
    }

    fn is_live_role(&self, organization_id: OrganizationId, role_id: RoleId) -> bool {
        self.roles
            .get(&role_id)
            .is_some_and(|stored| stored.is_live_for(organization_id))
    }

    fn ensure_unique_name(&self, organization_id: OrganizationId, role: &Role) -> AppResult<()> {
        let taken = self
            .live_roles(organization_id)
            .any(|other| other.id() != role.id() && other.has_name(role.name()));

        if taken {
            return Err(AppError::Conflict(format!(
                "role '{}' already exists in organization '{organization_id}'",
                role.name()
            )));
        }

        Ok(())
    }

    // Parents must be live in scope and must not lead back to the role.
    fn ensure_valid_parents(&self, organization_id: OrganizationId, role: &Role) -> AppResult<()> {
        if let Some(missing) = role
            .parent_role_ids()
            .iter()
            .find(|parent_role_id| !self.is_live_role(organization_id, **parent_role_id))
        {
            return Err(AppError::NotFound(format!(
                "parent role '{missing}' does not exist"
            )));
        }

        RoleHierarchy::from_roles(self.live_roles(organization_id))
            .ensure_acyclic(role.id(), role.parent_role_ids())
    }

    fn count_active_for_role(
        &self,
        role_id: RoleId,
        organization_id: OrganizationId,
        now: DateTime<Utc>,
    ) -> usize {
        self.assignments
            .iter()
            .filter(|record| {
                record.role_id == role_id
                    && record.organization_id == organization_id
                    && record.is_active_at(now)
            })
            .count()
    }
}

fn owning_organization(role: &Role) -> AppResult<OrganizationId> {
    role.organization_id().ok_or_else(|| {
        AppError::ImmutableRole(format!("predefined role '{}' cannot be modified", role.name()))
    })
}

fn matches_tuple(
    record: &RoleAssignment,
    user_id: UserId,
    role_id: RoleId,
    organization_id: OrganizationId,
) -> bool {
    record.user_id == user_id
        && record.role_id == role_id
        && record.organization_id == organization_id
}

fn saturating_usize(value: u32) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

#[async_trait]
impl PermissionCatalogRepository for InMemoryRbacRepository {
    async fn list_permissions(&self) -> AppResult<Vec<Permission>> {
        Ok(self.state.read().await.permissions.clone())
    }

    async fn seed_catalog(
        &self,
        permissions: &[Permission],
        implications: &[ActionImplication],
        predefined_roles: &[Role],
    ) -> AppResult<()> {
        if let Some(role) = predefined_roles.iter().find(|role| !role.is_predefined()) {
            return Err(AppError::Validation(format!(
                "role '{}' is not predefined and cannot be seeded",
                role.name()
            )));
        }

        let mut guard = self.state.write().await;
        let state = &mut *guard;

        for permission in permissions {
            match state
                .permissions
                .iter_mut()
                .find(|existing| existing.key() == permission.key())
            {
                Some(existing) => *existing = permission.clone(),
                None => state.permissions.push(permission.clone()),
            }
        }
        state
            .permissions
            .sort_by(|left, right| left.key().cmp(right.key()));

        for implication in implications {
            match state.implications.iter_mut().find(|existing| {
                existing.resource() == implication.resource()
                    && existing.action() == implication.action()
            }) {
                Some(existing) => *existing = implication.clone(),
                None => state.implications.push(implication.clone()),
            }
        }

        let registered: Vec<&PermissionKey> = state
            .permissions
            .iter()
            .map(Permission::key)
            .collect();
        if let Some(unknown) = predefined_roles
            .iter()
            .flat_map(|role| role.permissions())
            .find(|key| !registered.contains(key))
        {
            return Err(AppError::InvalidPermission(format!(
                "predefined role grants unregistered permission '{unknown}'"
            )));
        }

        for role in predefined_roles {
            state.roles.insert(
                role.id(),
                StoredRole {
                    role: role.clone(),
                    deleted_at: None,
                },
            );
        }

        Ok(())
    }
}
