use warden_domain::{RoleChanges, RoleContent};

use super::*;

impl RoleCatalogService {
    /// Creates a custom role and emits an audit event.
    pub async fn create_custom_role(
        &self,
        actor: Actor,
        organization_id: OrganizationId,
        input: CreateRoleInput,
    ) -> AppResult<Role> {
        let role = Role::custom(
            RoleId::new(),
            organization_id,
            RoleContent {
                name: input.name,
                description: input.description,
                permissions: input.permissions,
                parent_role_ids: input.parent_role_ids,
            },
            Utc::now(),
        )?;

        let roles = self.role_repository.list_roles(organization_id).await?;
        self.validate_role(&role, &roles)?;

        self.role_repository
            .create_role(&role, self.limits.max_custom_roles_per_organization)
            .await?;

        self.append_role_event(
            actor,
            &role,
            AuditAction::RoleCreated,
            format!(
                "created role '{}' with {} permissions",
                role.name(),
                role.permissions().len()
            ),
        )
        .await?;

        info!(
            organization_id = %organization_id,
            role_id = %role.id(),
            role_name = role.name(),
            "custom role created"
        );

        Ok(role)
    }

    /// Updates a custom role, invalidates cached permission sets and emits an audit event.
    pub async fn update_custom_role(
        &self,
        actor: Actor,
        role_id: RoleId,
        organization_id: OrganizationId,
        input: UpdateRoleInput,
    ) -> AppResult<Role> {
        let current = self.role_details(role_id, organization_id).await?;
        let changes = RoleChanges::from(input);
        let changes_grants = changes.changes_grants();
        let role = current.apply(changes, Utc::now())?;

        let roles = self.role_repository.list_roles(organization_id).await?;
        self.validate_role(&role, &roles)?;

        self.role_repository.update_role(&role).await?;
        self.invalidate_organization(organization_id).await?;

        let detail = if changes_grants {
            format!(
                "updated role '{}' grants: {} permissions, {} parents",
                role.name(),
                role.permissions().len(),
                role.parent_role_ids().len()
            )
        } else {
            format!("updated role '{}'", role.name())
        };
        self.append_role_event(actor, &role, AuditAction::RoleUpdated, detail)
            .await?;

        info!(
            organization_id = %organization_id,
            role_id = %role_id,
            changes_grants,
            "custom role updated"
        );

        Ok(role)
    }

    /// Soft deletes an unused custom role and emits an audit event.
    pub async fn delete_custom_role(
        &self,
        actor: Actor,
        role_id: RoleId,
        organization_id: OrganizationId,
    ) -> AppResult<()> {
        let role = self.role_details(role_id, organization_id).await?;
        role.ensure_mutable()?;

        let active_assignments = self
            .assignment_repository
            .count_active_for_role(role_id, organization_id, Utc::now())
            .await?;
        if active_assignments > 0 {
            return Err(AppError::RoleInUse(format!(
                "role '{}' has {active_assignments} active assignments",
                role.name()
            )));
        }

        let roles = self.role_repository.list_roles(organization_id).await?;
        let children = RoleHierarchy::from_roles(&roles).direct_children_of(role_id);
        if !children.is_empty() {
            return Err(AppError::RoleInUse(format!(
                "role '{}' is inherited by {} other roles",
                role.name(),
                children.len()
            )));
        }

        self.role_repository
            .delete_role(organization_id, role_id, Utc::now())
            .await?;
        self.invalidate_organization(organization_id).await?;

        self.append_role_event(
            actor,
            &role,
            AuditAction::RoleDeleted,
            format!("deleted role '{}'", role.name()),
        )
        .await?;

        info!(
            organization_id = %organization_id,
            role_id = %role_id,
            "custom role deleted"
        );

        Ok(())
    }

    // `visible_roles` may still contain the previous version of `role`.
    fn validate_role(&self, role: &Role, visible_roles: &[Role]) -> AppResult<()> {
        let max_permissions = usize::try_from(self.limits.max_permissions_per_role)
            .unwrap_or(usize::MAX);
        if role.permissions().len() > max_permissions {
            return Err(AppError::Validation(format!(
                "role must not grant more than {max_permissions} permissions"
            )));
        }

        for key in role.permissions() {
            self.registry.ensure_registered(key)?;
        }

        if visible_roles
            .iter()
            .any(|other| other.id() != role.id() && other.has_name(role.name()))
        {
            return Err(AppError::Conflict(format!(
                "role '{}' already exists",
                role.name()
            )));
        }

        for parent_role_id in role.parent_role_ids() {
            if !visible_roles
                .iter()
                .any(|other| other.id() == *parent_role_id)
            {
                return Err(AppError::NotFound(format!(
                    "parent role '{parent_role_id}' does not exist"
                )));
            }
        }

        RoleHierarchy::from_roles(visible_roles).ensure_acyclic(role.id(), role.parent_role_ids())
    }
}
