use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use warden_core::{Actor, AppError, AppResult, OrganizationId, UserId};
use warden_domain::{
    AuditAction, EffectivePermissions, ImplicationRules, PermissionRegistry, Role, RoleHierarchy,
    RoleId, RoleType,
};

use crate::RbacLimits;
use crate::rbac_ports::{
    AuditEvent, AuditRepository, CreateRoleInput, PermissionSetCache, RoleAssignmentRepository,
    RoleRepository, RoleStatistics, UpdateRoleInput,
};

mod mutations;
mod queries;

/// Role store service: tenant-scoped role lookups and custom role administration.
#[derive(Clone)]
pub struct RoleCatalogService {
    registry: Arc<PermissionRegistry>,
    role_repository: Arc<dyn RoleRepository>,
    assignment_repository: Arc<dyn RoleAssignmentRepository>,
    audit_repository: Arc<dyn AuditRepository>,
    limits: RbacLimits,
    permission_cache: Option<Arc<dyn PermissionSetCache>>,
}

impl RoleCatalogService {
    /// Creates a role catalog service.
    #[must_use]
    pub fn new(
        registry: Arc<PermissionRegistry>,
        role_repository: Arc<dyn RoleRepository>,
        assignment_repository: Arc<dyn RoleAssignmentRepository>,
        audit_repository: Arc<dyn AuditRepository>,
        limits: RbacLimits,
    ) -> Self {
        Self {
            registry,
            role_repository,
            assignment_repository,
            audit_repository,
            limits,
            permission_cache: None,
        }
    }

    /// Adds the permission set cache to invalidate after role changes.
    #[must_use]
    pub fn with_permission_cache(mut self, permission_cache: Arc<dyn PermissionSetCache>) -> Self {
        self.permission_cache = Some(permission_cache);
        self
    }

    async fn invalidate_organization(&self, organization_id: OrganizationId) -> AppResult<()> {
        if let Some(cache) = &self.permission_cache {
            cache.invalidate_organization(organization_id).await?;
        }

        Ok(())
    }

    async fn append_role_event(
        &self,
        actor: Actor,
        role: &Role,
        action: AuditAction,
        detail: String,
    ) -> AppResult<()> {
        let Some(organization_id) = role.organization_id() else {
            return Err(AppError::Internal(format!(
                "custom role '{}' has no organization",
                role.id()
            )));
        };

        self.audit_repository
            .append_event(AuditEvent {
                organization_id,
                actor,
                action,
                resource_type: "rbac_role".to_owned(),
                resource_id: role.id().to_string(),
                detail: Some(detail),
            })
            .await
    }
}

// Predefined roles first, then custom roles, each by creation time.
fn sort_for_display(roles: &mut [Role]) {
    roles.sort_by(|left, right| {
        (left.role_type() == RoleType::Custom, left.created_at(), left.name()).cmp(&(
            right.role_type() == RoleType::Custom,
            right.created_at(),
            right.name(),
        ))
    });
}
