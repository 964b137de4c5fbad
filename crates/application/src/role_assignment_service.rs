use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use warden_core::{Actor, AppError, AppResult, OrganizationId, UserId};
use warden_domain::{AssignmentState, AuditAction, RoleAssignment, RoleId};

use crate::RbacLimits;
use crate::rbac_ports::{
    AssignRoleInput, AssignmentStatistics, AuditEvent, AuditRepository, PermissionSetCache,
    RoleAssignmentRepository, RoleRepository,
};

mod lifecycle;
mod queries;

/// Role assignment ledger: time-bounded grants of roles to users.
#[derive(Clone)]
pub struct RoleAssignmentService {
    role_repository: Arc<dyn RoleRepository>,
    assignment_repository: Arc<dyn RoleAssignmentRepository>,
    audit_repository: Arc<dyn AuditRepository>,
    limits: RbacLimits,
    permission_cache: Option<Arc<dyn PermissionSetCache>>,
}

impl RoleAssignmentService {
    /// Creates a role assignment service.
    #[must_use]
    pub fn new(
        role_repository: Arc<dyn RoleRepository>,
        assignment_repository: Arc<dyn RoleAssignmentRepository>,
        audit_repository: Arc<dyn AuditRepository>,
        limits: RbacLimits,
    ) -> Self {
        Self {
            role_repository,
            assignment_repository,
            audit_repository,
            limits,
            permission_cache: None,
        }
    }

    /// Adds the permission set cache to invalidate after ledger changes.
    #[must_use]
    pub fn with_permission_cache(mut self, permission_cache: Arc<dyn PermissionSetCache>) -> Self {
        self.permission_cache = Some(permission_cache);
        self
    }

    async fn invalidate_user(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> AppResult<()> {
        if let Some(cache) = &self.permission_cache {
            cache.invalidate_user(organization_id, user_id).await?;
        }

        Ok(())
    }

    // The ledger write already committed; cache and audit failures are logged
    // so callers never retry a mutation that took effect.
    async fn settle_committed_change(
        &self,
        actor: Actor,
        assignment: &RoleAssignment,
        action: AuditAction,
        detail: String,
    ) {
        if let Err(error) = self
            .invalidate_user(assignment.organization_id, assignment.user_id)
            .await
        {
            warn!(
                organization_id = %assignment.organization_id,
                user_id = %assignment.user_id,
                error = %error,
                "failed to invalidate cached permission set"
            );
        }

        if let Err(error) = self
            .append_assignment_event(actor, assignment, action, detail)
            .await
        {
            warn!(
                organization_id = %assignment.organization_id,
                assignment_id = %assignment.id,
                action = action.as_str(),
                error = %error,
                "failed to append assignment audit event"
            );
        }
    }

    async fn append_assignment_event(
        &self,
        actor: Actor,
        assignment: &RoleAssignment,
        action: AuditAction,
        detail: String,
    ) -> AppResult<()> {
        self.audit_repository
            .append_event(AuditEvent {
                organization_id: assignment.organization_id,
                actor,
                action,
                resource_type: "rbac_role_assignment".to_owned(),
                resource_id: assignment.id.to_string(),
                detail: Some(detail),
            })
            .await
    }
}
