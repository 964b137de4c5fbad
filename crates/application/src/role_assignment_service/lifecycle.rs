use super::*;

impl RoleAssignmentService {
    /// Grants a role to a user and emits an audit event.
    pub async fn assign(&self, input: AssignRoleInput) -> AppResult<RoleAssignment> {
        let now = Utc::now();
        if input.expires_at.is_some_and(|expires_at| expires_at <= now) {
            return Err(AppError::Validation(
                "expiration must be in the future".to_owned(),
            ));
        }

        let role = self
            .role_repository
            .find_role(input.organization_id, input.role_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("role '{}' does not exist", input.role_id))
            })?;

        let assignment = RoleAssignment::new(
            input.user_id,
            input.role_id,
            input.organization_id,
            input.assigned_by,
            now,
            input.expires_at,
        );

        self.assignment_repository
            .insert_assignment(&assignment, self.limits.max_roles_per_user)
            .await?;

        let expiry = assignment
            .expires_at
            .map(|expires_at| format!(" until {}", expires_at.to_rfc3339()))
            .unwrap_or_default();
        self.settle_committed_change(
            input.assigned_by,
            &assignment,
            AuditAction::RoleAssigned,
            format!(
                "assigned role '{}' to '{}'{expiry}",
                role.name(),
                assignment.user_id
            ),
        )
        .await;

        info!(
            organization_id = %assignment.organization_id,
            user_id = %assignment.user_id,
            role_id = %assignment.role_id,
            temporary = assignment.is_temporary(),
            "role assigned"
        );

        Ok(assignment)
    }

    /// Revokes the user's active assignment of a role.
    ///
    /// Removing an assignment whose latest record is already removed succeeds
    /// without changes.
    pub async fn remove(
        &self,
        user_id: UserId,
        role_id: RoleId,
        organization_id: OrganizationId,
        removed_by: Actor,
    ) -> AppResult<()> {
        let removed = self
            .assignment_repository
            .remove_active(user_id, role_id, organization_id, removed_by, Utc::now())
            .await?;

        let Some(assignment) = removed else {
            let latest = self
                .assignment_repository
                .find_latest(user_id, role_id, organization_id)
                .await?;

            if latest.is_some_and(|record| record.state == AssignmentState::Removed) {
                debug!(
                    organization_id = %organization_id,
                    user_id = %user_id,
                    role_id = %role_id,
                    "assignment already removed"
                );
                return Ok(());
            }

            return Err(AppError::NotFound(format!(
                "user '{user_id}' has no active assignment of role '{role_id}'"
            )));
        };

        self.settle_committed_change(
            removed_by,
            &assignment,
            AuditAction::RoleUnassigned,
            format!("removed role '{role_id}' from '{user_id}'"),
        )
        .await;

        info!(
            organization_id = %organization_id,
            user_id = %user_id,
            role_id = %role_id,
            "role assignment removed"
        );

        Ok(())
    }

    /// Moves the expiration of an active assignment.
    ///
    /// A missing active assignment is reported as `NotFound` before the new
    /// deadline is validated.
    pub async fn extend(
        &self,
        user_id: UserId,
        role_id: RoleId,
        organization_id: OrganizationId,
        new_expires_at: DateTime<Utc>,
        updated_by: Actor,
    ) -> AppResult<RoleAssignment> {
        let assignment = self
            .assignment_repository
            .update_expiration(user_id, role_id, organization_id, new_expires_at, Utc::now())
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "user '{user_id}' has no active assignment of role '{role_id}'"
                ))
            })?;

        self.settle_committed_change(
            updated_by,
            &assignment,
            AuditAction::RoleAssignmentExtended,
            format!(
                "extended role '{role_id}' for '{user_id}' until {}",
                new_expires_at.to_rfc3339()
            ),
        )
        .await;

        Ok(assignment)
    }

    /// Materializes up to `limit` lapsed assignments as expired.
    ///
    /// Emits one audit event per assignment with the system actor. A failed
    /// invalidation or audit write of one row does not stop the others.
    pub async fn expire_lapsed(&self, limit: u32) -> AppResult<Vec<RoleAssignment>> {
        let expired = self
            .assignment_repository
            .expire_due(Utc::now(), limit)
            .await?;

        for assignment in &expired {
            self.settle_committed_change(
                Actor::System,
                assignment,
                AuditAction::RoleAssignmentExpired,
                format!(
                    "role '{}' expired for '{}'",
                    assignment.role_id, assignment.user_id
                ),
            )
            .await;
        }

        Ok(expired)
    }
}
