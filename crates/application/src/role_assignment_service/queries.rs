use super::*;

impl RoleAssignmentService {
    /// Lists the user's assignments that grant permissions right now.
    pub async fn active_assignments_for(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
    ) -> AppResult<Vec<RoleAssignment>> {
        self.assignment_repository
            .list_active_for_user(user_id, organization_id, Utc::now())
            .await
    }

    /// Lists every assignment record of a role in tenant scope, newest first.
    pub async fn assignments_for_role(
        &self,
        role_id: RoleId,
        organization_id: OrganizationId,
    ) -> AppResult<Vec<RoleAssignment>> {
        if self
            .role_repository
            .find_role(organization_id, role_id)
            .await?
            .is_none()
        {
            return Err(AppError::NotFound(format!("role '{role_id}' does not exist")));
        }

        self.assignment_repository
            .list_for_role(role_id, organization_id)
            .await
    }

    /// Lists active assignments with `now <= expires_at <= now + days`.
    ///
    /// A window reaching past the representable range ends at the latest instant.
    pub async fn expiring_within(
        &self,
        organization_id: OrganizationId,
        days: u32,
    ) -> AppResult<Vec<RoleAssignment>> {
        let now = Utc::now();
        let until = Duration::try_days(i64::from(days))
            .and_then(|window| now.checked_add_signed(window))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.assignment_repository
            .list_expiring(organization_id, now, until)
            .await
    }

    /// Returns whether the user actively holds the role.
    pub async fn has_active(
        &self,
        user_id: UserId,
        role_id: RoleId,
        organization_id: OrganizationId,
    ) -> AppResult<bool> {
        let latest = self
            .assignment_repository
            .find_latest(user_id, role_id, organization_id)
            .await?;

        Ok(latest.is_some_and(|assignment| assignment.is_active_at(Utc::now())))
    }

    /// Counts assignment records of the organization by lifecycle.
    pub async fn assignment_statistics(
        &self,
        organization_id: OrganizationId,
    ) -> AppResult<AssignmentStatistics> {
        let assignments = self
            .assignment_repository
            .list_for_organization(organization_id)
            .await?;
        let now = Utc::now();
        let week_ahead = now + Duration::days(7);

        let mut statistics = AssignmentStatistics {
            total: assignments.len(),
            ..AssignmentStatistics::default()
        };

        for assignment in &assignments {
            if assignment.is_active_at(now) {
                statistics.active += 1;
                if assignment.is_temporary() {
                    statistics.temporary += 1;
                }
                if assignment.expires_within(now, week_ahead) {
                    statistics.expiring_within_week += 1;
                }
            } else if assignment.is_expired_at(now) {
                statistics.expired += 1;
            } else if assignment.state == AssignmentState::Removed {
                statistics.removed += 1;
            }
        }

        Ok(statistics)
    }
}
