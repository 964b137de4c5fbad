use super::*;

#[async_trait]
impl RoleAssignmentRepository for InMemoryRbacRepository {
    async fn insert_assignment(
        &self,
        assignment: &RoleAssignment,
        max_active_per_user: u32,
    ) -> AppResult<()> {
        let now = assignment.assigned_at;
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        // Role deletion takes the same lock, so a live role stays live until the push.
        if !state.is_live_role(assignment.organization_id, assignment.role_id) {
            return Err(AppError::NotFound(format!(
                "role '{}' does not exist",
                assignment.role_id
            )));
        }

        let records = &mut state.assignments;
        let held: Vec<RoleId> = records
            .iter()
            .filter(|record| {
                record.user_id == assignment.user_id
                    && record.organization_id == assignment.organization_id
                    && record.is_active_at(now)
            })
            .map(|record| record.role_id)
            .collect();

        if held.contains(&assignment.role_id) {
            return Err(AppError::DuplicateRoleAssignment(format!(
                "user '{}' already holds role '{}' in organization '{}'",
                assignment.user_id, assignment.role_id, assignment.organization_id
            )));
        }

        if held.len() >= saturating_usize(max_active_per_user) {
            return Err(AppError::RoleAssignmentLimitExceeded(format!(
                "user '{}' already holds {} active roles in organization '{}'",
                assignment.user_id,
                held.len(),
                assignment.organization_id
            )));
        }

        for record in records.iter_mut().filter(|record| {
            matches_tuple(
                record,
                assignment.user_id,
                assignment.role_id,
                assignment.organization_id,
            ) && record.state == AssignmentState::Active
        }) {
            record.mark_expired(now)?;
        }

        records.push(assignment.clone());
        Ok(())
    }

    async fn find_latest(
        &self,
        user_id: UserId,
        role_id: RoleId,
        organization_id: OrganizationId,
    ) -> AppResult<Option<RoleAssignment>> {
        Ok(self
            .state
            .read()
            .await
            .assignments
            .iter()
            .filter(|record| matches_tuple(record, user_id, role_id, organization_id))
            .max_by_key(|record| record.assigned_at)
            .cloned())
    }

    async fn remove_active(
        &self,
        user_id: UserId,
        role_id: RoleId,
        organization_id: OrganizationId,
        removed_by: Actor,
        at: DateTime<Utc>,
    ) -> AppResult<Option<RoleAssignment>> {
        let mut state = self.state.write().await;
        let records = &mut state.assignments;
        let Some(record) = records.iter_mut().find(|record| {
            matches_tuple(record, user_id, role_id, organization_id) && record.is_active_at(at)
        }) else {
            return Ok(None);
        };

        record.mark_removed(removed_by, at)?;
        Ok(Some(record.clone()))
    }

    async fn update_expiration(
        &self,
        user_id: UserId,
        role_id: RoleId,
        organization_id: OrganizationId,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<Option<RoleAssignment>> {
        let mut state = self.state.write().await;
        let records = &mut state.assignments;
        let Some(record) = records.iter_mut().find(|record| {
            matches_tuple(record, user_id, role_id, organization_id) && record.is_active_at(now)
        }) else {
            return Ok(None);
        };

        record.extend(expires_at, now)?;
        Ok(Some(record.clone()))
    }

    async fn list_active_for_user(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<RoleAssignment>> {
        Ok(self
            .state
            .read()
            .await
            .assignments
            .iter()
            .filter(|record| {
                record.user_id == user_id
                    && record.organization_id == organization_id
                    && record.is_active_at(now)
            })
            .cloned()
            .collect())
    }

    async fn list_for_role(
        &self,
        role_id: RoleId,
        organization_id: OrganizationId,
    ) -> AppResult<Vec<RoleAssignment>> {
        let mut records: Vec<RoleAssignment> = self
            .state
            .read()
            .await
            .assignments
            .iter()
            .filter(|record| record.role_id == role_id && record.organization_id == organization_id)
            .cloned()
            .collect();
        records.sort_by(|left, right| right.assigned_at.cmp(&left.assigned_at));

        Ok(records)
    }

    async fn list_for_organization(
        &self,
        organization_id: OrganizationId,
    ) -> AppResult<Vec<RoleAssignment>> {
        Ok(self
            .state
            .read()
            .await
            .assignments
            .iter()
            .filter(|record| record.organization_id == organization_id)
            .cloned()
            .collect())
    }

    async fn list_expiring(
        &self,
        organization_id: OrganizationId,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AppResult<Vec<RoleAssignment>> {
        let mut records: Vec<RoleAssignment> = self
            .state
            .read()
            .await
            .assignments
            .iter()
            .filter(|record| {
                record.organization_id == organization_id && record.expires_within(from, until)
            })
            .cloned()
            .collect();
        records.sort_by_key(|record| record.expires_at);

        Ok(records)
    }

    async fn count_active_for_role(
        &self,
        role_id: RoleId,
        organization_id: OrganizationId,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let count = self
            .state
            .read()
            .await
            .count_active_for_role(role_id, organization_id, now);

        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }

    async fn expire_due(&self, now: DateTime<Utc>, limit: u32) -> AppResult<Vec<RoleAssignment>> {
        let mut state = self.state.write().await;
        let records = &mut state.assignments;
        let mut due: Vec<&mut RoleAssignment> = records
            .iter_mut()
            .filter(|record| record.state == AssignmentState::Active && record.has_lapsed_at(now))
            .collect();
        due.sort_by_key(|record| record.expires_at);

        let mut expired = Vec::new();
        for record in due.into_iter().take(saturating_usize(limit)) {
            record.mark_expired(now)?;
            expired.push(record.clone());
        }

        Ok(expired)
    }
}
