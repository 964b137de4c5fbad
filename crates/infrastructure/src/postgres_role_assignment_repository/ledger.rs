use super::*;

impl PostgresRoleAssignmentRepository {
    pub(super) async fn insert_assignment_impl(
        &self,
        assignment: &RoleAssignment,
        max_active_per_user: u32,
    ) -> AppResult<()> {
        let now = assignment.assigned_at;
        let mut transaction =
            self.pool.begin().await.map_err(|error| {
                AppError::Internal(format!("failed to begin transaction: {error}"))
            })?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(format!(
                "rbac:assignments:{}:{}",
                assignment.organization_id, assignment.user_id
            ))
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to lock user assignments: {error}"))
            })?;

        // Role deletion locks the row for update, so it waits for this insert
        // or this lock sees the role gone.
        let role_is_live = sqlx::query_scalar::<_, i32>(
            r#"
            SELECT 1
            FROM rbac_roles
            WHERE id = $1
                AND deleted_at IS NULL
                AND (organization_id IS NULL OR organization_id = $2)
            FOR SHARE
            "#,
        )
        .bind(assignment.role_id.as_uuid())
        .bind(assignment.organization_id.as_uuid())
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to lock role: {error}")))?
        .is_some();

        if !role_is_live {
            return Err(AppError::NotFound(format!(
                "role '{}' does not exist",
                assignment.role_id
            )));
        }

        // A lapsed row of the same tuple still holds the active unique index.
        sqlx::query(
            r#"
            UPDATE rbac_role_assignments
            SET state = 'expired', state_changed_by = $4, state_changed_at = $5
            WHERE user_id = $1
                AND role_id = $2
                AND organization_id = $3
                AND state = 'active'
                AND expires_at <= $5
            "#,
        )
        .bind(assignment.user_id.as_uuid())
        .bind(assignment.role_id.as_uuid())
        .bind(assignment.organization_id.as_uuid())
        .bind(Actor::System.subject())
        .bind(now)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to expire lapsed assignment: {error}"))
        })?;

        let held = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT role_id
            FROM rbac_role_assignments
            WHERE user_id = $1
                AND organization_id = $2
                AND state = 'active'
                AND (expires_at IS NULL OR expires_at > $3)
            "#,
        )
        .bind(assignment.user_id.as_uuid())
        .bind(assignment.organization_id.as_uuid())
        .bind(now)
        .fetch_all(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list active assignments: {error}"))
        })?;

        if held.contains(&assignment.role_id.as_uuid()) {
            return Err(duplicate(assignment));
        }

        if held.len() >= usize::try_from(max_active_per_user).unwrap_or(usize::MAX) {
            return Err(AppError::RoleAssignmentLimitExceeded(format!(
                "user '{}' already holds {} active roles in organization '{}'",
                assignment.user_id,
                held.len(),
                assignment.organization_id
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO rbac_role_assignments (
                id,
                user_id,
                role_id,
                organization_id,
                assigned_by,
                assigned_at,
                expires_at,
                state
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(assignment.id.as_uuid())
        .bind(assignment.user_id.as_uuid())
        .bind(assignment.role_id.as_uuid())
        .bind(assignment.organization_id.as_uuid())
        .bind(assignment.assigned_by.subject())
        .bind(assignment.assigned_at)
        .bind(assignment.expires_at)
        .bind(assignment.state.as_str())
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            if let sqlx::Error::Database(database_error) = &error
                && database_error.code().as_deref() == Some("23505")
            {
                return duplicate(assignment);
            }

            AppError::Internal(format!("failed to insert assignment: {error}"))
        })?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        Ok(())
    }

    pub(super) async fn expire_due_impl(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> AppResult<Vec<RoleAssignment>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(
            r#"
            UPDATE rbac_role_assignments
            SET state = 'expired', state_changed_by = $3, state_changed_at = $1
            WHERE id IN (
                SELECT id
                FROM rbac_role_assignments
                WHERE state = 'active'
                    AND expires_at <= $1
                ORDER BY expires_at, id
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING
                id, user_id, role_id, organization_id, assigned_by, assigned_at,
                expires_at, state, state_changed_by, state_changed_at
            "#,
        )
        .bind(now)
        .bind(i64::from(limit))
        .bind(Actor::System.subject())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to expire lapsed assignments: {error}"))
        })?;

        let mut expired = into_assignments(rows)?;
        expired.sort_by_key(|assignment| assignment.expires_at);
        Ok(expired)
    }
}

fn duplicate(assignment: &RoleAssignment) -> AppError {
    AppError::DuplicateRoleAssignment(format!(
        "user '{}' already holds role '{}' in organization '{}'",
        assignment.user_id, assignment.role_id, assignment.organization_id
    ))
}
