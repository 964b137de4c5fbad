use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use warden_application::RoleAssignmentRepository;
use warden_core::{Actor, AppError, AppResult, OrganizationId, UserId};
use warden_domain::{AssignmentId, AssignmentState, RoleAssignment, RoleId};

mod ledger;

/// PostgreSQL-backed role assignment ledger.
#[derive(Clone)]
pub struct PostgresRoleAssignmentRepository {
    pool: PgPool,
}

impl PostgresRoleAssignmentRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AssignmentRow {
    id: Uuid,
    user_id: Uuid,
    role_id: Uuid,
    organization_id: Uuid,
    assigned_by: String,
    assigned_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    state: String,
    state_changed_by: Option<String>,
    state_changed_at: Option<DateTime<Utc>>,
}

impl AssignmentRow {
    fn into_assignment(self) -> AppResult<RoleAssignment> {
        let invalid = |field: &str, error: AppError| {
            AppError::Internal(format!(
                "invalid stored {field} for assignment '{}': {error}",
                self.id
            ))
        };

        let assigned_by =
            Actor::from_str(&self.assigned_by).map_err(|error| invalid("assigned_by", error))?;
        let state =
            AssignmentState::from_str(&self.state).map_err(|error| invalid("state", error))?;
        let state_changed_by = self
            .state_changed_by
            .as_deref()
            .map(Actor::from_str)
            .transpose()
            .map_err(|error| invalid("state_changed_by", error))?;

        Ok(RoleAssignment {
            id: AssignmentId::from_uuid(self.id),
            user_id: UserId::from_uuid(self.user_id),
            role_id: RoleId::from_uuid(self.role_id),
            organization_id: OrganizationId::from_uuid(self.organization_id),
            assigned_by,
            assigned_at: self.assigned_at,
            expires_at: self.expires_at,
            state,
            state_changed_by,
            state_changed_at: self.state_changed_at,
        })
    }
}

fn into_assignments(rows: Vec<AssignmentRow>) -> AppResult<Vec<RoleAssignment>> {
    rows.into_iter().map(AssignmentRow::into_assignment).collect()
}

#[async_trait]
impl RoleAssignmentRepository for PostgresRoleAssignmentRepository {
    async fn insert_assignment(
        &self,
        assignment: &RoleAssignment,
        max_active_per_user: u32,
    ) -> AppResult<()> {
        self.insert_assignment_impl(assignment, max_active_per_user)
            .await
    }

    async fn find_latest(
        &self,
        user_id: UserId,
        role_id: RoleId,
        organization_id: OrganizationId,
    ) -> AppResult<Option<RoleAssignment>> {
        let row = sqlx::query_as::<_, AssignmentRow>(
            r#"
            SELECT
                id, user_id, role_id, organization_id, assigned_by, assigned_at,
                expires_at, state, state_changed_by, state_changed_at
            FROM rbac_role_assignments
            WHERE user_id = $1 AND role_id = $2 AND organization_id = $3
            ORDER BY assigned_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(role_id.as_uuid())
        .bind(organization_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find assignment: {error}")))?;

        row.map(AssignmentRow::into_assignment).transpose()
    }

    async fn remove_active(
        &self,
        user_id: UserId,
        role_id: RoleId,
        organization_id: OrganizationId,
        removed_by: Actor,
        at: DateTime<Utc>,
    ) -> AppResult<Option<RoleAssignment>> {
        let row = sqlx::query_as::<_, AssignmentRow>(
            r#"
            UPDATE rbac_role_assignments
            SET state = 'removed', state_changed_by = $4, state_changed_at = $5
            WHERE user_id = $1
                AND role_id = $2
                AND organization_id = $3
                AND state = 'active'
                AND (expires_at IS NULL OR expires_at > $5)
            RETURNING
                id, user_id, role_id, organization_id, assigned_by, assigned_at,
                expires_at, state, state_changed_by, state_changed_at
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(role_id.as_uuid())
        .bind(organization_id.as_uuid())
        .bind(removed_by.subject())
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to remove assignment: {error}")))?;

        row.map(AssignmentRow::into_assignment).transpose()
    }

    async fn update_expiration(
        &self,
        user_id: UserId,
        role_id: RoleId,
        organization_id: OrganizationId,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<Option<RoleAssignment>> {
        if expires_at <= now {
            let active = sqlx::query_scalar::<_, bool>(
                r#"
                SELECT EXISTS (
                    SELECT 1
                    FROM rbac_role_assignments
                    WHERE user_id = $1
                        AND role_id = $2
                        AND organization_id = $3
                        AND state = 'active'
                        AND (expires_at IS NULL OR expires_at > $4)
                )
                "#,
            )
            .bind(user_id.as_uuid())
            .bind(role_id.as_uuid())
            .bind(organization_id.as_uuid())
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to check active assignment: {error}"))
            })?;

            if !active {
                return Ok(None);
            }

            return Err(AppError::Validation(
                "new expiration must be in the future".to_owned(),
            ));
        }

        let row = sqlx::query_as::<_, AssignmentRow>(
            r#"
            UPDATE rbac_role_assignments
            SET expires_at = $4
            WHERE user_id = $1
                AND role_id = $2
                AND organization_id = $3
                AND state = 'active'
                AND (expires_at IS NULL OR expires_at > $5)
            RETURNING
                id, user_id, role_id, organization_id, assigned_by, assigned_at,
                expires_at, state, state_changed_by, state_changed_at
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(role_id.as_uuid())
        .bind(organization_id.as_uuid())
        .bind(expires_at)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to update assignment expiration: {error}"))
        })?;

        row.map(AssignmentRow::into_assignment).transpose()
    }

    async fn list_active_for_user(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<RoleAssignment>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(
            r#"
            SELECT
                id, user_id, role_id, organization_id, assigned_by, assigned_at,
                expires_at, state, state_changed_by, state_changed_at
            FROM rbac_role_assignments
            WHERE user_id = $1
                AND organization_id = $2
                AND state = 'active'
                AND (expires_at IS NULL OR expires_at > $3)
            ORDER BY assigned_at
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(organization_id.as_uuid())
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list active assignments: {error}"))
        })?;

        into_assignments(rows)
    }

    async fn list_for_role(
        &self,
        role_id: RoleId,
        organization_id: OrganizationId,
    ) -> AppResult<Vec<RoleAssignment>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(
            r#"
            SELECT
                id, user_id, role_id, organization_id, assigned_by, assigned_at,
                expires_at, state, state_changed_by, state_changed_at
            FROM rbac_role_assignments
            WHERE role_id = $1 AND organization_id = $2
            ORDER BY assigned_at DESC, id DESC
            "#,
        )
        .bind(role_id.as_uuid())
        .bind(organization_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list role assignments: {error}")))?;

        into_assignments(rows)
    }

    async fn list_for_organization(
        &self,
        organization_id: OrganizationId,
    ) -> AppResult<Vec<RoleAssignment>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(
            r#"
            SELECT
                id, user_id, role_id, organization_id, assigned_by, assigned_at,
                expires_at, state, state_changed_by, state_changed_at
            FROM rbac_role_assignments
            WHERE organization_id = $1
            ORDER BY assigned_at
            "#,
        )
        .bind(organization_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list organization assignments: {error}"))
        })?;

        into_assignments(rows)
    }

    async fn list_expiring(
        &self,
        organization_id: OrganizationId,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AppResult<Vec<RoleAssignment>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(
            r#"
            SELECT
                id, user_id, role_id, organization_id, assigned_by, assigned_at,
                expires_at, state, state_changed_by, state_changed_at
            FROM rbac_role_assignments
            WHERE organization_id = $1
                AND state = 'active'
                AND expires_at BETWEEN $2 AND $3
            ORDER BY expires_at, id
            "#,
        )
        .bind(organization_id.as_uuid())
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list expiring assignments: {error}"))
        })?;

        into_assignments(rows)
    }

    async fn count_active_for_role(
        &self,
        role_id: RoleId,
        organization_id: OrganizationId,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM rbac_role_assignments
            WHERE role_id = $1
                AND organization_id = $2
                AND state = 'active'
                AND (expires_at IS NULL OR expires_at > $3)
            "#,
        )
        .bind(role_id.as_uuid())
        .bind(organization_id.as_uuid())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to count active assignments: {error}"))
        })?;

        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn expire_due(&self, now: DateTime<Utc>, limit: u32) -> AppResult<Vec<RoleAssignment>> {
        self.expire_due_impl(now, limit).await
    }
}
