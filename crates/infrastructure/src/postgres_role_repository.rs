use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use warden_application::RoleRepository;
use warden_core::{AppError, AppResult, OrganizationId};
use warden_domain::{
    ActionImplication, ActionName, PermissionKey, ResourceName, Role, RoleContent,
    RoleHierarchy, RoleId, RoleType,
};

mod content;
mod mutations;

pub(crate) use content::replace_role_content;

/// Stored marker for implication rules that apply to every resource.
pub(crate) const ANY_RESOURCE: &str = "*";

/// PostgreSQL-backed repository for role definitions.
#[derive(Clone)]
pub struct PostgresRoleRepository {
    pool: PgPool,
}

impl PostgresRoleRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct RoleRow {
    id: Uuid,
    organization_id: Option<Uuid>,
    name: String,
    description: Option<String>,
    role_type: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct RolePermissionRow {
    role_id: Uuid,
    resource: String,
    action: String,
}

#[derive(Debug, FromRow)]
struct RoleParentRow {
    role_id: Uuid,
    parent_role_id: Uuid,
}

#[derive(Debug, FromRow)]
struct ImplicationRow {
    resource: String,
    action: String,
    implied_action: String,
}

#[async_trait]
impl RoleRepository for PostgresRoleRepository {
    async fn list_roles(&self, organization_id: OrganizationId) -> AppResult<Vec<Role>> {
        let rows = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, organization_id, name, description, role_type, created_at, updated_at
            FROM rbac_roles
            WHERE deleted_at IS NULL
                AND (organization_id IS NULL OR organization_id = $1)
            ORDER BY (organization_id IS NULL) DESC, created_at, id
            "#,
        )
        .bind(organization_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list roles: {error}")))?;

        self.hydrate(rows).await
    }

    async fn find_role(
        &self,
        organization_id: OrganizationId,
        role_id: RoleId,
    ) -> AppResult<Option<Role>> {
        let row = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, organization_id, name, description, role_type, created_at, updated_at
            FROM rbac_roles
            WHERE id = $2
                AND deleted_at IS NULL
                AND (organization_id IS NULL OR organization_id = $1)
            "#,
        )
        .bind(organization_id.as_uuid())
        .bind(role_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find role: {error}")))?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(self.hydrate(vec![row]).await?.into_iter().next())
    }

    async fn create_role(&self, role: &Role, max_custom_roles: u32) -> AppResult<()> {
        self.create_role_impl(role, max_custom_roles).await
    }

    async fn update_role(&self, role: &Role) -> AppResult<()> {
        self.update_role_impl(role).await
    }

    async fn delete_role(
        &self,
        organization_id: OrganizationId,
        role_id: RoleId,
        deleted_at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.delete_role_impl(organization_id, role_id, deleted_at)
            .await
    }

    async fn list_action_implications(&self) -> AppResult<Vec<ActionImplication>> {
        let rows = sqlx::query_as::<_, ImplicationRow>(
            r#"
            SELECT resource, action, implied_action
            FROM rbac_action_implications
            ORDER BY resource, action, implied_action
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list action implications: {error}"))
        })?;

        aggregate_implications(rows)
    }
}

fn aggregate_implications(rows: Vec<ImplicationRow>) -> AppResult<Vec<ActionImplication>> {
    let mut grouped: BTreeMap<(String, String), Vec<String>> = BTreeMap::new();
    for row in rows {
        grouped
            .entry((row.resource, row.action))
            .or_default()
            .push(row.implied_action);
    }

    grouped
        .into_iter()
        .map(|((resource, action), implied)| {
            let resource = if resource == ANY_RESOURCE {
                None
            } else {
                Some(ResourceName::new(resource)?)
            };
            let implied = implied
                .iter()
                .map(ActionName::new)
                .collect::<AppResult<Vec<_>>>()?;

            ActionImplication::new(resource, ActionName::new(action)?, implied)
        })
        .collect()
}

#[cfg(test)]
mod tests;
