use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use tracing::info;

use warden_application::PermissionCatalogRepository;
use warden_core::{AppError, AppResult};
use warden_domain::{ActionImplication, Permission, PermissionKey, Role};

use crate::postgres_role_repository::{ANY_RESOURCE, replace_role_content};

/// PostgreSQL-backed permission registry and predefined role seed.
#[derive(Clone)]
pub struct PostgresPermissionCatalogRepository {
    pool: PgPool,
}

impl PostgresPermissionCatalogRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct PermissionRow {
    resource: String,
    action: String,
    description: Option<String>,
}

#[async_trait]
impl PermissionCatalogRepository for PostgresPermissionCatalogRepository {
    async fn list_permissions(&self) -> AppResult<Vec<Permission>> {
        let rows = sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT resource, action, description
            FROM rbac_permissions
            ORDER BY resource, action
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list permissions: {error}")))?;

        rows.into_iter()
            .map(|row| {
                let key = PermissionKey::parse_parts(&row.resource, &row.action)?;
                Permission::new(key, row.description)
            })
            .collect::<AppResult<Vec<_>>>()
            .map_err(|error| AppError::Internal(format!("invalid stored permission: {error}")))
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

        let mut transaction =
            self.pool.begin().await.map_err(|error| {
                AppError::Internal(format!("failed to begin transaction: {error}"))
            })?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended('rbac:catalog', 0))")
            .execute(&mut *transaction)
            .await
            .map_err(|error| AppError::Internal(format!("failed to lock rbac catalog: {error}")))?;

        for permission in permissions {
            sqlx::query(
                r#"
                INSERT INTO rbac_permissions (resource, action, description)
                VALUES ($1, $2, $3)
                ON CONFLICT (resource, action) DO UPDATE
                SET description = EXCLUDED.description
                "#,
            )
            .bind(permission.key().resource().as_str())
            .bind(permission.key().action().as_str())
            .bind(permission.description())
            .execute(&mut *transaction)
            .await
            .map_err(|error| AppError::Internal(format!("failed to seed permission: {error}")))?;
        }

        for implication in implications {
            let resource = implication
                .resource()
                .map_or(ANY_RESOURCE, |resource| resource.as_str());

            for implied in implication.implies() {
                sqlx::query(
                    r#"
                    INSERT INTO rbac_action_implications (resource, action, implied_action)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (resource, action, implied_action) DO NOTHING
                    "#,
                )
                .bind(resource)
                .bind(implication.action().as_str())
                .bind(implied.as_str())
                .execute(&mut *transaction)
                .await
                .map_err(|error| {
                    AppError::Internal(format!("failed to seed action implication: {error}"))
                })?;
            }
        }

        for role in predefined_roles {
            sqlx::query(
                r#"
                INSERT INTO rbac_roles (
                    id,
                    organization_id,
                    name,
                    description,
                    role_type,
                    created_at,
                    updated_at
                )
                VALUES ($1, NULL, $2, $3, $4, $5, $6)
                ON CONFLICT (id) DO UPDATE
                SET name = EXCLUDED.name,
                    description = EXCLUDED.description,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(role.id().as_uuid())
            .bind(role.name())
            .bind(role.description())
            .bind(role.role_type().as_str())
            .bind(role.created_at())
            .bind(role.updated_at())
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to seed predefined role '{}': {error}",
                    role.name()
                ))
            })?;

            replace_role_content(&mut transaction, role).await?;
        }

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        info!(
            permissions = permissions.len(),
            implications = implications.len(),
            predefined_roles = predefined_roles.len(),
            "seeded rbac catalog"
        );

        Ok(())
    }
}
