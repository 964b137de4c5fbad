use super::*;

impl PostgresRoleRepository {
    pub(super) async fn create_role_impl(&self, role: &Role, max_custom_roles: u32) -> AppResult<()> {
        let organization_id = owning_organization(role)?;
        let mut transaction =
            self.pool.begin().await.map_err(|error| {
                AppError::Internal(format!("failed to begin transaction: {error}"))
            })?;

        lock_organization_roles(&mut transaction, organization_id).await?;
        ensure_unique_name(&mut transaction, organization_id, role).await?;

        let owned = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM rbac_roles
            WHERE organization_id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(organization_id.as_uuid())
        .fetch_one(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to count custom roles: {error}")))?;

        if owned >= i64::from(max_custom_roles) {
            return Err(AppError::Conflict(format!(
                "organization '{organization_id}' already has {owned} custom roles"
            )));
        }

        ensure_valid_parents(&mut transaction, organization_id, role).await?;

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
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(role.id().as_uuid())
        .bind(organization_id.as_uuid())
        .bind(role.name())
        .bind(role.description())
        .bind(role.role_type().as_str())
        .bind(role.created_at())
        .bind(role.updated_at())
        .execute(&mut *transaction)
        .await
        .map_err(|error| map_role_conflict(error, role.name(), "create"))?;

        replace_role_content(&mut transaction, role).await?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        Ok(())
    }

    pub(super) async fn update_role_impl(&self, role: &Role) -> AppResult<()> {
        let organization_id = owning_organization(role)?;
        let mut transaction =
            self.pool.begin().await.map_err(|error| {
                AppError::Internal(format!("failed to begin transaction: {error}"))
            })?;

        lock_organization_roles(&mut transaction, organization_id).await?;
        ensure_unique_name(&mut transaction, organization_id, role).await?;
        ensure_valid_parents(&mut transaction, organization_id, role).await?;

        let rows_affected = sqlx::query(
            r#"
            UPDATE rbac_roles
            SET name = $3, description = $4, updated_at = $5
            WHERE id = $1
                AND organization_id = $2
                AND deleted_at IS NULL
            "#,
        )
        .bind(role.id().as_uuid())
        .bind(organization_id.as_uuid())
        .bind(role.name())
        .bind(role.description())
        .bind(role.updated_at())
        .execute(&mut *transaction)
        .await
        .map_err(|error| map_role_conflict(error, role.name(), "update"))?
        .rows_affected();

        if rows_affected == 0 {
            return Err(AppError::NotFound(format!(
                "role '{}' does not exist in organization '{organization_id}'",
                role.id()
            )));
        }

        replace_role_content(&mut transaction, role).await?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        Ok(())
    }
    pub(super) async fn delete_role_impl(
        &self,
        organization_id: OrganizationId,
        role_id: RoleId,
        deleted_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut transaction =
            self.pool.begin().await.map_err(|error| {
                AppError::Internal(format!("failed to begin transaction: {error}"))
            })?;

        lock_organization_roles(&mut transaction, organization_id).await?;

        // Assignment inserts hold a share lock on the role row until they commit.
        let name = sqlx::query_scalar::<_, String>(
            r#"
            SELECT name
            FROM rbac_roles
            WHERE id = $2
                AND organization_id = $1
                AND deleted_at IS NULL
            FOR UPDATE
            "#,
        )
        .bind(organization_id.as_uuid())
        .bind(role_id.as_uuid())
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to lock role: {error}")))?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "role '{role_id}' does not exist in organization '{organization_id}'"
            ))
        })?;

        let active_assignments = sqlx::query_scalar::<_, i64>(
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
        .bind(deleted_at)
        .fetch_one(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to count role assignments: {error}"))
        })?;

        if active_assignments > 0 {
            return Err(AppError::RoleInUse(format!(
                "role '{name}' has {active_assignments} active assignments"
            )));
        }

        let children = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM rbac_role_parents parents
            JOIN rbac_roles roles ON roles.id = parents.role_id
            WHERE parents.parent_role_id = $1
                AND roles.deleted_at IS NULL
            "#,
        )
        .bind(role_id.as_uuid())
        .fetch_one(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to count child roles: {error}")))?;

        if children > 0 {
            return Err(AppError::RoleInUse(format!(
                "role '{name}' is inherited by {children} other roles"
            )));
        }

        sqlx::query(
            r#"
            UPDATE rbac_roles
            SET deleted_at = $2, updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(role_id.as_uuid())
        .bind(deleted_at)
        .execute(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to delete role: {error}")))?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        Ok(())
    }
}

fn owning_organization(role: &Role) -> AppResult<OrganizationId> {
    role.organization_id().ok_or_else(|| {
        AppError::ImmutableRole(format!("predefined role '{}' cannot be modified", role.name()))
    })
}

/// Serializes role writes of one organization until the transaction ends.
async fn lock_organization_roles(
    transaction: &mut Transaction<'_, Postgres>,
    organization_id: OrganizationId,
) -> AppResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(format!("rbac:roles:{organization_id}"))
        .execute(&mut **transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to lock organization roles: {error}")))?;

    Ok(())
}

async fn ensure_unique_name(
    transaction: &mut Transaction<'_, Postgres>,
    organization_id: OrganizationId,
    role: &Role,
) -> AppResult<()> {
    let taken = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
            SELECT 1
            FROM rbac_roles
            WHERE deleted_at IS NULL
                AND (organization_id IS NULL OR organization_id = $1)
                AND lower(name) = lower($2)
                AND id <> $3
        )
        "#,
    )
    .bind(organization_id.as_uuid())
    .bind(role.name())
    .bind(role.id().as_uuid())
    .fetch_one(&mut **transaction)
    .await
    .map_err(|error| AppError::Internal(format!("failed to check role name: {error}")))?;

    if taken {
        return Err(AppError::Conflict(format!(
            "role '{}' already exists in organization '{organization_id}'",
            role.name()
        )));
    }

    Ok(())
}

// Runs under the organization lock, so concurrent parent edits see each other.
async fn ensure_valid_parents(
    transaction: &mut Transaction<'_, Postgres>,
    organization_id: OrganizationId,
    role: &Role,
) -> AppResult<()> {
    if role.parent_role_ids().is_empty() {
        return Ok(());
    }

    let requested: Vec<Uuid> = role
        .parent_role_ids()
        .iter()
        .map(RoleId::as_uuid)
        .collect();
    let live = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT id
        FROM rbac_roles
        WHERE id = ANY($2)
            AND deleted_at IS NULL
            AND (organization_id IS NULL OR organization_id = $1)
        "#,
    )
    .bind(organization_id.as_uuid())
    .bind(&requested)
    .fetch_all(&mut **transaction)
    .await
    .map_err(|error| AppError::Internal(format!("failed to load parent roles: {error}")))?;

    if let Some(missing) = requested.iter().find(|parent_id| !live.contains(parent_id)) {
        return Err(AppError::NotFound(format!(
            "parent role '{missing}' does not exist"
        )));
    }

    let links = sqlx::query_as::<_, RoleParentRow>(
        r#"
        SELECT parents.role_id, parents.parent_role_id
        FROM rbac_role_parents parents
        JOIN rbac_roles roles ON roles.id = parents.role_id
        WHERE roles.deleted_at IS NULL
            AND (roles.organization_id IS NULL OR roles.organization_id = $1)
        "#,
    )
    .bind(organization_id.as_uuid())
    .fetch_all(&mut **transaction)
    .await
    .map_err(|error| AppError::Internal(format!("failed to load role parents: {error}")))?;

    RoleHierarchy::from_parent_links(links.into_iter().map(|row| {
        (
            RoleId::from_uuid(row.role_id),
            RoleId::from_uuid(row.parent_role_id),
        )
    }))
    .ensure_acyclic(role.id(), role.parent_role_ids())
}

fn map_role_conflict(error: sqlx::Error, role_name: &str, operation: &str) -> AppError {
    if let sqlx::Error::Database(database_error) = &error
        && database_error.code().as_deref() == Some("23505")
    {
        return AppError::Conflict(format!("role '{role_name}' already exists"));
    }

    AppError::Internal(format!("failed to {operation} role: {error}"))
}
