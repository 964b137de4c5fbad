use super::*;

impl PostgresRoleRepository {
    /// Attaches grants and parents to role rows, preserving row order.
    pub(super) async fn hydrate(&self, rows: Vec<RoleRow>) -> AppResult<Vec<Role>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let role_ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();

        let permission_rows = sqlx::query_as::<_, RolePermissionRow>(
            r#"
            SELECT role_id, resource, action
            FROM rbac_role_permissions
            WHERE role_id = ANY($1)
            ORDER BY role_id, position
            "#,
        )
        .bind(&role_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load role permissions: {error}")))?;

        let parent_rows = sqlx::query_as::<_, RoleParentRow>(
            r#"
            SELECT role_id, parent_role_id
            FROM rbac_role_parents
            WHERE role_id = ANY($1)
            ORDER BY role_id, position
            "#,
        )
        .bind(&role_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load role parents: {error}")))?;

        let mut permissions: HashMap<Uuid, Vec<PermissionKey>> = HashMap::new();
        for row in permission_rows {
            let key = PermissionKey::parse_parts(&row.resource, &row.action).map_err(|error| {
                AppError::Internal(format!(
                    "invalid stored permission '{}:{}' for role '{}': {error}",
                    row.resource, row.action, row.role_id
                ))
            })?;
            permissions.entry(row.role_id).or_default().push(key);
        }

        let mut parents: HashMap<Uuid, Vec<RoleId>> = HashMap::new();
        for row in parent_rows {
            parents
                .entry(row.role_id)
                .or_default()
                .push(RoleId::from_uuid(row.parent_role_id));
        }

        rows.into_iter()
            .map(|row| {
                let role_id = row.id;
                restore_role(
                    row,
                    permissions.remove(&role_id).unwrap_or_default(),
                    parents.remove(&role_id).unwrap_or_default(),
                )
            })
            .collect()
    }
}

fn restore_role(
    row: RoleRow,
    permissions: Vec<PermissionKey>,
    parent_role_ids: Vec<RoleId>,
) -> AppResult<Role> {
    let role_type = row.role_type.parse::<RoleType>().map_err(|error| {
        AppError::Internal(format!("invalid stored role type for '{}': {error}", row.id))
    })?;

    Role::restore(
        RoleId::from_uuid(row.id),
        row.organization_id.map(OrganizationId::from_uuid),
        role_type,
        RoleContent {
            name: row.name,
            description: row.description,
            permissions,
            parent_role_ids,
        },
        row.created_at,
        row.updated_at,
    )
    .map_err(|error| AppError::Internal(format!("invalid stored role '{}': {error}", row.id)))
}

/// Replaces the grant and parent rows of a role inside an open transaction.
pub(crate) async fn replace_role_content(
    transaction: &mut Transaction<'_, Postgres>,
    role: &Role,
) -> AppResult<()> {
    let role_id = role.id().as_uuid();

    sqlx::query("DELETE FROM rbac_role_permissions WHERE role_id = $1")
        .bind(role_id)
        .execute(&mut **transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to clear role permissions: {error}"))
        })?;

    sqlx::query("DELETE FROM rbac_role_parents WHERE role_id = $1")
        .bind(role_id)
        .execute(&mut **transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to clear role parents: {error}")))?;

    for (position, key) in (0_i32..).zip(role.permissions()) {
        sqlx::query(
            r#"
            INSERT INTO rbac_role_permissions (role_id, resource, action, position)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(role_id)
        .bind(key.resource().as_str())
        .bind(key.action().as_str())
        .bind(position)
        .execute(&mut **transaction)
        .await
        .map_err(|error| map_foreign_key(error, "permission", &key.to_string()))?;
    }

    for (position, parent_role_id) in (0_i32..).zip(role.parent_role_ids()) {
        sqlx::query(
            r#"
            INSERT INTO rbac_role_parents (role_id, parent_role_id, position)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(role_id)
        .bind(parent_role_id.as_uuid())
        .bind(position)
        .execute(&mut **transaction)
        .await
        .map_err(|error| map_foreign_key(error, "parent role", &parent_role_id.to_string()))?;
    }

    Ok(())
}

fn map_foreign_key(error: sqlx::Error, kind: &str, value: &str) -> AppError {
    if let sqlx::Error::Database(database_error) = &error
        && database_error.code().as_deref() == Some("23503")
    {
        return match kind {
            "permission" => AppError::InvalidPermission(format!("permission '{value}' is not registered")),
            _ => AppError::NotFound(format!("{kind} '{value}' does not exist")),
        };
    }

    AppError::Internal(format!("failed to persist role {kind}: {error}"))
}
