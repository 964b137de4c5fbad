use super::*;

#[async_trait]
impl RoleRepository for InMemoryRbacRepository {
    async fn list_roles(&self, organization_id: OrganizationId) -> AppResult<Vec<Role>> {
        let state = self.state.read().await;
        let mut visible: Vec<Role> = state.live_roles(organization_id).cloned().collect();
        visible.sort_by(|left, right| {
            right
                .is_predefined()
                .cmp(&left.is_predefined())
                .then_with(|| left.created_at().cmp(&right.created_at()))
        });

        Ok(visible)
    }

    async fn find_role(
        &self,
        organization_id: OrganizationId,
        role_id: RoleId,
    ) -> AppResult<Option<Role>> {
        Ok(self
            .state
            .read()
            .await
            .roles
            .get(&role_id)
            .filter(|stored| stored.is_live_for(organization_id))
            .map(|stored| stored.role.clone()))
    }

    async fn create_role(&self, role: &Role, max_custom_roles: u32) -> AppResult<()> {
        let organization_id = owning_organization(role)?;
        let mut state = self.state.write().await;

        if state.roles.contains_key(&role.id()) {
            return Err(AppError::Conflict(format!(
                "role '{}' already exists",
                role.id()
            )));
        }

        state.ensure_unique_name(organization_id, role)?;

        let owned = state
            .roles
            .values()
            .filter(|stored| {
                stored.deleted_at.is_none() && stored.role.organization_id() == Some(organization_id)
            })
            .count();
        if owned >= saturating_usize(max_custom_roles) {
            return Err(AppError::Conflict(format!(
                "organization '{organization_id}' already has {owned} custom roles"
            )));
        }

        state.ensure_valid_parents(organization_id, role)?;

        state.roles.insert(
            role.id(),
            StoredRole {
                role: role.clone(),
                deleted_at: None,
            },
        );
        Ok(())
    }

    async fn update_role(&self, role: &Role) -> AppResult<()> {
        let organization_id = owning_organization(role)?;
        let mut state = self.state.write().await;

        if !state.is_live_role(organization_id, role.id()) {
            return Err(AppError::NotFound(format!(
                "role '{}' does not exist",
                role.id()
            )));
        }

        state.ensure_unique_name(organization_id, role)?;
        state.ensure_valid_parents(organization_id, role)?;

        if let Some(stored) = state.roles.get_mut(&role.id()) {
            stored.role = role.clone();
        }
        Ok(())
    }

    async fn delete_role(
        &self,
        organization_id: OrganizationId,
        role_id: RoleId,
        deleted_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        let Some(name) = state
            .roles
            .get(&role_id)
            .filter(|stored| stored.is_live_for(organization_id) && !stored.role.is_predefined())
            .map(|stored| stored.role.name().to_owned())
        else {
            return Err(AppError::NotFound(format!("role '{role_id}' does not exist")));
        };

        let active_assignments = state.count_active_for_role(role_id, organization_id, deleted_at);
        if active_assignments > 0 {
            return Err(AppError::RoleInUse(format!(
                "role '{name}' has {active_assignments} active assignments"
            )));
        }

        let children = RoleHierarchy::from_roles(state.live_roles(organization_id))
            .direct_children_of(role_id);
        if !children.is_empty() {
            return Err(AppError::RoleInUse(format!(
                "role '{name}' is inherited by {} other roles",
                children.len()
            )));
        }

        if let Some(stored) = state.roles.get_mut(&role_id) {
            stored.deleted_at = Some(deleted_at);
        }
        Ok(())
    }

    async fn list_action_implications(&self) -> AppResult<Vec<ActionImplication>> {
        Ok(self.state.read().await.implications.clone())
    }
}
