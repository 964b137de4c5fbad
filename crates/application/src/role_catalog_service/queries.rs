use super::*;

impl RoleCatalogService {
    /// Returns every role visible to the organization, predefined roles first.
    pub async fn roles_for_organization(
        &self,
        organization_id: OrganizationId,
    ) -> AppResult<Vec<Role>> {
        let mut roles = self.role_repository.list_roles(organization_id).await?;
        sort_for_display(&mut roles);
        Ok(roles)
    }

    /// Returns one role in tenant scope. Roles of other organizations are `NotFound`.
    pub async fn role_details(
        &self,
        role_id: RoleId,
        organization_id: OrganizationId,
    ) -> AppResult<Role> {
        self.role_repository
            .find_role(organization_id, role_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' does not exist")))
    }

    /// Returns roles whose effective grants include the pair.
    pub async fn roles_with_permission(
        &self,
        organization_id: OrganizationId,
        resource: &str,
        action: &str,
    ) -> AppResult<Vec<Role>> {
        let key = self.registry.validate(resource, action)?;
        let roles = self.roles_for_organization(organization_id).await?;
        let rules = ImplicationRules::new(self.role_repository.list_action_implications().await?);

        Ok(roles
            .iter()
            .filter(|role| EffectivePermissions::for_roles([role.id()], &roles, &rules).grants(&key))
            .cloned()
            .collect())
    }

    /// Returns the roles behind the user's active assignments.
    pub async fn roles_for_user(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
    ) -> AppResult<Vec<Role>> {
        let assignments = self
            .assignment_repository
            .list_active_for_user(user_id, organization_id, Utc::now())
            .await?;

        if assignments.is_empty() {
            return Ok(Vec::new());
        }

        let roles = self.roles_for_organization(organization_id).await?;
        Ok(roles
            .into_iter()
            .filter(|role| {
                assignments
                    .iter()
                    .any(|assignment| assignment.role_id == role.id())
            })
            .collect())
    }

    /// Returns whether the user actively holds a role with this name.
    pub async fn has_role_named(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
        name: &str,
    ) -> AppResult<bool> {
        Ok(self
            .roles_for_user(user_id, organization_id)
            .await?
            .iter()
            .any(|role| role.has_name(name)))
    }

    /// Counts roles visible to the organization.
    pub async fn role_statistics(
        &self,
        organization_id: OrganizationId,
    ) -> AppResult<RoleStatistics> {
        let roles = self.role_repository.list_roles(organization_id).await?;
        let predefined = roles.iter().filter(|role| role.is_predefined()).count();

        Ok(RoleStatistics {
            total: roles.len(),
            custom: roles.len() - predefined,
            predefined,
        })
    }
}
