use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use warden_core::{AppError, AppResult, OrganizationId, UserId};
use warden_domain::{
    EffectivePermissions, ImplicationRules, PermissionCheck, PermissionCheckResult,
    PermissionKey, PermissionRegistry,
};

use crate::rbac_ports::{PermissionSetCache, RoleAssignmentRepository, RoleRepository};

/// Answers whether a user holds a permission in an organization.
///
/// Deny-by-default: a user without active assignments holds nothing.
#[derive(Clone)]
pub struct PermissionEvaluator {
    registry: Arc<PermissionRegistry>,
    role_repository: Arc<dyn RoleRepository>,
    assignment_repository: Arc<dyn RoleAssignmentRepository>,
    permission_cache: Option<Arc<dyn PermissionSetCache>>,
    permission_cache_ttl_seconds: u32,
}

impl PermissionEvaluator {
    /// Creates a permission evaluator.
    #[must_use]
    pub fn new(
        registry: Arc<PermissionRegistry>,
        role_repository: Arc<dyn RoleRepository>,
        assignment_repository: Arc<dyn RoleAssignmentRepository>,
    ) -> Self {
        Self {
            registry,
            role_repository,
            assignment_repository,
            permission_cache: None,
            permission_cache_ttl_seconds: 0,
        }
    }

    /// Adds optional permission set caching behavior.
    #[must_use]
    pub fn with_permission_cache(
        mut self,
        permission_cache: Arc<dyn PermissionSetCache>,
        ttl_seconds: u32,
    ) -> Self {
        self.permission_cache = Some(permission_cache);
        self.permission_cache_ttl_seconds = ttl_seconds;
        self
    }

    /// Returns whether the user currently holds `resource:action`.
    pub async fn has_permission(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
        resource: &str,
        action: &str,
    ) -> AppResult<bool> {
        let Some(key) = self.registered_key(resource, action)? else {
            return Ok(false);
        };

        Ok(self
            .effective_permissions(user_id, organization_id)
            .await?
            .grants(&key))
    }

    /// Ensures the user holds `resource:action`, failing with `Forbidden` otherwise.
    pub async fn require_permission(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
        resource: &str,
        action: &str,
    ) -> AppResult<()> {
        if self
            .has_permission(user_id, organization_id, resource, action)
            .await?
        {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "user '{user_id}' is missing permission '{resource}:{action}' in organization '{organization_id}'"
        )))
    }

    /// Evaluates many pairs against one resolution of the user's grants.
    ///
    /// Results are returned in request order.
    pub async fn check_batch(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
        checks: &[PermissionCheck],
    ) -> AppResult<Vec<PermissionCheckResult>> {
        let effective = self.effective_permissions(user_id, organization_id).await?;

        checks
            .iter()
            .map(|check| {
                let allowed = self
                    .registered_key(&check.resource, &check.action)?
                    .is_some_and(|key| effective.grants(&key));

                Ok(PermissionCheckResult {
                    resource: check.resource.clone(),
                    action: check.action.clone(),
                    allowed,
                })
            })
            .collect()
    }

    /// Returns the user's full authorization surface as `RESOURCE:ACTION` strings.
    pub async fn effective_permission_keys(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
    ) -> AppResult<BTreeSet<String>> {
        Ok(self
            .effective_permissions(user_id, organization_id)
            .await?
            .keys_as_strings())
    }

    /// Resolves the user's effective permission set, consulting the cache first.
    ///
    /// Keys implied for pairs the registry does not know are dropped.
    pub async fn effective_permissions(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
    ) -> AppResult<EffectivePermissions> {
        let cache = self
            .permission_cache
            .as_ref()
            .filter(|_| self.permission_cache_ttl_seconds > 0);

        // Read before the ledger scan so a concurrent invalidation wins.
        let version = match cache {
            Some(cache) => {
                let version = cache.current_version(organization_id, user_id).await?;
                if let Some(permissions) =
                    cache.get_permission_set(organization_id, user_id).await?
                {
                    return Ok(permissions);
                }
                Some(version)
            }
            None => None,
        };

        let now = Utc::now();
        let assignments = self
            .assignment_repository
            .list_active_for_user(user_id, organization_id, now)
            .await?;

        let permissions = if assignments.is_empty() {
            EffectivePermissions::default()
        } else {
            let roles = self.role_repository.list_roles(organization_id).await?;
            let rules =
                ImplicationRules::new(self.role_repository.list_action_implications().await?);
            EffectivePermissions::resolve(&assignments, &roles, &rules, now)
                .restricted_to(&self.registry)
        };

        let ttl_seconds = permissions.cache_ttl_seconds(now, self.permission_cache_ttl_seconds);
        if ttl_seconds > 0
            && let (Some(cache), Some(version)) = (cache, version)
        {
            cache
                .set_permission_set(organization_id, user_id, version, &permissions, ttl_seconds)
                .await?;
        }

        Ok(permissions)
    }

    // Malformed and unregistered pairs are never granted.
    fn registered_key(&self, resource: &str, action: &str) -> AppResult<Option<PermissionKey>> {
        match self.registry.validate(resource, action) {
            Ok(key) => Ok(Some(key)),
            Err(error @ (AppError::Validation(_) | AppError::InvalidPermission(_))) => {
                debug!(resource, action, error = %error, "permission check denied for unknown pair");
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests;
