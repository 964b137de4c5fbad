use async_trait::async_trait;
use warden_core::{AppResult, OrganizationId, UserId};
use warden_domain::EffectivePermissions;

/// Invalidation counters observed before a permission set was resolved.
///
/// Any invalidation touching the user bumps one of the counters, so a set
/// resolved under an older version must not be stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PermissionSetVersion {
    /// Bumped by organization-wide invalidation.
    pub organization: u64,
    /// Bumped by invalidation of the single user.
    pub user: u64,
}

/// Optional cache port for resolved permission sets.
#[async_trait]
pub trait PermissionSetCache: Send + Sync {
    /// Returns the current invalidation counters of one user in one organization.
    async fn current_version(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> AppResult<PermissionSetVersion>;

    /// Returns the cached set for one user in one organization.
    async fn get_permission_set(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> AppResult<Option<EffectivePermissions>>;

    /// Stores a set resolved after `version` was read, with ttl.
    ///
    /// The write is dropped when an invalidation happened since `version`.
    async fn set_permission_set(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
        version: PermissionSetVersion,
        permissions: &EffectivePermissions,
        ttl_seconds: u32,
    ) -> AppResult<()>;

    /// Drops the cached set of one user.
    async fn invalidate_user(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> AppResult<()>;

    /// Drops every cached set in one organization.
    async fn invalidate_organization(&self, organization_id: OrganizationId) -> AppResult<()>;
}
