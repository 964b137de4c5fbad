use async_trait::async_trait;
use warden_core::AppResult;
use warden_domain::{ActionImplication, Permission, Role};

/// Port for the system-wide permission catalog and predefined roles.
#[async_trait]
pub trait PermissionCatalogRepository: Send + Sync {
    /// Lists every registered permission.
    async fn list_permissions(&self) -> AppResult<Vec<Permission>>;

    /// Upserts permissions, implication rules and predefined roles.
    async fn seed_catalog(
        &self,
        permissions: &[Permission],
        implications: &[ActionImplication],
        predefined_roles: &[Role],
    ) -> AppResult<()>;
}
