use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use warden_application::{PermissionSetCache, PermissionSetVersion};
use warden_core::{AppResult, OrganizationId, UserId};
use warden_domain::EffectivePermissions;

#[derive(Debug, Clone)]
struct PermissionSetEntry {
    permissions: EffectivePermissions,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<(OrganizationId, UserId), PermissionSetEntry>,
    organization_generations: HashMap<OrganizationId, u64>,
    user_generations: HashMap<(OrganizationId, UserId), u64>,
}

impl CacheState {
    fn version(&self, organization_id: OrganizationId, user_id: UserId) -> PermissionSetVersion {
        PermissionSetVersion {
            organization: self
                .organization_generations
                .get(&organization_id)
                .copied()
                .unwrap_or_default(),
            user: self
                .user_generations
                .get(&(organization_id, user_id))
                .copied()
                .unwrap_or_default(),
        }
    }
}

/// In-memory cache adapter for resolved permission sets.
#[derive(Debug, Default)]
pub struct InMemoryPermissionSetCache {
    state: RwLock<CacheState>,
}

impl InMemoryPermissionSetCache {
    /// Creates an empty in-memory permission set cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PermissionSetCache for InMemoryPermissionSetCache {
    async fn current_version(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> AppResult<PermissionSetVersion> {
        Ok(self.state.read().await.version(organization_id, user_id))
    }

    async fn get_permission_set(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> AppResult<Option<EffectivePermissions>> {
        let key = (organization_id, user_id);
        {
            let state = self.state.read().await;
            if let Some(entry) = state.entries.get(&key) {
                if entry.expires_at > Instant::now() {
                    return Ok(Some(entry.permissions.clone()));
                }
            } else {
                return Ok(None);
            }
        }

        let mut state = self.state.write().await;
        if state
            .entries
            .get(&key)
            .is_some_and(|entry| entry.expires_at <= Instant::now())
        {
            state.entries.remove(&key);
        }

        Ok(None)
    }

    async fn set_permission_set(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
        version: PermissionSetVersion,
        permissions: &EffectivePermissions,
        ttl_seconds: u32,
    ) -> AppResult<()> {
        if ttl_seconds == 0 {
            return Ok(());
        }

        let now = Instant::now();
        let expires_at = now
            .checked_add(Duration::from_secs(u64::from(ttl_seconds)))
            .unwrap_or(now);

        let mut state = self.state.write().await;
        if state.version(organization_id, user_id) != version {
            return Ok(());
        }

        state.entries.insert(
            (organization_id, user_id),
            PermissionSetEntry {
                permissions: permissions.clone(),
                expires_at,
            },
        );

        Ok(())
    }

    async fn invalidate_user(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        *state
            .user_generations
            .entry((organization_id, user_id))
            .or_default() += 1;
        state.entries.remove(&(organization_id, user_id));
        Ok(())
    }

    async fn invalidate_organization(&self, organization_id: OrganizationId) -> AppResult<()> {
        let mut state = self.state.write().await;
        *state
            .organization_generations
            .entry(organization_id)
            .or_default() += 1;
        state
            .entries
            .retain(|(cached_organization_id, _), _| *cached_organization_id != organization_id);
        Ok(())
    }
}
