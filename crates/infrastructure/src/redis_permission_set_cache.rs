//! Redis-backed permission set cache.
//!
//! Entry keys embed the organization generation and the user generation.
//! Invalidation is a single `INCR`, and a set resolved before an invalidation
//! is written under a key no reader computes anymore. Orphaned entries age
//! out through their own TTL.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use warden_application::{PermissionSetCache, PermissionSetVersion};
use warden_core::{AppError, AppResult, OrganizationId, UserId};
use warden_domain::EffectivePermissions;

/// Redis implementation of the permission set cache port.
#[derive(Clone)]
pub struct RedisPermissionSetCache {
    client: redis::Client,
    key_prefix: String,
}

impl RedisPermissionSetCache {
    /// Creates a cache adapter with a configured Redis client and key prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn organization_generation_key(&self, organization_id: OrganizationId) -> String {
        format!("{}:{organization_id}:generation", self.key_prefix)
    }

    fn user_generation_key(&self, organization_id: OrganizationId, user_id: UserId) -> String {
        format!("{}:{organization_id}:{user_id}:generation", self.key_prefix)
    }

    fn entry_key(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
        version: PermissionSetVersion,
    ) -> String {
        format!(
            "{}:{organization_id}:g{}:{user_id}:v{}",
            self.key_prefix, version.organization, version.user
        )
    }

    async fn connection(&self) -> AppResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))
    }

    async fn read_version(
        &self,
        connection: &mut MultiplexedConnection,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> AppResult<PermissionSetVersion> {
        let generations: Vec<Option<u64>> = connection
            .mget(vec![
                self.organization_generation_key(organization_id),
                self.user_generation_key(organization_id, user_id),
            ])
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to read permission cache generations: {error}"
                ))
            })?;

        Ok(PermissionSetVersion {
            organization: generations.first().copied().flatten().unwrap_or_default(),
            user: generations.get(1).copied().flatten().unwrap_or_default(),
        })
    }

    async fn bump(&self, key: String) -> AppResult<()> {
        let mut connection = self.connection().await?;
        let _generation: u64 = connection.incr(key, 1_u64).await.map_err(|error| {
            AppError::Internal(format!("failed to bump permission cache generation: {error}"))
        })?;

        Ok(())
    }
}

#[async_trait]
impl PermissionSetCache for RedisPermissionSetCache {
    async fn current_version(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> AppResult<PermissionSetVersion> {
        let mut connection = self.connection().await?;
        self.read_version(&mut connection, organization_id, user_id)
            .await
    }

    async fn get_permission_set(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> AppResult<Option<EffectivePermissions>> {
        let mut connection = self.connection().await?;
        let version = self
            .read_version(&mut connection, organization_id, user_id)
            .await?;

        let encoded: Option<String> = connection
            .get(self.entry_key(organization_id, user_id, version))
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to read permission cache entry: {error}"))
            })?;

        encoded
            .as_deref()
            .map(|value| {
                serde_json::from_str::<EffectivePermissions>(value).map_err(|error| {
                    AppError::Internal(format!("invalid permission cache entry: {error}"))
                })
            })
            .transpose()
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

        let value = serde_json::to_string(permissions).map_err(|error| {
            AppError::Internal(format!("failed to encode permission cache entry: {error}"))
        })?;
        let mut connection = self.connection().await?;

        connection
            .set_ex(
                self.entry_key(organization_id, user_id, version),
                value,
                u64::from(ttl_seconds),
            )
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to write permission cache entry: {error}"))
            })
    }

    async fn invalidate_user(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> AppResult<()> {
        self.bump(self.user_generation_key(organization_id, user_id))
            .await
    }

    async fn invalidate_organization(&self, organization_id: OrganizationId) -> AppResult<()> {
        self.bump(self.organization_generation_key(organization_id))
            .await
    }
}
