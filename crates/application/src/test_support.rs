//! In-process fakes shared by service tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use warden_core::{Actor, AppError, AppResult, OrganizationId, UserId};
use warden_domain::{
    ActionImplication, AssignmentState, EffectivePermissions, PermissionKey, PermissionRegistry,
    Role, RoleAssignment, RoleId,
};

use crate::{
    AuditEvent, AuditRepository, CreateRoleInput, DefaultCatalog, ExpirationSweeper,
    PermissionEvaluator, PermissionSetCache, PermissionSetVersion, RbacLimits,
    RoleAssignmentRepository,
    RoleAssignmentService, RoleCatalogService, RoleRepository,
};

pub(crate) fn key(value: &str) -> PermissionKey {
    match value.parse() {
        Ok(key) => key,
        Err(error) => panic!("invalid key '{value}': {error}"),
    }
}

pub(crate) fn role_input(name: &str, permissions: &[&str]) -> CreateRoleInput {
    CreateRoleInput {
        name: name.to_owned(),
        description: None,
        permissions: permissions.iter().map(|value| key(value)).collect(),
        parent_role_ids: Vec::new(),
    }
}

#[derive(Default)]
pub(crate) struct FakeRoleRepository {
    roles: Mutex<Vec<Role>>,
    implications: Vec<ActionImplication>,
    pub(crate) list_calls: Mutex<usize>,
}

impl FakeRoleRepository {
    pub(crate) fn with_catalog(catalog: &DefaultCatalog) -> Self {
        Self {
            roles: Mutex::new(catalog.predefined_roles().to_vec()),
            implications: catalog.implications().to_vec(),
            list_calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl RoleRepository for FakeRoleRepository {
    async fn list_roles(&self, organization_id: OrganizationId) -> AppResult<Vec<Role>> {
        *self.list_calls.lock().await += 1;
        Ok(self
            .roles
            .lock()
            .await
            .iter()
            .filter(|role| role.is_visible_to(organization_id))
            .cloned()
            .collect())
    }

    async fn find_role(
        &self,
        organization_id: OrganizationId,
        role_id: RoleId,
    ) -> AppResult<Option<Role>> {
        Ok(self
            .roles
            .lock()
            .await
            .iter()
            .find(|role| role.id() == role_id && role.is_visible_to(organization_id))
            .cloned())
    }

    async fn create_role(&self, role: &Role, max_custom_roles: u32) -> AppResult<()> {
        let mut roles = self.roles.lock().await;
        let owned = roles
            .iter()
            .filter(|existing| {
                existing.organization_id().is_some()
                    && existing.organization_id() == role.organization_id()
            })
            .count();
        if owned >= usize::try_from(max_custom_roles).unwrap_or(usize::MAX) {
            return Err(AppError::Conflict(
                "custom role limit reached".to_owned(),
            ));
        }

        roles.push(role.clone());
        Ok(())
    }

    async fn update_role(&self, role: &Role) -> AppResult<()> {
        let mut roles = self.roles.lock().await;
        let Some(existing) = roles.iter_mut().find(|existing| existing.id() == role.id()) else {
            return Err(AppError::NotFound(format!("role '{}' does not exist", role.id())));
        };

        *existing = role.clone();
        Ok(())
    }

    async fn delete_role(
        &self,
        _organization_id: OrganizationId,
        role_id: RoleId,
        _deleted_at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.roles.lock().await.retain(|role| role.id() != role_id);
        Ok(())
    }

    async fn list_action_implications(&self) -> AppResult<Vec<ActionImplication>> {
        Ok(self.implications.clone())
    }
}

#[derive(Default)]
pub(crate) struct FakeAssignmentRepository {
    pub(crate) records: Mutex<Vec<RoleAssignment>>,
    pub(crate) active_scans: Mutex<usize>,
    /// When set, the next active scan is followed by a revocation of every
    /// assignment it returned, as if `remove` ran right after the read.
    pub(crate) revoke_after_scan: Mutex<Option<Arc<FakePermissionSetCache>>>,
}

impl FakeAssignmentRepository {
    fn latest_index(
        records: &[RoleAssignment],
        user_id: UserId,
        role_id: RoleId,
        organization_id: OrganizationId,
    ) -> Option<usize> {
        records
            .iter()
            .enumerate()
            .filter(|(_, record)| {
                record.user_id == user_id
                    && record.role_id == role_id
                    && record.organization_id == organization_id
            })
            .max_by_key(|(_, record)| record.assigned_at)
            .map(|(index, _)| index)
    }
}

#[async_trait]
impl RoleAssignmentRepository for FakeAssignmentRepository {
    async fn insert_assignment(
        &self,
        assignment: &RoleAssignment,
        max_active_per_user: u32,
    ) -> AppResult<()> {
        let mut records = self.records.lock().await;
        let now = assignment.assigned_at;
        let active: Vec<&RoleAssignment> = records
            .iter()
            .filter(|record| {
                record.user_id == assignment.user_id
                    && record.organization_id == assignment.organization_id
                    && record.is_active_at(now)
            })
            .collect();

        if active
            .iter()
            .any(|record| record.role_id == assignment.role_id)
        {
            return Err(AppError::DuplicateRoleAssignment(
                "assignment already active".to_owned(),
            ));
        }

        if active.len() >= usize::try_from(max_active_per_user).unwrap_or(usize::MAX) {
            return Err(AppError::RoleAssignmentLimitExceeded(
                "too many active assignments".to_owned(),
            ));
        }

        records.push(assignment.clone());
        Ok(())
    }

    async fn find_latest(
        &self,
        user_id: UserId,
        role_id: RoleId,
        organization_id: OrganizationId,
    ) -> AppResult<Option<RoleAssignment>> {
        let records = self.records.lock().await;
        Ok(Self::latest_index(&records, user_id, role_id, organization_id)
            .and_then(|index| records.get(index).cloned()))
    }

    async fn remove_active(
        &self,
        user_id: UserId,
        role_id: RoleId,
        organization_id: OrganizationId,
        removed_by: Actor,
        at: DateTime<Utc>,
    ) -> AppResult<Option<RoleAssignment>> {
        let mut records = self.records.lock().await;
        let Some(record) = records.iter_mut().find(|record| {
            record.user_id == user_id
                && record.role_id == role_id
                && record.organization_id == organization_id
                && record.is_active_at(at)
        }) else {
            return Ok(None);
        };

        record.mark_removed(removed_by, at)?;
        Ok(Some(record.clone()))
    }

    async fn update_expiration(
        &self,
        user_id: UserId,
        role_id: RoleId,
        organization_id: OrganizationId,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<Option<RoleAssignment>> {
        let mut records = self.records.lock().await;
        let Some(record) = records.iter_mut().find(|record| {
            record.user_id == user_id
                && record.role_id == role_id
                && record.organization_id == organization_id
                && record.is_active_at(now)
        }) else {
            return Ok(None);
        };

        record.extend(expires_at, now)?;
        Ok(Some(record.clone()))
    }

    async fn list_active_for_user(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<RoleAssignment>> {
        *self.active_scans.lock().await += 1;
        let active: Vec<RoleAssignment> = self
            .records
            .lock()
            .await
            .iter()
            .filter(|record| {
                record.user_id == user_id
                    && record.organization_id == organization_id
                    && record.is_active_at(now)
            })
            .cloned()
            .collect();

        if let Some(cache) = self.revoke_after_scan.lock().await.take() {
            for record in self.records.lock().await.iter_mut() {
                if active.iter().any(|scanned| scanned.id == record.id) {
                    record.mark_removed(Actor::System, now)?;
                }
            }
            cache.invalidate_user(organization_id, user_id).await?;
        }

        Ok(active)
    }

    async fn list_for_role(
        &self,
        role_id: RoleId,
        organization_id: OrganizationId,
    ) -> AppResult<Vec<RoleAssignment>> {
        let mut records: Vec<RoleAssignment> = self
            .records
            .lock()
            .await
            .iter()
            .filter(|record| record.role_id == role_id && record.organization_id == organization_id)
            .cloned()
            .collect();
        records.sort_by(|left, right| right.assigned_at.cmp(&left.assigned_at));
        Ok(records)
    }

    async fn list_for_organization(
        &self,
        organization_id: OrganizationId,
    ) -> AppResult<Vec<RoleAssignment>> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .filter(|record| record.organization_id == organization_id)
            .cloned()
            .collect())
    }

    async fn list_expiring(
        &self,
        organization_id: OrganizationId,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AppResult<Vec<RoleAssignment>> {
        let mut records: Vec<RoleAssignment> = self
            .records
            .lock()
            .await
            .iter()
            .filter(|record| {
                record.organization_id == organization_id && record.expires_within(from, until)
            })
            .cloned()
            .collect();
        records.sort_by_key(|record| record.expires_at);
        Ok(records)
    }

    async fn count_active_for_role(
        &self,
        role_id: RoleId,
        organization_id: OrganizationId,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let count = self
            .records
            .lock()
            .await
            .iter()
            .filter(|record| {
                record.role_id == role_id
                    && record.organization_id == organization_id
                    && record.is_active_at(now)
            })
            .count();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }

    async fn expire_due(&self, now: DateTime<Utc>, limit: u32) -> AppResult<Vec<RoleAssignment>> {
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let mut expired = Vec::new();
        for record in self.records.lock().await.iter_mut() {
            if expired.len() == limit {
                break;
            }
            if record.state == AssignmentState::Active && record.has_lapsed_at(now) {
                record.mark_expired(now)?;
                expired.push(record.clone());
            }
        }

        Ok(expired)
    }
}

#[derive(Default)]
pub(crate) struct FakeAuditRepository {
    pub(crate) events: Mutex<Vec<AuditEvent>>,
}

#[async_trait]
impl AuditRepository for FakeAuditRepository {
    async fn append_event(&self, event: AuditEvent) -> AppResult<()> {
        self.events.lock().await.push(event);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakePermissionSetCache {
    pub(crate) entries: Mutex<HashMap<(OrganizationId, UserId), (EffectivePermissions, u32)>>,
    versions: Mutex<FakeVersions>,
}

#[derive(Default)]
struct FakeVersions {
    organizations: HashMap<OrganizationId, u64>,
    users: HashMap<(OrganizationId, UserId), u64>,
}

impl FakeVersions {
    fn of(&self, organization_id: OrganizationId, user_id: UserId) -> PermissionSetVersion {
        PermissionSetVersion {
            organization: self
                .organizations
                .get(&organization_id)
                .copied()
                .unwrap_or_default(),
            user: self
                .users
                .get(&(organization_id, user_id))
                .copied()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl PermissionSetCache for FakePermissionSetCache {
    async fn current_version(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> AppResult<PermissionSetVersion> {
        Ok(self.versions.lock().await.of(organization_id, user_id))
    }

    async fn get_permission_set(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> AppResult<Option<EffectivePermissions>> {
        Ok(self
            .entries
            .lock()
            .await
            .get(&(organization_id, user_id))
            .map(|(permissions, _)| permissions.clone()))
    }

    async fn set_permission_set(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
        version: PermissionSetVersion,
        permissions: &EffectivePermissions,
        ttl_seconds: u32,
    ) -> AppResult<()> {
        let versions = self.versions.lock().await;
        if versions.of(organization_id, user_id) != version {
            return Ok(());
        }

        self.entries
            .lock()
            .await
            .insert((organization_id, user_id), (permissions.clone(), ttl_seconds));
        Ok(())
    }

    async fn invalidate_user(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> AppResult<()> {
        let mut versions = self.versions.lock().await;
        *versions.users.entry((organization_id, user_id)).or_default() += 1;
        self.entries.lock().await.remove(&(organization_id, user_id));
        Ok(())
    }

    async fn invalidate_organization(&self, organization_id: OrganizationId) -> AppResult<()> {
        let mut versions = self.versions.lock().await;
        *versions.organizations.entry(organization_id).or_default() += 1;
        self.entries
            .lock()
            .await
            .retain(|(cached_organization_id, _), _| *cached_organization_id != organization_id);
        Ok(())
    }
}

/// Every service wired to the same fakes and the default catalog.
pub(crate) struct Harness {
    pub(crate) registry: Arc<PermissionRegistry>,
    pub(crate) roles: Arc<FakeRoleRepository>,
    pub(crate) assignments: Arc<FakeAssignmentRepository>,
    pub(crate) audit: Arc<FakeAuditRepository>,
    pub(crate) cache: Arc<FakePermissionSetCache>,
    pub(crate) catalog: RoleCatalogService,
    pub(crate) ledger: RoleAssignmentService,
    pub(crate) evaluator: PermissionEvaluator,
    pub(crate) sweeper: ExpirationSweeper,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::with_limits(RbacLimits::default())
    }

    pub(crate) fn with_limits(limits: RbacLimits) -> Self {
        let default_catalog = match DefaultCatalog::build() {
            Ok(catalog) => catalog,
            Err(error) => panic!("default catalog should build: {error}"),
        };
        let registry: Arc<PermissionRegistry> = match default_catalog.registry() {
            Ok(registry) => Arc::new(registry),
            Err(error) => panic!("registry should build: {error}"),
        };

        let roles = Arc::new(FakeRoleRepository::with_catalog(&default_catalog));
        let assignments = Arc::new(FakeAssignmentRepository::default());
        let audit = Arc::new(FakeAuditRepository::default());
        let cache = Arc::new(FakePermissionSetCache::default());

        let catalog = RoleCatalogService::new(
            registry.clone(),
            roles.clone(),
            assignments.clone(),
            audit.clone(),
            limits,
        )
        .with_permission_cache(cache.clone());
        let ledger = RoleAssignmentService::new(
            roles.clone(),
            assignments.clone(),
            audit.clone(),
            limits,
        )
        .with_permission_cache(cache.clone());
        let evaluator =
            PermissionEvaluator::new(registry.clone(), roles.clone(), assignments.clone())
            .with_permission_cache(cache.clone(), 900);
        let sweeper = ExpirationSweeper::new(ledger.clone());

        Self {
            registry,
            roles,
            assignments,
            audit,
            cache,
            catalog,
            ledger,
            evaluator,
            sweeper,
        }
    }
}
