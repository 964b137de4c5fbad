use async_trait::async_trait;
use chrono::{DateTime, Utc};
use warden_core::{Actor, AppResult, OrganizationId, UserId};
use warden_domain::{RoleAssignment, RoleId};

/// Input payload for assigning a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignRoleInput {
    /// Grantee.
    pub user_id: UserId,
    /// Role to grant.
    pub role_id: RoleId,
    /// Organization scope.
    pub organization_id: OrganizationId,
    /// Actor performing the assignment.
    pub assigned_by: Actor,
    /// Optional exclusive expiration; must be in the future.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Assignment counts for one organization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssignmentStatistics {
    /// Every assignment record ever written.
    pub total: usize,
    /// Currently granting assignments.
    pub active: usize,
    /// Active assignments that carry an expiration.
    pub temporary: usize,
    /// Active assignments expiring in the next seven days.
    pub expiring_within_week: usize,
    /// Materialized or lazily expired assignments.
    pub expired: usize,
    /// Revoked assignments.
    pub removed: usize,
}

/// Repository port for the role assignment ledger.
///
/// Writes must be atomic per `(user, organization)`.
#[async_trait]
pub trait RoleAssignmentRepository: Send + Sync {
    /// Inserts a new active assignment.
    ///
    /// Fails with `DuplicateRoleAssignment` when an active assignment for the
    /// same `(user, role, organization)` exists, and with
    /// `RoleAssignmentLimitExceeded` when the user already holds
    /// `max_active_per_user` active assignments in the organization. Both
    /// checks treat assignments lapsed at `assignment.assigned_at` as inactive.
    async fn insert_assignment(
        &self,
        assignment: &RoleAssignment,
        max_active_per_user: u32,
    ) -> AppResult<()>;

    /// Returns the most recent record for the tuple.
    async fn find_latest(
        &self,
        user_id: UserId,
        role_id: RoleId,
        organization_id: OrganizationId,
    ) -> AppResult<Option<RoleAssignment>>;

    /// Moves the assignment active at `at` to `Removed`; `None` when nothing is active.
    async fn remove_active(
        &self,
        user_id: UserId,
        role_id: RoleId,
        organization_id: OrganizationId,
        removed_by: Actor,
        at: DateTime<Utc>,
    ) -> AppResult<Option<RoleAssignment>>;

    /// Replaces the expiration of the assignment active at `now`.
    async fn update_expiration(
        &self,
        user_id: UserId,
        role_id: RoleId,
        organization_id: OrganizationId,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<Option<RoleAssignment>>;

    /// Lists assignments of one user that are active at `now`.
    async fn list_active_for_user(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<RoleAssignment>>;

    /// Lists every record of one role, newest first.
    async fn list_for_role(
        &self,
        role_id: RoleId,
        organization_id: OrganizationId,
    ) -> AppResult<Vec<RoleAssignment>>;

    /// Lists every record in one organization.
    async fn list_for_organization(
        &self,
        organization_id: OrganizationId,
    ) -> AppResult<Vec<RoleAssignment>>;

    /// Lists active assignments with `from <= expires_at <= until`, soonest first.
    async fn list_expiring(
        &self,
        organization_id: OrganizationId,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AppResult<Vec<RoleAssignment>>;

    /// Counts assignments of one role that are active at `now`.
    async fn count_active_for_role(
        &self,
        role_id: RoleId,
        organization_id: OrganizationId,
        now: DateTime<Utc>,
    ) -> AppResult<u64>;

    /// Moves up to `limit` lapsed active assignments to `Expired` and returns them.
    async fn expire_due(&self, now: DateTime<Utc>, limit: u32) -> AppResult<Vec<RoleAssignment>>;
}
