//! Role assignment records and their lifecycle.
//!
//! Assignments are never hard-deleted: removal and expiration are state
//! transitions kept for audit.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_core::{Actor, AppError, AppResult, OrganizationId, UserId};

use crate::role::RoleId;

/// Unique identifier for a role assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssignmentId(Uuid);

impl AssignmentId {
    /// Creates a new random assignment identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an assignment identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AssignmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for AssignmentId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Stored lifecycle state of an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentState {
    /// Granting, unless `expires_at` has passed.
    Active,
    /// Materialized by the expiration sweep.
    Expired,
    /// Revoked by an administrator.
    Removed,
}

impl AssignmentState {
    /// Returns a stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Removed => "removed",
        }
    }
}

impl FromStr for AssignmentState {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "expired" => Ok(Self::Expired),
            "removed" => Ok(Self::Removed),
            _ => Err(AppError::Validation(format!(
                "unknown assignment state '{value}'"
            ))),
        }
    }
}

/// Time-bounded grant of a role to a user within an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    /// Stable assignment identifier.
    pub id: AssignmentId,
    /// Grantee.
    pub user_id: UserId,
    /// Granted role.
    pub role_id: RoleId,
    /// Tenant scope of the grant.
    pub organization_id: OrganizationId,
    /// Actor that created the grant.
    pub assigned_by: Actor,
    /// Creation timestamp.
    pub assigned_at: DateTime<Utc>,
    /// Exclusive expiration instant; `None` never expires.
    pub expires_at: Option<DateTime<Utc>>,
    /// Stored lifecycle state.
    pub state: AssignmentState,
    /// Actor that moved the assignment out of `Active`, when it happened.
    pub state_changed_by: Option<Actor>,
    /// Timestamp of the last state transition.
    pub state_changed_at: Option<DateTime<Utc>>,
}

impl RoleAssignment {
    /// Creates a new active assignment.
    #[must_use]
    pub fn new(
        user_id: UserId,
        role_id: RoleId,
        organization_id: OrganizationId,
        assigned_by: Actor,
        assigned_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: AssignmentId::new(),
            user_id,
            role_id,
            organization_id,
            assigned_by,
            assigned_at,
            expires_at,
            state: AssignmentState::Active,
            state_changed_by: None,
            state_changed_at: None,
        }
    }

    /// Returns whether the stored state says active and the deadline has not passed.
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.state == AssignmentState::Active && !self.has_lapsed_at(now)
    }

    /// Returns whether `expires_at <= now`, independent of stored state.
    #[must_use]
    pub fn has_lapsed_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Returns whether the assignment is expired, either materialized or lazily.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            AssignmentState::Expired => true,
            AssignmentState::Active => self.has_lapsed_at(now),
            AssignmentState::Removed => false,
        }
    }

    /// Returns whether an active assignment expires inside `[from, until]`.
    #[must_use]
    pub fn expires_within(&self, from: DateTime<Utc>, until: DateTime<Utc>) -> bool {
        self.state == AssignmentState::Active
            && self
                .expires_at
                .is_some_and(|expires_at| from <= expires_at && expires_at <= until)
    }

    /// Returns whether the grant carries an expiration.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self.expires_at.is_some()
    }

    /// Moves an active assignment to `Removed`.
    pub fn mark_removed(&mut self, removed_by: Actor, at: DateTime<Utc>) -> AppResult<()> {
        self.transition(AssignmentState::Removed, removed_by, at)
    }

    /// Moves an active assignment to `Expired`.
    pub fn mark_expired(&mut self, at: DateTime<Utc>) -> AppResult<()> {
        self.transition(AssignmentState::Expired, Actor::System, at)
    }

    /// Replaces the expiration of an active assignment with a future instant.
    pub fn extend(&mut self, new_expires_at: DateTime<Utc>, now: DateTime<Utc>) -> AppResult<()> {
        if !self.is_active_at(now) {
            return Err(AppError::NotFound(format!(
                "assignment '{}' is not active",
                self.id
            )));
        }

        if new_expires_at <= now {
            return Err(AppError::Validation(
                "new expiration must be in the future".to_owned(),
            ));
        }

        self.expires_at = Some(new_expires_at);
        Ok(())
    }

    fn transition(&mut self, state: AssignmentState, by: Actor, at: DateTime<Utc>) -> AppResult<()> {
        if self.state != AssignmentState::Active {
            return Err(AppError::Conflict(format!(
                "assignment '{}' is already {}",
                self.id,
                self.state.as_str()
            )));
        }

        self.state = state;
        self.state_changed_by = Some(by);
        self.state_changed_at = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use warden_core::{Actor, AppError, OrganizationId, UserId};

    use super::{AssignmentState, RoleAssignment};
    use crate::role::RoleId;

    fn assignment(expires_in: Option<Duration>) -> RoleAssignment {
        let now = Utc::now();
        RoleAssignment::new(
            UserId::new(),
            RoleId::new(),
            OrganizationId::new(),
            Actor::User(UserId::new()),
            now,
            expires_in.map(|duration| now + duration),
        )
    }

    #[test]
    fn expiration_is_exclusive() {
        let record = assignment(Some(Duration::hours(1)));
        let Some(expires_at) = record.expires_at else {
            panic!("assignment should expire");
        };

        assert!(record.is_active_at(expires_at - Duration::seconds(1)));
        assert!(!record.is_active_at(expires_at));
        assert!(record.is_expired_at(expires_at));
    }

    #[test]
    fn permanent_assignment_never_lapses() {
        let record = assignment(None);
        assert!(record.is_active_at(Utc::now() + Duration::days(3650)));
        assert!(!record.is_temporary());
    }

    #[test]
    fn expiring_window_is_inclusive() {
        let record = assignment(Some(Duration::days(2)));
        let Some(expires_at) = record.expires_at else {
            panic!("assignment should expire");
        };

        assert!(record.expires_within(expires_at - Duration::days(2), expires_at));
        assert!(!record.expires_within(Utc::now(), expires_at - Duration::seconds(1)));
    }

    #[test]
    fn removal_is_a_one_way_transition() {
        let mut record = assignment(None);
        let remover = Actor::User(UserId::new());

        assert!(record.mark_removed(remover, Utc::now()).is_ok());
        assert_eq!(record.state, AssignmentState::Removed);
        assert_eq!(record.state_changed_by, Some(remover));
        assert!(matches!(record.mark_expired(Utc::now()), Err(AppError::Conflict(_))));
    }

    #[test]
    fn extend_rejects_past_deadline() {
        let mut record = assignment(Some(Duration::hours(1)));
        let now = Utc::now();

        assert!(matches!(
            record.extend(now - Duration::minutes(1), now),
            Err(AppError::Validation(_))
        ));
        assert!(record.extend(now + Duration::days(7), now).is_ok());
        assert_eq!(record.expires_at, Some(now + Duration::days(7)));
    }

    #[test]
    fn extending_an_inactive_assignment_is_not_found_before_deadline_checks() {
        let mut record = assignment(Some(Duration::hours(1)));
        let now = Utc::now();
        assert!(record.mark_removed(Actor::System, now).is_ok());

        assert!(matches!(
            record.extend(now - Duration::minutes(1), now),
            Err(AppError::NotFound(_))
        ));
    }
}
