//! Effective permission resolution.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assignment::RoleAssignment;
use crate::hierarchy::RoleHierarchy;
use crate::implication::ImplicationRules;
use crate::permission::PermissionKey;
use crate::registry::PermissionRegistry;
use crate::role::{Role, RoleId};

/// Full authorization surface of one user in one organization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePermissions {
    keys: BTreeSet<PermissionKey>,
    valid_until: Option<DateTime<Utc>>,
}

impl EffectivePermissions {
    /// Resolves the permission set granted by the assignments active at `now`.
    ///
    /// `roles` is the catalog visible to the organization. Assignments whose
    /// role is missing from it grant nothing.
    #[must_use]
    pub fn resolve(
        assignments: &[RoleAssignment],
        roles: &[Role],
        rules: &ImplicationRules,
        now: DateTime<Utc>,
    ) -> Self {
        let active: Vec<&RoleAssignment> = assignments
            .iter()
            .filter(|assignment| assignment.is_active_at(now))
            .collect();

        let valid_until = active
            .iter()
            .filter_map(|assignment| assignment.expires_at)
            .min();

        let keys = granted_keys(active.iter().map(|assignment| assignment.role_id), roles, rules);

        Self { keys, valid_until }
    }

    /// Resolves what a set of roles grants, including inherited and implied keys.
    #[must_use]
    pub fn for_roles(
        role_ids: impl IntoIterator<Item = RoleId>,
        roles: &[Role],
        rules: &ImplicationRules,
    ) -> Self {
        Self {
            keys: granted_keys(role_ids, roles, rules),
            valid_until: None,
        }
    }

    /// Drops keys the registry does not know, such as implied pairs of a
    /// resource that never registered the implied action.
    #[must_use]
    pub fn restricted_to(mut self, registry: &PermissionRegistry) -> Self {
        self.keys.retain(|key| registry.contains(key));
        self
    }

    /// Returns whether the key is granted.
    #[must_use]
    pub fn grants(&self, key: &PermissionKey) -> bool {
        self.keys.contains(key)
    }

    /// Returns every granted key.
    #[must_use]
    pub fn keys(&self) -> &BTreeSet<PermissionKey> {
        &self.keys
    }

    /// Returns granted keys rendered as `RESOURCE:ACTION`.
    #[must_use]
    pub fn keys_as_strings(&self) -> BTreeSet<String> {
        self.keys.iter().map(ToString::to_string).collect()
    }

    /// Returns the earliest expiration among contributing assignments.
    #[must_use]
    pub fn valid_until(&self) -> Option<DateTime<Utc>> {
        self.valid_until
    }

    /// Returns whether nothing is granted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns how many whole seconds the set may be cached, capped by `max_ttl_seconds`.
    ///
    /// Zero means the set must not be cached.
    #[must_use]
    pub fn cache_ttl_seconds(&self, now: DateTime<Utc>, max_ttl_seconds: u32) -> u32 {
        let Some(valid_until) = self.valid_until else {
            return max_ttl_seconds;
        };

        let remaining = (valid_until - now).num_seconds();
        if remaining <= 0 {
            return 0;
        }

        u32::try_from(remaining)
            .unwrap_or(u32::MAX)
            .min(max_ttl_seconds)
    }
}

fn granted_keys(
    role_ids: impl IntoIterator<Item = RoleId>,
    roles: &[Role],
    rules: &ImplicationRules,
) -> BTreeSet<PermissionKey> {
    let catalog: BTreeMap<RoleId, &Role> = roles.iter().map(|role| (role.id(), role)).collect();
    let hierarchy = RoleHierarchy::from_roles(roles);

    let direct: Vec<&PermissionKey> = hierarchy
        .with_ancestors(role_ids.into_iter().filter(|role_id| catalog.contains_key(role_id)))
        .into_iter()
        .filter_map(|role_id| catalog.get(&role_id))
        .flat_map(|role| role.permissions())
        .collect();

    rules.expand(direct)
}
