//! Role inheritance graph.
//!
//! Edges point from a role to its parents. The graph must stay acyclic;
//! cycles are rejected when a role is written, never at evaluation time.

use std::collections::{BTreeMap, BTreeSet};

use warden_core::{AppError, AppResult};

use crate::role::{Role, RoleId};

/// Parent links of every role visible to one organization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleHierarchy {
    parents: BTreeMap<RoleId, Vec<RoleId>>,
}

impl RoleHierarchy {
    /// Builds the graph from a role catalog.
    #[must_use]
    pub fn from_roles<'a>(roles: impl IntoIterator<Item = &'a Role>) -> Self {
        Self {
            parents: roles
                .into_iter()
                .map(|role| (role.id(), role.parent_role_ids().to_vec()))
                .collect(),
        }
    }

    /// Builds the graph from stored `(role, parent)` links.
    ///
    /// Roles without parents only appear once something links to them.
    #[must_use]
    pub fn from_parent_links(links: impl IntoIterator<Item = (RoleId, RoleId)>) -> Self {
        let mut parents: BTreeMap<RoleId, Vec<RoleId>> = BTreeMap::new();
        for (role_id, parent_role_id) in links {
            parents.entry(role_id).or_default().push(parent_role_id);
        }

        Self { parents }
    }

    /// Returns whether the role is part of the graph.
    #[must_use]
    pub fn contains(&self, role_id: RoleId) -> bool {
        self.parents.contains_key(&role_id)
    }

    /// Fails when giving `role_id` the `proposed_parents` would close a cycle.
    pub fn ensure_acyclic(&self, role_id: RoleId, proposed_parents: &[RoleId]) -> AppResult<()> {
        let mut visited = BTreeSet::new();
        let mut pending: Vec<RoleId> = proposed_parents.to_vec();

        while let Some(current) = pending.pop() {
            if current == role_id {
                return Err(AppError::Validation(format!(
                    "role '{role_id}' would inherit from itself through its parents"
                )));
            }

            if !visited.insert(current) {
                continue;
            }

            if let Some(parents) = self.parents.get(&current) {
                pending.extend(parents.iter().copied());
            }
        }

        Ok(())
    }

    /// Returns the given roles plus every transitive ancestor known to the graph.
    #[must_use]
    pub fn with_ancestors(&self, role_ids: impl IntoIterator<Item = RoleId>) -> BTreeSet<RoleId> {
        let mut resolved = BTreeSet::new();
        let mut pending: Vec<RoleId> = role_ids.into_iter().collect();

        while let Some(current) = pending.pop() {
            if !resolved.insert(current) {
                continue;
            }

            if let Some(parents) = self.parents.get(&current) {
                pending.extend(parents.iter().copied());
            }
        }

        resolved
    }

    /// Returns roles that list `role_id` as a direct parent.
    #[must_use]
    pub fn direct_children_of(&self, role_id: RoleId) -> Vec<RoleId> {
        self.parents
            .iter()
            .filter(|(_, parents)| parents.contains(&role_id))
            .map(|(child, _)| *child)
            .collect()
    }
}
