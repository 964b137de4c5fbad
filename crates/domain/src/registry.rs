//! Canonical set of registered permissions.

use std::collections::{BTreeMap, BTreeSet};

use warden_core::{AppError, AppResult};

use crate::permission::{ActionName, Permission, PermissionKey, ResourceName};

/// Read-only registry of `(resource, action)` pairs, populated at process start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionRegistry {
    permissions: BTreeMap<PermissionKey, Permission>,
}

impl PermissionRegistry {
    /// Builds a registry, rejecting duplicated keys.
    pub fn new(permissions: impl IntoIterator<Item = Permission>) -> AppResult<Self> {
        let mut registered = BTreeMap::new();
        for permission in permissions {
            let key = permission.key().clone();
            if registered.insert(key.clone(), permission).is_some() {
                return Err(AppError::DuplicatePermission(format!(
                    "permission '{key}' is registered more than once"
                )));
            }
        }

        Ok(Self {
            permissions: registered,
        })
    }

    /// Returns every registered permission ordered by key.
    #[must_use]
    pub fn all_permissions(&self) -> Vec<Permission> {
        self.permissions.values().cloned().collect()
    }

    /// Returns every resource that has at least one registered action.
    #[must_use]
    pub fn resources(&self) -> BTreeSet<ResourceName> {
        self.permissions
            .keys()
            .map(|key| key.resource().clone())
            .collect()
    }

    /// Returns the registered actions for one resource.
    #[must_use]
    pub fn actions_for(&self, resource: &ResourceName) -> BTreeSet<ActionName> {
        self.permissions
            .keys()
            .filter(|key| key.resource() == resource)
            .map(|key| key.action().clone())
            .collect()
    }

    /// Returns whether the key is registered.
    #[must_use]
    pub fn contains(&self, key: &PermissionKey) -> bool {
        self.permissions.contains_key(key)
    }

    /// Returns the registered permission for a key.
    #[must_use]
    pub fn describe(&self, key: &PermissionKey) -> Option<&Permission> {
        self.permissions.get(key)
    }

    /// Validates raw resource and action names against the registry.
    pub fn validate(&self, resource: &str, action: &str) -> AppResult<PermissionKey> {
        let key = PermissionKey::parse_parts(resource, action)?;
        self.ensure_registered(&key)?;
        Ok(key)
    }

    /// Fails with `InvalidPermission` when the key is not registered.
    pub fn ensure_registered(&self, key: &PermissionKey) -> AppResult<()> {
        if self.contains(key) {
            return Ok(());
        }

        Err(AppError::InvalidPermission(format!(
            "permission '{key}' is not registered"
        )))
    }

    /// Returns the number of registered permissions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    /// Returns whether no permission is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }
}
