//! Role definitions and their invariants.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_core::{AppError, AppResult, OrganizationId};

use crate::permission::PermissionKey;

/// Maximum length of a role name.
pub const ROLE_NAME_MAX_LENGTH: usize = 100;

/// Maximum length of a role description.
pub const ROLE_DESCRIPTION_MAX_LENGTH: usize = 500;

/// Unique identifier for a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleId(Uuid);

impl RoleId {
    /// Creates a new random role identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a role identifier from an existing UUID value.
    #[must_use]
    pub const fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RoleId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RoleId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Ownership tag of a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleType {
    /// System-owned role shipped with the platform; immutable.
    Predefined,
    /// Organization-owned role.
    Custom,
}

impl RoleType {
    /// Returns a stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Predefined => "predefined",
            Self::Custom => "custom",
        }
    }
}

impl FromStr for RoleType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "predefined" => Ok(Self::Predefined),
            "custom" => Ok(Self::Custom),
            _ => Err(AppError::Validation(format!("unknown role type '{value}'"))),
        }
    }
}

/// Editable content of a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleContent {
    /// Role name, unique per organization.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Granted permissions in display order.
    pub permissions: Vec<PermissionKey>,
    /// Roles whose permissions are inherited.
    pub parent_role_ids: Vec<RoleId>,
}

/// Partial update of a custom role; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleChanges {
    /// New name.
    pub name: Option<String>,
    /// New description; a blank value clears it.
    pub description: Option<String>,
    /// Replacement permission list.
    pub permissions: Option<Vec<PermissionKey>>,
    /// Replacement parent list.
    pub parent_role_ids: Option<Vec<RoleId>>,
}

impl RoleChanges {
    /// Returns whether the update touches the permission surface.
    #[must_use]
    pub fn changes_grants(&self) -> bool {
        self.permissions.is_some() || self.parent_role_ids.is_some()
    }
}

/// A named bundle of permissions, optionally inheriting from parent roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    id: RoleId,
    organization_id: Option<OrganizationId>,
    name: String,
    description: Option<String>,
    role_type: RoleType,
    permissions: Vec<PermissionKey>,
    parent_role_ids: Vec<RoleId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Role {
    /// Creates a system-owned predefined role.
    pub fn predefined(id: RoleId, content: RoleContent, created_at: DateTime<Utc>) -> AppResult<Self> {
        Self::build(id, None, RoleType::Predefined, content, created_at, created_at)
    }

    /// Creates an organization-owned custom role.
    pub fn custom(
        id: RoleId,
        organization_id: OrganizationId,
        content: RoleContent,
        created_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        Self::build(
            id,
            Some(organization_id),
            RoleType::Custom,
            content,
            created_at,
            created_at,
        )
    }

    /// Rebuilds a role from storage, re-checking every invariant.
    pub fn restore(
        id: RoleId,
        organization_id: Option<OrganizationId>,
        role_type: RoleType,
        content: RoleContent,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        Self::build(id, organization_id, role_type, content, created_at, updated_at)
    }

    fn build(
        id: RoleId,
        organization_id: Option<OrganizationId>,
        role_type: RoleType,
        content: RoleContent,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        match (role_type, organization_id) {
            (RoleType::Predefined, Some(_)) => {
                return Err(AppError::Validation(
                    "predefined roles must not belong to an organization".to_owned(),
                ));
            }
            (RoleType::Custom, None) => {
                return Err(AppError::Validation(
                    "custom roles must belong to an organization".to_owned(),
                ));
            }
            _ => {}
        }

        let name = validate_name(content.name.as_str())?;
        let description = validate_description(content.description)?;
        validate_permissions(&content.permissions)?;
        validate_parents(id, &content.parent_role_ids)?;

        Ok(Self {
            id,
            organization_id,
            name,
            description,
            role_type,
            permissions: content.permissions,
            parent_role_ids: content.parent_role_ids,
            created_at,
            updated_at,
        })
    }

    /// Returns the role identifier.
    #[must_use]
    pub fn id(&self) -> RoleId {
        self.id
    }

    /// Returns the owning organization; `None` for predefined roles.
    #[must_use]
    pub fn organization_id(&self) -> Option<OrganizationId> {
        self.organization_id
    }

    /// Returns the role name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the description, when present.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the role type.
    #[must_use]
    pub fn role_type(&self) -> RoleType {
        self.role_type
    }

    /// Returns directly granted permissions in display order.
    #[must_use]
    pub fn permissions(&self) -> &[PermissionKey] {
        &self.permissions
    }

    /// Returns the direct parent roles.
    #[must_use]
    pub fn parent_role_ids(&self) -> &[RoleId] {
        &self.parent_role_ids
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last update timestamp.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns whether the role is system-owned.
    #[must_use]
    pub fn is_predefined(&self) -> bool {
        self.role_type == RoleType::Predefined
    }

    /// Returns whether an organization may see and use this role.
    #[must_use]
    pub fn is_visible_to(&self, organization_id: OrganizationId) -> bool {
        self.organization_id
            .is_none_or(|owner| owner == organization_id)
    }

    /// Returns whether the role is called `name`, ignoring case.
    #[must_use]
    pub fn has_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name.trim())
    }

    /// Fails with `ImmutableRole` for predefined roles.
    pub fn ensure_mutable(&self) -> AppResult<()> {
        if self.is_predefined() {
            return Err(AppError::ImmutableRole(format!(
                "predefined role '{}' cannot be modified or deleted",
                self.name
            )));
        }

        Ok(())
    }

    /// Returns the current editable content.
    #[must_use]
    pub fn content(&self) -> RoleContent {
        RoleContent {
            name: self.name.clone(),
            description: self.description.clone(),
            permissions: self.permissions.clone(),
            parent_role_ids: self.parent_role_ids.clone(),
        }
    }

    /// Returns a validated copy with the changes applied.
    pub fn apply(&self, changes: RoleChanges, updated_at: DateTime<Utc>) -> AppResult<Self> {
        self.ensure_mutable()?;

        let current = self.content();
        let content = RoleContent {
            name: changes.name.unwrap_or(current.name),
            description: changes.description.or(current.description),
            permissions: changes.permissions.unwrap_or(current.permissions),
            parent_role_ids: changes.parent_role_ids.unwrap_or(current.parent_role_ids),
        };

        Self::build(
            self.id,
            self.organization_id,
            self.role_type,
            content,
            self.created_at,
            updated_at,
        )
    }
}

fn validate_name(value: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(
            "role name must not be empty".to_owned(),
        ));
    }

    if trimmed.chars().count() > ROLE_NAME_MAX_LENGTH {
        return Err(AppError::Validation(format!(
            "role name must not exceed {ROLE_NAME_MAX_LENGTH} characters"
        )));
    }

    Ok(trimmed.to_owned())
}

fn validate_description(value: Option<String>) -> AppResult<Option<String>> {
    let description = value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty());

    if description
        .as_deref()
        .is_some_and(|value| value.chars().count() > ROLE_DESCRIPTION_MAX_LENGTH)
    {
        return Err(AppError::Validation(format!(
            "role description must not exceed {ROLE_DESCRIPTION_MAX_LENGTH} characters"
        )));
    }

    Ok(description)
}

fn validate_permissions(permissions: &[PermissionKey]) -> AppResult<()> {
    if permissions.is_empty() {
        return Err(AppError::Validation(
            "role must grant at least one permission".to_owned(),
        ));
    }

    let mut seen = BTreeSet::new();
    for permission in permissions {
        if !seen.insert(permission) {
            return Err(AppError::DuplicatePermission(format!(
                "permission '{permission}' is listed more than once"
            )));
        }
    }

    Ok(())
}

fn validate_parents(id: RoleId, parent_role_ids: &[RoleId]) -> AppResult<()> {
    let mut seen = BTreeSet::new();
    for parent_role_id in parent_role_ids {
        if *parent_role_id == id {
            return Err(AppError::Validation(format!(
                "role '{id}' cannot inherit from itself"
            )));
        }

        if !seen.insert(parent_role_id) {
            return Err(AppError::Validation(format!(
                "parent role '{parent_role_id}' is listed more than once"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use warden_core::{AppError, OrganizationId};

    use super::{Role, RoleChanges, RoleContent, RoleId, ROLE_NAME_MAX_LENGTH};
    use crate::permission::PermissionKey;

    fn key(value: &str) -> PermissionKey {
        match value.parse() {
            Ok(key) => key,
            Err(error) => panic!("invalid key: {error}"),
        }
    }

    fn content(name: &str, permissions: &[&str]) -> RoleContent {
        RoleContent {
            name: name.to_owned(),
            description: None,
            permissions: permissions.iter().map(|value| key(value)).collect(),
            parent_role_ids: Vec::new(),
        }
    }

    #[test]
    fn custom_role_requires_permissions() {
        let result = Role::custom(RoleId::new(), OrganizationId::new(), content("ops", &[]), Utc::now());
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn duplicate_permissions_are_rejected() {
        let result = Role::custom(
            RoleId::new(),
            OrganizationId::new(),
            content("ops", &["USERS:READ", "users:read"]),
            Utc::now(),
        );
        assert!(matches!(result, Err(AppError::DuplicatePermission(_))));
    }

    #[test]
    fn name_length_is_bounded() {
        let name = "r".repeat(ROLE_NAME_MAX_LENGTH + 1);
        let result = Role::custom(
            RoleId::new(),
            OrganizationId::new(),
            content(&name, &["USERS:READ"]),
            Utc::now(),
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn role_cannot_inherit_from_itself() {
        let id = RoleId::new();
        let mut role_content = content("ops", &["USERS:READ"]);
        role_content.parent_role_ids = vec![id];

        let result = Role::custom(id, OrganizationId::new(), role_content, Utc::now());
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn predefined_role_is_immutable() {
        let role = Role::predefined(RoleId::new(), content("ADMIN", &["USERS:READ"]), Utc::now());
        let Ok(role) = role else {
            panic!("predefined role should build");
        };

        assert!(matches!(role.ensure_mutable(), Err(AppError::ImmutableRole(_))));
        assert!(matches!(
            role.apply(RoleChanges::default(), Utc::now()),
            Err(AppError::ImmutableRole(_))
        ));
    }

    #[test]
    fn apply_keeps_untouched_fields() {
        let organization_id = OrganizationId::new();
        let role = Role::custom(
            RoleId::new(),
            organization_id,
            content("ops", &["USERS:READ"]),
            Utc::now(),
        );
        let Ok(role) = role else {
            panic!("custom role should build");
        };

        let updated = role.apply(
            RoleChanges {
                description: Some("Operations".to_owned()),
                ..RoleChanges::default()
            },
            Utc::now(),
        );

        let Ok(updated) = updated else {
            panic!("update should succeed");
        };
        assert_eq!(updated.name(), "ops");
        assert_eq!(updated.description(), Some("Operations"));
        assert_eq!(updated.permissions(), role.permissions());
        assert!(updated.is_visible_to(organization_id));
        assert!(!updated.is_visible_to(OrganizationId::new()));
    }
}
