//! Permission catalog and predefined roles shipped with every deployment.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;
use warden_core::AppResult;
use warden_domain::{
    ActionImplication, ActionName, Permission, PermissionKey, PermissionRegistry, ResourceName,
    Role, RoleContent, RoleId,
};

/// Fixed identifier of the predefined `OWNER` role.
pub const OWNER_ROLE_ID: RoleId =
    RoleId::from_uuid(Uuid::from_u128(0x8f1c_3a52_0d4e_4b7a_9c61_0000_0000_0001));

/// Fixed identifier of the predefined `ADMIN` role.
pub const ADMIN_ROLE_ID: RoleId =
    RoleId::from_uuid(Uuid::from_u128(0x8f1c_3a52_0d4e_4b7a_9c61_0000_0000_0002));

/// Fixed identifier of the predefined `MEMBER` role.
pub const MEMBER_ROLE_ID: RoleId =
    RoleId::from_uuid(Uuid::from_u128(0x8f1c_3a52_0d4e_4b7a_9c61_0000_0000_0003));

/// Fixed identifier of the predefined `VIEWER` role.
pub const VIEWER_ROLE_ID: RoleId =
    RoleId::from_uuid(Uuid::from_u128(0x8f1c_3a52_0d4e_4b7a_9c61_0000_0000_0004));

const MANAGED_RESOURCES: [(&str, &str); 5] = [
    ("ORGANIZATIONS", "organizations"),
    ("USERS", "organization members"),
    ("PAYMENTS", "payments"),
    ("SUBSCRIPTIONS", "subscriptions"),
    ("BILLING", "billing settings"),
];

const STANDARD_ACTIONS: [(&str, &str); 3] = [("READ", "View"), ("WRITE", "Change"), ("ADMIN", "Administer")];

/// Default permissions, implication rules and predefined roles.
#[derive(Debug, Clone)]
pub struct DefaultCatalog {
    permissions: Vec<Permission>,
    implications: Vec<ActionImplication>,
    predefined_roles: Vec<Role>,
}

impl DefaultCatalog {
    /// Builds the catalog.
    pub fn build() -> AppResult<Self> {
        let mut permissions = Vec::new();
        for (resource, label) in MANAGED_RESOURCES {
            for (action, verb) in STANDARD_ACTIONS {
                permissions.push(Permission::new(
                    PermissionKey::parse_parts(resource, action)?,
                    Some(format!("{verb} {label}")),
                )?);
            }
        }
        permissions.push(Permission::new(
            PermissionKey::parse_parts("AUDIT", "READ")?,
            Some("View the audit log".to_owned()),
        )?);

        let implications = vec![
            ActionImplication::new(
                None,
                ActionName::new("ADMIN")?,
                [ActionName::new("WRITE")?, ActionName::new("READ")?],
            )?,
            ActionImplication::new(None, ActionName::new("WRITE")?, [ActionName::new("READ")?])?,
        ];

        let mut owner_permissions = MANAGED_RESOURCES
            .iter()
            .map(|(resource, _)| PermissionKey::parse_parts(resource, "ADMIN"))
            .collect::<AppResult<Vec<_>>>()?;
        owner_permissions.push(PermissionKey::parse_parts("AUDIT", "READ")?);

        let predefined_roles = vec![
            predefined(
                OWNER_ROLE_ID,
                0,
                "OWNER",
                "Full control of the organization",
                owner_permissions,
            )?,
            predefined(
                ADMIN_ROLE_ID,
                1,
                "ADMIN",
                "Manages the organization and its members",
                keys(&[
                    "ORGANIZATIONS:READ",
                    "ORGANIZATIONS:WRITE",
                    "USERS:READ",
                    "USERS:WRITE",
                ])?,
            )?,
            predefined(
                MEMBER_ROLE_ID,
                2,
                "MEMBER",
                "Regular organization member",
                keys(&[
                    "ORGANIZATIONS:READ",
                    "USERS:READ",
                    "PAYMENTS:READ",
                    "SUBSCRIPTIONS:READ",
                ])?,
            )?,
            predefined(
                VIEWER_ROLE_ID,
                3,
                "VIEWER",
                "Read-only access to the organization",
                keys(&["ORGANIZATIONS:READ", "USERS:READ"])?,
            )?,
        ];

        Ok(Self {
            permissions,
            implications,
            predefined_roles,
        })
    }

    /// Returns the default permissions.
    #[must_use]
    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }

    /// Returns the default implication rules.
    #[must_use]
    pub fn implications(&self) -> &[ActionImplication] {
        &self.implications
    }

    /// Returns the predefined roles in display order.
    #[must_use]
    pub fn predefined_roles(&self) -> &[Role] {
        &self.predefined_roles
    }

    /// Builds a registry holding the default permissions.
    pub fn registry(&self) -> AppResult<PermissionRegistry> {
        PermissionRegistry::new(self.permissions.iter().cloned())
    }
}

fn keys(values: &[&str]) -> AppResult<Vec<PermissionKey>> {
    values.iter().map(|value| value.parse()).collect()
}

// Offsets keep predefined roles in a fixed order when sorted by creation time.
fn predefined(
    id: RoleId,
    position: i64,
    name: &str,
    description: &str,
    permissions: Vec<PermissionKey>,
) -> AppResult<Role> {
    Role::predefined(
        id,
        RoleContent {
            name: name.to_owned(),
            description: Some(description.to_owned()),
            permissions,
            parent_role_ids: Vec::new(),
        },
        DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(position),
    )
}
