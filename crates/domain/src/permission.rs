//! Permission value objects.
//!
//! Resources and actions are open string enumerations: any well-formed name
//! can be registered as data without touching the evaluator.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use warden_core::{AppError, AppResult};

/// Maximum length of a resource or action name.
pub const PERMISSION_NAME_MAX_LENGTH: usize = 50;

/// Maximum length of a permission description.
pub const PERMISSION_DESCRIPTION_MAX_LENGTH: usize = 255;

fn normalize_name(kind: &str, value: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{kind} must not be empty")));
    }

    if trimmed.len() > PERMISSION_NAME_MAX_LENGTH {
        return Err(AppError::Validation(format!(
            "{kind} '{trimmed}' must not exceed {PERMISSION_NAME_MAX_LENGTH} characters"
        )));
    }

    if !trimmed
        .chars()
        .all(|character| character.is_ascii_alphanumeric() || character == '_')
    {
        return Err(AppError::Validation(format!(
            "{kind} '{trimmed}' may only contain ASCII letters, digits and '_'"
        )));
    }

    Ok(trimmed.to_ascii_uppercase())
}

/// Validated resource name such as `USERS`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceName(String);

impl ResourceName {
    /// Creates a validated, upper-cased resource name.
    pub fn new(value: impl AsRef<str>) -> AppResult<Self> {
        normalize_name("resource", value.as_ref()).map(Self)
    }

    /// Returns the normalized name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for ResourceName {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourceName> for String {
    fn from(value: ResourceName) -> Self {
        value.0
    }
}

impl Display for ResourceName {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Validated action name such as `WRITE`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActionName(String);

impl ActionName {
    /// Creates a validated, upper-cased action name.
    pub fn new(value: impl AsRef<str>) -> AppResult<Self> {
        normalize_name("action", value.as_ref()).map(Self)
    }

    /// Returns the normalized name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for ActionName {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ActionName> for String {
    fn from(value: ActionName) -> Self {
        value.0
    }
}

impl Display for ActionName {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Identity of a permission: one resource and one action.
///
/// Displays and parses as `RESOURCE:ACTION`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionKey {
    resource: ResourceName,
    action: ActionName,
}

impl PermissionKey {
    /// Creates a key from validated parts.
    #[must_use]
    pub fn new(resource: ResourceName, action: ActionName) -> Self {
        Self { resource, action }
    }

    /// Creates a key from raw resource and action strings.
    pub fn parse_parts(resource: &str, action: &str) -> AppResult<Self> {
        Ok(Self::new(ResourceName::new(resource)?, ActionName::new(action)?))
    }

    /// Returns the resource part.
    #[must_use]
    pub fn resource(&self) -> &ResourceName {
        &self.resource
    }

    /// Returns the action part.
    #[must_use]
    pub fn action(&self) -> &ActionName {
        &self.action
    }

    /// Returns the key with the same resource and another action.
    #[must_use]
    pub fn with_action(&self, action: ActionName) -> Self {
        Self::new(self.resource.clone(), action)
    }
}

impl FromStr for PermissionKey {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let Some((resource, action)) = value.split_once(':') else {
            return Err(AppError::Validation(format!(
                "permission key '{value}' must have the form RESOURCE:ACTION"
            )));
        };

        Self::parse_parts(resource, action)
    }
}

impl TryFrom<String> for PermissionKey {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(value.as_str())
    }
}

impl From<PermissionKey> for String {
    fn from(value: PermissionKey) -> Self {
        value.to_string()
    }
}

impl Display for PermissionKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}:{}", self.resource, self.action)
    }
}

/// Registered permission with an optional human-readable description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    key: PermissionKey,
    description: Option<String>,
}

impl Permission {
    /// Creates a permission, validating the description length.
    pub fn new(key: PermissionKey, description: Option<String>) -> AppResult<Self> {
        let description = description
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        if description
            .as_deref()
            .is_some_and(|value| value.chars().count() > PERMISSION_DESCRIPTION_MAX_LENGTH)
        {
            return Err(AppError::Validation(format!(
                "description of permission '{key}' must not exceed {PERMISSION_DESCRIPTION_MAX_LENGTH} characters"
            )));
        }

        Ok(Self { key, description })
    }

    /// Returns the permission identity.
    #[must_use]
    pub fn key(&self) -> &PermissionKey {
        &self.key
    }

    /// Returns the description, when present.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// One requested `(resource, action)` pair in a batch check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionCheck {
    /// Requested resource name.
    pub resource: String,
    /// Requested action name.
    pub action: String,
}

impl PermissionCheck {
    /// Creates a check request.
    #[must_use]
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
        }
    }
}

/// Outcome of one permission check. Computed, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionCheckResult {
    /// Requested resource name.
    pub resource: String,
    /// Requested action name.
    pub action: String,
    /// Whether the subject holds the permission.
    pub allowed: bool,
}
