use warden_core::{AppError, AppResult};

/// Tenant-level caps on roles and assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RbacLimits {
    /// Live custom roles one organization may own.
    pub max_custom_roles_per_organization: u32,
    /// Active assignments one user may hold in one organization.
    pub max_roles_per_user: u32,
    /// Direct permissions one role may list.
    pub max_permissions_per_role: u32,
}

impl Default for RbacLimits {
    fn default() -> Self {
        Self {
            max_custom_roles_per_organization: 10,
            max_roles_per_user: 5,
            max_permissions_per_role: 100,
        }
    }
}

impl RbacLimits {
    /// Rejects zero limits.
    pub fn validate(&self) -> AppResult<()> {
        for (name, value) in [
            (
                "max_custom_roles_per_organization",
                self.max_custom_roles_per_organization,
            ),
            ("max_roles_per_user", self.max_roles_per_user),
            ("max_permissions_per_role", self.max_permissions_per_role),
        ] {
            if value == 0 {
                return Err(AppError::Validation(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        Ok(())
    }
}
