//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod assignment;
mod audit;
mod effective;
mod hierarchy;
mod implication;
mod permission;
mod registry;
mod role;

pub use assignment::{AssignmentId, AssignmentState, RoleAssignment};
pub use audit::AuditAction;
pub use effective::EffectivePermissions;
pub use hierarchy::RoleHierarchy;
pub use implication::{ActionImplication, ImplicationRules};
pub use permission::{
    ActionName, PERMISSION_DESCRIPTION_MAX_LENGTH, PERMISSION_NAME_MAX_LENGTH, Permission,
    PermissionCheck, PermissionCheckResult, PermissionKey, ResourceName,
};
pub use registry::PermissionRegistry;
pub use role::{
    ROLE_DESCRIPTION_MAX_LENGTH, ROLE_NAME_MAX_LENGTH, Role, RoleChanges, RoleContent, RoleId,
    RoleType,
};
