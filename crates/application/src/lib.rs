//! Application services and ports.

#![forbid(unsafe_code)]

mod default_catalog;
mod expiration_sweeper;
mod limits;
mod permission_evaluator;
mod rbac_ports;
mod role_assignment_service;
mod role_catalog_service;

#[cfg(test)]
mod test_support;

pub use default_catalog::{
    ADMIN_ROLE_ID, DefaultCatalog, MEMBER_ROLE_ID, OWNER_ROLE_ID, VIEWER_ROLE_ID,
};
pub use expiration_sweeper::{ExpirationSweeper, SweepReport};
pub use limits::RbacLimits;
pub use permission_evaluator::PermissionEvaluator;
pub use rbac_ports::{
    AssignRoleInput, AssignmentStatistics, AuditEvent, AuditRepository, CreateRoleInput,
    PermissionCatalogRepository, PermissionSetCache, PermissionSetVersion,
    RoleAssignmentRepository, RoleRepository, RoleStatistics, UpdateRoleInput,
};
pub use role_assignment_service::RoleAssignmentService;
pub use role_catalog_service::RoleCatalogService;
