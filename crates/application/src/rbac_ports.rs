mod assignments;
mod audit;
mod cache;
mod catalog;
mod roles;

pub use assignments::{AssignRoleInput, AssignmentStatistics, RoleAssignmentRepository};
pub use audit::{AuditEvent, AuditRepository};
pub use cache::{PermissionSetCache, PermissionSetVersion};
pub use catalog::PermissionCatalogRepository;
pub use roles::{CreateRoleInput, RoleRepository, RoleStatistics, UpdateRoleInput};
