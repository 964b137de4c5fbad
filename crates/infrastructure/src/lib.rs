//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_permission_set_cache;
mod in_memory_rbac_repository;
mod postgres_audit_repository;
mod postgres_permission_catalog_repository;
mod postgres_role_assignment_repository;
mod postgres_role_repository;
mod redis_permission_set_cache;

pub use in_memory_permission_set_cache::InMemoryPermissionSetCache;
pub use in_memory_rbac_repository::InMemoryRbacRepository;
pub use postgres_audit_repository::PostgresAuditRepository;
pub use postgres_permission_catalog_repository::PostgresPermissionCatalogRepository;
pub use postgres_role_assignment_repository::PostgresRoleAssignmentRepository;
pub use postgres_role_repository::PostgresRoleRepository;
pub use redis_permission_set_cache::RedisPermissionSetCache;

/// Embedded schema migrations for the RBAC tables.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
