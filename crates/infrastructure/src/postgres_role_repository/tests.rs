use chrono::Utc;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use warden_application::{
    ADMIN_ROLE_ID, DefaultCatalog, PermissionCatalogRepository, RoleAssignmentRepository,
    RoleRepository,
};
use warden_core::{Actor, AppError, OrganizationId, UserId};
use warden_domain::{PermissionKey, Role, RoleAssignment, RoleChanges, RoleContent, RoleId};

use super::PostgresRoleRepository;
use crate::{PostgresPermissionCatalogRepository, PostgresRoleAssignmentRepository};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres role tests: {error}");
    }

    let catalog = match DefaultCatalog::build() {
        Ok(catalog) => catalog,
        Err(error) => panic!("default catalog should build: {error}"),
    };
    let seeded = PostgresPermissionCatalogRepository::new(pool.clone())
        .seed_catalog(
            catalog.permissions(),
            catalog.implications(),
            catalog.predefined_roles(),
        )
        .await;
    assert!(seeded.is_ok());

    Some(pool)
}

fn key(value: &str) -> PermissionKey {
    match value.parse() {
        Ok(key) => key,
        Err(error) => panic!("invalid key '{value}': {error}"),
    }
}

fn custom_role(organization_id: OrganizationId, name: &str, parents: Vec<RoleId>) -> Role {
    let content = RoleContent {
        name: name.to_owned(),
        description: Some("test role".to_owned()),
        permissions: vec![key("BILLING:WRITE"), key("USERS:READ")],
        parent_role_ids: parents,
    };

    match Role::custom(RoleId::new(), organization_id, content, Utc::now()) {
        Ok(role) => role,
        Err(error) => panic!("invalid role: {error}"),
    }
}

#[tokio::test]
async fn created_role_round_trips_with_grants_and_parents() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresRoleRepository::new(pool);
    let organization_id = OrganizationId::new();
    let role = custom_role(organization_id, "Billing Operator", vec![ADMIN_ROLE_ID]);

    assert!(repository.create_role(&role, 10).await.is_ok());

    let Ok(Some(stored)) = repository.find_role(organization_id, role.id()).await else {
        panic!("created role should be found");
    };
    assert_eq!(stored.name(), "Billing Operator");
    assert_eq!(stored.permissions(), role.permissions());
    assert_eq!(stored.parent_role_ids(), &[ADMIN_ROLE_ID]);

    let Ok(roles) = repository.list_roles(organization_id).await else {
        panic!("roles should list");
    };
    assert!(roles.iter().take(4).all(Role::is_predefined));
    assert!(roles.iter().any(|listed| listed.id() == role.id()));

    let hidden = repository.find_role(OrganizationId::new(), role.id()).await;
    assert!(matches!(hidden, Ok(None)));
}

#[tokio::test]
async fn duplicate_names_and_limit_conflict() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresRoleRepository::new(pool);
    let organization_id = OrganizationId::new();

    let first = custom_role(organization_id, "Support", Vec::new());
    let clash = custom_role(organization_id, "SUPPORT", Vec::new());
    let predefined_clash = custom_role(organization_id, "Viewer", Vec::new());
    let over_limit = custom_role(organization_id, "Second", Vec::new());

    assert!(repository.create_role(&first, 1).await.is_ok());
    assert!(matches!(
        repository.create_role(&clash, 10).await,
        Err(AppError::Conflict(_))
    ));
    assert!(matches!(
        repository.create_role(&predefined_clash, 10).await,
        Err(AppError::Conflict(_))
    ));
    assert!(matches!(
        repository.create_role(&over_limit, 1).await,
        Err(AppError::Conflict(_))
    ));
}

#[tokio::test]
async fn update_replaces_content_and_delete_hides_role() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresRoleRepository::new(pool);
    let organization_id = OrganizationId::new();
    let role = custom_role(organization_id, "Editor", Vec::new());
    assert!(repository.create_role(&role, 10).await.is_ok());

    let changes = RoleChanges {
        name: Some("Senior Editor".to_owned()),
        permissions: Some(vec![key("PAYMENTS:READ")]),
        ..RoleChanges::default()
    };
    let Ok(updated) = role.apply(changes, Utc::now()) else {
        panic!("changes should apply");
    };
    assert!(repository.update_role(&updated).await.is_ok());

    let Ok(Some(stored)) = repository.find_role(organization_id, role.id()).await else {
        panic!("updated role should be found");
    };
    assert_eq!(stored.name(), "Senior Editor");
    assert_eq!(stored.permissions(), &[key("PAYMENTS:READ")]);

    assert!(
        repository
            .delete_role(organization_id, role.id(), Utc::now())
            .await
            .is_ok()
    );
    let deleted = repository.find_role(organization_id, role.id()).await;
    assert!(matches!(deleted, Ok(None)));
    assert!(matches!(
        repository
            .delete_role(organization_id, role.id(), Utc::now())
            .await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn seeded_implications_are_grouped_per_action() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresRoleRepository::new(pool);
    let Ok(implications) = repository.list_action_implications().await else {
        panic!("implications should list");
    };

    let admin = implications
        .iter()
        .find(|implication| implication.action().as_str() == "ADMIN");
    assert!(admin.is_some_and(|implication| {
        implication.resource().is_none() && implication.implies().len() == 2
    }));
}

#[tokio::test]
async fn concurrent_parent_links_never_close_a_cycle() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresRoleRepository::new(pool);
    let organization_id = OrganizationId::new();
    let first = custom_role(organization_id, "First", Vec::new());
    let second = custom_role(organization_id, "Second", Vec::new());
    assert!(repository.create_role(&first, 10).await.is_ok());
    assert!(repository.create_role(&second, 10).await.is_ok());

    let link = |role: &Role, parent: RoleId| {
        let changes = RoleChanges {
            parent_role_ids: Some(vec![parent]),
            ..RoleChanges::default()
        };
        match role.apply(changes, Utc::now()) {
            Ok(role) => role,
            Err(error) => panic!("changes should apply: {error}"),
        }
    };
    let first_under_second = link(&first, second.id());
    let second_under_first = link(&second, first.id());

    let (left, right) = tokio::join!(
        repository.update_role(&first_under_second),
        repository.update_role(&second_under_first)
    );

    assert!(left.is_ok() != right.is_ok());
    assert!(
        matches!(left, Err(AppError::Validation(_)))
            || matches!(right, Err(AppError::Validation(_)))
    );
}

#[tokio::test]
async fn assigned_or_inherited_role_cannot_be_deleted() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresRoleRepository::new(pool.clone());
    let assignments = PostgresRoleAssignmentRepository::new(pool);
    let organization_id = OrganizationId::new();
    let assigned = custom_role(organization_id, "Assigned", Vec::new());
    let parent = custom_role(organization_id, "Parent", Vec::new());
    let child = custom_role(organization_id, "Child", vec![parent.id()]);
    for role in [&assigned, &parent, &child] {
        assert!(repository.create_role(role, 10).await.is_ok());
    }

    let record = RoleAssignment::new(
        UserId::new(),
        assigned.id(),
        organization_id,
        Actor::System,
        Utc::now(),
        None,
    );
    assert!(assignments.insert_assignment(&record, 5).await.is_ok());

    for role_id in [assigned.id(), parent.id()] {
        assert!(matches!(
            repository
                .delete_role(organization_id, role_id, Utc::now())
                .await,
            Err(AppError::RoleInUse(_))
        ));
    }

    assert!(
        repository
            .delete_role(organization_id, child.id(), Utc::now())
            .await
            .is_ok()
    );
    let late = RoleAssignment::new(
        UserId::new(),
        child.id(),
        organization_id,
        Actor::System,
        Utc::now(),
        None,
    );
    assert!(matches!(
        assignments.insert_assignment(&late, 5).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn concurrent_delete_and_assign_never_leave_a_deleted_role_assigned() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresRoleRepository::new(pool.clone());
    let assignments = PostgresRoleAssignmentRepository::new(pool);
    let organization_id = OrganizationId::new();
    let role = custom_role(organization_id, "Contested", Vec::new());
    assert!(repository.create_role(&role, 10).await.is_ok());

    let record = RoleAssignment::new(
        UserId::new(),
        role.id(),
        organization_id,
        Actor::System,
        Utc::now(),
        None,
    );
    let (deleted, assigned) = tokio::join!(
        repository.delete_role(organization_id, role.id(), Utc::now()),
        assignments.insert_assignment(&record, 5)
    );

    assert!(deleted.is_ok() != assigned.is_ok());
    let Ok(active) = assignments
        .count_active_for_role(role.id(), organization_id, Utc::now())
        .await
    else {
        panic!("active count should load");
    };
    assert_eq!(active, if deleted.is_ok() { 0 } else { 1 });
}
