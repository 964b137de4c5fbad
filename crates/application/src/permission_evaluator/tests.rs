use std::sync::Arc;

use chrono::{Duration, Utc};
use warden_core::{Actor, AppError, OrganizationId, UserId};
use warden_domain::{PermissionCheck, PermissionRegistry, RoleAssignment};

use crate::test_support::{Harness, role_input};
use crate::{
    ADMIN_ROLE_ID, AssignRoleInput, DefaultCatalog, OWNER_ROLE_ID, PermissionEvaluator,
    VIEWER_ROLE_ID,
};

fn assign_input(
    user_id: UserId,
    role_id: warden_domain::RoleId,
    organization_id: OrganizationId,
) -> AssignRoleInput {
    AssignRoleInput {
        user_id,
        role_id,
        organization_id,
        assigned_by: Actor::System,
        expires_at: None,
    }
}

#[tokio::test]
async fn user_without_assignments_holds_nothing() {
    let harness = Harness::new();
    let organization_id = OrganizationId::new();
    let user_id = UserId::new();

    for (resource, action) in [("USERS", "READ"), ("ORGANIZATIONS", "ADMIN"), ("AUDIT", "READ")] {
        assert!(matches!(
            harness
                .evaluator
                .has_permission(user_id, organization_id, resource, action)
                .await,
            Ok(false)
        ));
    }

    assert_eq!(*harness.roles.list_calls.lock().await, 0);
}

#[tokio::test]
async fn admin_scenario_grants_user_write_but_not_billing() {
    let harness = Harness::new();
    let organization_id = OrganizationId::new();
    let user_id = UserId::new();

    let assigned = harness
        .ledger
        .assign(assign_input(user_id, ADMIN_ROLE_ID, organization_id))
        .await;
    assert!(assigned.is_ok());

    assert!(matches!(
        harness
            .evaluator
            .has_permission(user_id, organization_id, "USERS", "WRITE")
            .await,
        Ok(true)
    ));
    assert!(matches!(
        harness
            .evaluator
            .has_permission(user_id, organization_id, "BILLING", "READ")
            .await,
        Ok(false)
    ));

    let Ok(results) = harness
        .evaluator
        .check_batch(
            user_id,
            organization_id,
            &[
                PermissionCheck::new("ORGANIZATIONS", "READ"),
                PermissionCheck::new("BILLING", "READ"),
            ],
        )
        .await
    else {
        panic!("batch check should succeed");
    };
    let allowed: Vec<bool> = results.iter().map(|result| result.allowed).collect();
    assert_eq!(allowed, vec![true, false]);
    assert_eq!(results.get(1).map(|result| result.resource.as_str()), Some("BILLING"));
}

#[tokio::test]
async fn batch_check_resolves_assignments_once() {
    let harness = Harness::new();
    let organization_id = OrganizationId::new();
    let user_id = UserId::new();
    let evaluator = PermissionEvaluator::new(
        harness.registry.clone(),
        harness.roles.clone(),
        harness.assignments.clone(),
    );

    assert!(harness
        .ledger
        .assign(assign_input(user_id, VIEWER_ROLE_ID, organization_id))
        .await
        .is_ok());

    let checks: Vec<PermissionCheck> = ["ORGANIZATIONS", "USERS", "PAYMENTS", "BILLING"]
        .into_iter()
        .map(|resource| PermissionCheck::new(resource, "READ"))
        .collect();
    let Ok(results) = evaluator.check_batch(user_id, organization_id, &checks).await else {
        panic!("batch check should succeed");
    };

    assert_eq!(results.len(), 4);
    assert_eq!(*harness.assignments.active_scans.lock().await, 1);
    assert_eq!(*harness.roles.list_calls.lock().await, 1);
}

#[tokio::test]
async fn every_granted_permission_of_a_role_checks_true() {
    let harness = Harness::new();
    let organization_id = OrganizationId::new();
    let user_id = UserId::new();
    let Ok(catalog) = DefaultCatalog::build() else {
        panic!("catalog should build");
    };

    assert!(harness
        .ledger
        .assign(assign_input(user_id, OWNER_ROLE_ID, organization_id))
        .await
        .is_ok());

    let checks: Vec<PermissionCheck> = catalog
        .permissions()
        .iter()
        .map(|permission| {
            PermissionCheck::new(
                permission.key().resource().as_str(),
                permission.key().action().as_str(),
            )
        })
        .collect();
    let Ok(results) = harness
        .evaluator
        .check_batch(user_id, organization_id, &checks)
        .await
    else {
        panic!("batch check should succeed");
    };

    assert!(results.iter().all(|result| result.allowed));
}

#[tokio::test]
async fn malformed_or_unregistered_pairs_are_denied() {
    let harness = Harness::new();
    let organization_id = OrganizationId::new();
    let user_id = UserId::new();

    assert!(harness
        .ledger
        .assign(assign_input(user_id, OWNER_ROLE_ID, organization_id))
        .await
        .is_ok());

    assert!(matches!(
        harness
            .evaluator
            .has_permission(user_id, organization_id, "USERS", "")
            .await,
        Ok(false)
    ));
    assert!(matches!(
        harness
            .evaluator
            .has_permission(user_id, organization_id, "AUDIT", "WRITE")
            .await,
        Ok(false)
    ));

    let denied = harness
        .evaluator
        .require_permission(user_id, organization_id, "REPORTS", "READ")
        .await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));

    let allowed = harness
        .evaluator
        .require_permission(user_id, organization_id, "payments", "write")
        .await;
    assert!(allowed.is_ok());
}

#[tokio::test]
async fn lapsed_assignment_grants_nothing() {
    let harness = Harness::new();
    let organization_id = OrganizationId::new();
    let user_id = UserId::new();
    let now = Utc::now();

    harness.assignments.records.lock().await.push(RoleAssignment::new(
        user_id,
        ADMIN_ROLE_ID,
        organization_id,
        Actor::System,
        now - Duration::days(2),
        Some(now - Duration::seconds(1)),
    ));

    assert!(matches!(
        harness
            .evaluator
            .has_permission(user_id, organization_id, "USERS", "READ")
            .await,
        Ok(false)
    ));
}

#[tokio::test]
async fn cached_set_never_outlives_the_earliest_expiration() {
    let harness = Harness::new();
    let organization_id = OrganizationId::new();
    let user_id = UserId::new();

    let assigned = harness
        .ledger
        .assign(AssignRoleInput {
            expires_at: Some(Utc::now() + Duration::minutes(10)),
            ..assign_input(user_id, VIEWER_ROLE_ID, organization_id)
        })
        .await;
    assert!(assigned.is_ok());

    assert!(matches!(
        harness
            .evaluator
            .has_permission(user_id, organization_id, "USERS", "READ")
            .await,
        Ok(true)
    ));

    let ttl = harness
        .cache
        .entries
        .lock()
        .await
        .get(&(organization_id, user_id))
        .map(|(_, ttl_seconds)| *ttl_seconds);
    assert!(ttl.is_some_and(|ttl_seconds| ttl_seconds > 0 && ttl_seconds <= 600));

    let removed = harness
        .ledger
        .remove(user_id, VIEWER_ROLE_ID, organization_id, Actor::System)
        .await;
    assert!(removed.is_ok());

    assert!(matches!(
        harness
            .evaluator
            .has_permission(user_id, organization_id, "USERS", "READ")
            .await,
        Ok(false)
    ));
}

#[tokio::test]
async fn inherited_grants_are_part_of_the_effective_surface() {
    let harness = Harness::new();
    let organization_id = OrganizationId::new();
    let user_id = UserId::new();

    let mut input = role_input("Payments lead", &["PAYMENTS:WRITE"]);
    input.parent_role_ids = vec![VIEWER_ROLE_ID];
    let Ok(role) = harness
        .catalog
        .create_custom_role(Actor::System, organization_id, input)
        .await
    else {
        panic!("role should be created");
    };

    assert!(harness
        .ledger
        .assign(assign_input(user_id, role.id(), organization_id))
        .await
        .is_ok());

    let Ok(keys) = harness
        .evaluator
        .effective_permission_keys(user_id, organization_id)
        .await
    else {
        panic!("keys should resolve");
    };
    let keys: Vec<String> = keys.into_iter().collect();
    assert_eq!(
        keys,
        vec![
            "ORGANIZATIONS:READ".to_owned(),
            "PAYMENTS:READ".to_owned(),
            "PAYMENTS:WRITE".to_owned(),
            "USERS:READ".to_owned(),
        ]
    );
}

#[tokio::test]
async fn revocation_during_resolution_is_not_cached() {
    let harness = Harness::new();
    let organization_id = OrganizationId::new();
    let user_id = UserId::new();

    assert!(harness
        .ledger
        .assign(assign_input(user_id, VIEWER_ROLE_ID, organization_id))
        .await
        .is_ok());
    *harness.assignments.revoke_after_scan.lock().await = Some(harness.cache.clone());

    // Resolved from the scan taken before the revocation landed.
    assert!(matches!(
        harness
            .evaluator
            .has_permission(user_id, organization_id, "USERS", "READ")
            .await,
        Ok(true)
    ));
    assert!(harness.cache.entries.lock().await.is_empty());

    assert!(matches!(
        harness
            .evaluator
            .has_permission(user_id, organization_id, "USERS", "READ")
            .await,
        Ok(false)
    ));
}

#[tokio::test]
async fn pairs_missing_from_the_registry_are_not_listed() {
    let harness = Harness::new();
    let organization_id = OrganizationId::new();
    let user_id = UserId::new();
    let Ok(catalog) = DefaultCatalog::build() else {
        panic!("catalog should build");
    };
    let registry = match PermissionRegistry::new(
        catalog
            .permissions()
            .iter()
            .filter(|permission| permission.key().to_string() != "USERS:READ")
            .cloned(),
    ) {
        Ok(registry) => Arc::new(registry),
        Err(error) => panic!("registry should build: {error}"),
    };
    let evaluator =
        PermissionEvaluator::new(registry, harness.roles.clone(), harness.assignments.clone());

    assert!(harness
        .ledger
        .assign(assign_input(user_id, ADMIN_ROLE_ID, organization_id))
        .await
        .is_ok());

    let Ok(keys) = evaluator
        .effective_permission_keys(user_id, organization_id)
        .await
    else {
        panic!("keys should resolve");
    };
    assert!(keys.contains("USERS:WRITE"));
    assert!(!keys.contains("USERS:READ"));
    assert!(matches!(
        evaluator
            .has_permission(user_id, organization_id, "USERS", "READ")
            .await,
        Ok(false)
    ));
}
