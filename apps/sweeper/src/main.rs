//! Warden role assignment expiration sweeper.
//!
//! Run with `migrate` as the first argument to apply schema migrations and
//! seed the default permission catalog, then exit.

#![forbid(unsafe_code)]

mod sweeper_config;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use warden_application::{
    DefaultCatalog, ExpirationSweeper, PermissionCatalogRepository, RoleAssignmentService,
};
use warden_core::{AppError, AppResult};
use warden_infrastructure::{
    MIGRATOR, PostgresAuditRepository, PostgresPermissionCatalogRepository,
    PostgresRoleAssignmentRepository, PostgresRoleRepository, RedisPermissionSetCache,
};

use crate::sweeper_config::SweeperConfig;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = SweeperConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;

    if env::args().nth(1).as_deref() == Some("migrate") {
        return migrate_and_seed(&pool).await;
    }

    let sweeper = build_sweeper(pool, &config)?;

    info!(
        sweep_interval_seconds = config.sweep_interval_seconds,
        sweep_batch_size = config.sweep_batch_size,
        cache_enabled = config.redis_url.is_some(),
        "warden-sweeper started"
    );

    loop {
        match sweeper.sweep_all(config.sweep_batch_size).await {
            Ok(report) if report.expired == 0 => debug!("no lapsed role assignments"),
            Ok(_) => {}
            Err(error) => warn!(error = %error, "expiration sweep failed"),
        }

        tokio::time::sleep(Duration::from_secs(config.sweep_interval_seconds)).await;
    }
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

async fn migrate_and_seed(pool: &PgPool) -> AppResult<()> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    let catalog = DefaultCatalog::build()?;
    PostgresPermissionCatalogRepository::new(pool.clone())
        .seed_catalog(
            catalog.permissions(),
            catalog.implications(),
            catalog.predefined_roles(),
        )
        .await?;

    info!("migrations applied and default catalog seeded");
    Ok(())
}

fn build_sweeper(pool: PgPool, config: &SweeperConfig) -> AppResult<ExpirationSweeper> {
    let mut ledger = RoleAssignmentService::new(
        Arc::new(PostgresRoleRepository::new(pool.clone())),
        Arc::new(PostgresRoleAssignmentRepository::new(pool.clone())),
        Arc::new(PostgresAuditRepository::new(pool)),
        config.limits,
    );

    if let Some(redis_url) = &config.redis_url {
        let client = redis::Client::open(redis_url.as_str())
            .map_err(|error| AppError::Internal(format!("invalid REDIS_URL: {error}")))?;
        ledger = ledger.with_permission_cache(Arc::new(RedisPermissionSetCache::new(
            client,
            config.cache_key_prefix.as_str(),
        )));
    }

    Ok(ExpirationSweeper::new(ledger))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
