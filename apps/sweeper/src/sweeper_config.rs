use std::env;

use warden_application::RbacLimits;
use warden_core::{AppError, AppResult, NonEmptyString};

/// Runtime settings of the sweeper process.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub cache_key_prefix: NonEmptyString,
    pub sweep_interval_seconds: u64,
    pub sweep_batch_size: u32,
    pub limits: RbacLimits,
}

impl SweeperConfig {
    pub fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let redis_url = env::var("REDIS_URL")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());
        let cache_key_prefix = NonEmptyString::new(
            env::var("RBAC_CACHE_KEY_PREFIX").unwrap_or_else(|_| "rbac:permissions".to_owned()),
        )
        .map_err(|error| AppError::Validation(format!("RBAC_CACHE_KEY_PREFIX: {error}")))?;
        let sweep_interval_seconds = parse_env_u64("SWEEP_INTERVAL_SECONDS", 60)?;
        let sweep_batch_size = parse_env_u32("SWEEP_BATCH_SIZE", 500)?;

        let defaults = RbacLimits::default();
        let limits = RbacLimits {
            max_custom_roles_per_organization: parse_env_u32(
                "RBAC_MAX_CUSTOM_ROLES_PER_ORGANIZATION",
                defaults.max_custom_roles_per_organization,
            )?,
            max_roles_per_user: parse_env_u32(
                "RBAC_MAX_ROLES_PER_USER",
                defaults.max_roles_per_user,
            )?,
            max_permissions_per_role: parse_env_u32(
                "RBAC_MAX_PERMISSIONS_PER_ROLE",
                defaults.max_permissions_per_role,
            )?,
        };
        limits.validate()?;

        if sweep_interval_seconds == 0 {
            return Err(AppError::Validation(
                "SWEEP_INTERVAL_SECONDS must be greater than zero".to_owned(),
            ));
        }

        if sweep_batch_size == 0 {
            return Err(AppError::Validation(
                "SWEEP_BATCH_SIZE must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            redis_url,
            cache_key_prefix,
            sweep_interval_seconds,
            sweep_batch_size,
            limits,
        })
    }
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn parse_env_u32(name: &str, default: u32) -> AppResult<u32> {
    match env::var(name) {
        Ok(value) => value.parse::<u32>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
