use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Kept separate from the process environment so tests can drive it with a
/// plain `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("CATALOG_ENV", "development"))?;

    let bind_addr = or_default("CATALOG_BIND_ADDR", "0.0.0.0:3000")
        .parse::<SocketAddr>()
        .map_err(|e| invalid("CATALOG_BIND_ADDR", e.to_string()))?;
    let log_level = or_default("CATALOG_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("CATALOG_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("CATALOG_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("CATALOG_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let media_fetch_timeout_secs = parse_u64("CATALOG_MEDIA_FETCH_TIMEOUT_SECS", "30")?;
    let media_max_bytes = parse_u64("CATALOG_MEDIA_MAX_BYTES", "8388608")?;
    if media_max_bytes == 0 {
        return Err(invalid(
            "CATALOG_MEDIA_MAX_BYTES",
            "must be greater than zero".to_string(),
        ));
    }
    let media_user_agent = or_default("CATALOG_MEDIA_USER_AGENT", "catalog/0.1 (media-reconciler)");

    let storage_dir = PathBuf::from(or_default("CATALOG_STORAGE_DIR", "./uploads"));
    let storage_public_url = or_default("CATALOG_STORAGE_PUBLIC_URL", "/uploader")
        .trim_end_matches('/')
        .to_string();

    let lock_ttl_secs = parse_u64("CATALOG_LOCK_TTL_SECS", "5")?;
    if lock_ttl_secs == 0 {
        return Err(invalid(
            "CATALOG_LOCK_TTL_SECS",
            "must be greater than zero".to_string(),
        ));
    }

    let retry_cron = or_default("CATALOG_RETRY_CRON", "0 */5 * * * *");
    let retry_max_attempts = parse_u32("CATALOG_RETRY_MAX_ATTEMPTS", "5")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        media_fetch_timeout_secs,
        media_max_bytes,
        media_user_agent,
        storage_dir,
        storage_public_url,
        lock_ttl_secs,
        retry_cron,
        retry_max_attempts,
    })
}

fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "CATALOG_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
