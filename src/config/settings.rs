//! Process settings read from the environment (after `dotenvy::dotenv()`).

use crate::error::ConfigError;
use crate::scope::ScopePolicy;
use crate::service::ExecutionMode;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: String,
    pub resources_path: PathBuf,
    pub bind_addr: String,
    pub db_max_connections: u32,
    /// Schema prefix for unqualified table names. Must be a plain identifier.
    pub db_schema: Option<String>,
    pub execution_mode: ExecutionMode,
    pub scope_policy: ScopePolicy,
    pub request_timeout: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let db_max_connections = parse_num(&get, "DB_MAX_CONNECTIONS", 5)?;
        let timeout_secs = parse_num(&get, "REQUEST_TIMEOUT_SECS", 30)?;
        let db_schema = get("DB_SCHEMA").filter(|s| !s.is_empty());
        if let Some(s) = &db_schema {
            if !crate::config::is_valid_column(s) {
                return Err(ConfigError::Validation(format!("DB_SCHEMA is not a valid identifier: {}", s)));
            }
        }
        let execution_mode = match get("EXECUTION_MODE") {
            None => ExecutionMode::Unprivileged,
            Some(v) => v.parse()?,
        };
        let scope_policy = match get("SCOPE_ENFORCEMENT") {
            None => ScopePolicy::Enforced,
            Some(v) => v.parse()?,
        };
        Ok(Settings {
            database_url: get("DATABASE_URL").unwrap_or_else(|| "postgres://localhost/dashboard".into()),
            resources_path: get("RESOURCES_PATH").unwrap_or_else(|| "resources.json".into()).into(),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into()),
            db_max_connections,
            db_schema,
            execution_mode,
            scope_policy,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn parse_num<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match get(key) {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::Validation(format!("{} must be a number, got '{}'", key, v))),
    }
}
