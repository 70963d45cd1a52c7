use std::path::Path;
use std::str::FromStr;

use chrono::Duration;
use tracing::{info, warn};

use crate::error::AppError;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://analyzer.db?mode=rwc";
pub const DEFAULT_API_URL: &str = "https://api.wanikani.com/v2/";
pub const DEFAULT_API_REVISION: &str = "20170710";
pub const DEFAULT_CACHE_TTL_SECONDS: i64 = 600;
pub const DEFAULT_RETENTION_DAYS: i64 = 7;
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub api_url: String,
    pub api_revision: String,
    pub cache_ttl: Duration,
    pub retention: Duration,
    pub http_timeout_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            api_revision: DEFAULT_API_REVISION.to_string(),
            cache_ttl: Duration::seconds(DEFAULT_CACHE_TTL_SECONDS),
            retention: Duration::days(DEFAULT_RETENTION_DAYS),
            http_timeout_seconds: DEFAULT_HTTP_TIMEOUT_SECONDS,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Settings::default();

        Ok(Self {
            database_url: dotenvy::var("DATABASE_URL").unwrap_or(defaults.database_url),
            api_url: dotenvy::var("WANIKANI_API_URL").unwrap_or(defaults.api_url),
            api_revision: dotenvy::var("WANIKANI_REVISION").unwrap_or(defaults.api_revision),
            cache_ttl: Duration::seconds(parse_var(
                "CACHE_TTL_SECONDS",
                DEFAULT_CACHE_TTL_SECONDS,
            )?),
            retention: Duration::days(parse_var("RETENTION_DAYS", DEFAULT_RETENTION_DAYS)?),
            http_timeout_seconds: parse_var(
                "HTTP_TIMEOUT_SECONDS",
                DEFAULT_HTTP_TIMEOUT_SECONDS,
            )?,
        })
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match dotenvy::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|_| {
            AppError::Validation(format!("{} must be a number, got '{}'", name, raw))
        }),
        Err(_) => Ok(default),
    }
}

pub fn load_environment() -> Result<(), Box<dyn std::error::Error>> {
    let is_production =
        dotenvy::var("ROCKET_PROFILE").unwrap_or("development".to_string()) == "production";

    let env_files = if is_production {
        vec!["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        vec!["config/common.env", "config/dev.env", ".secrets.env"]
    };

    for env_file in env_files {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !Path::new(path).exists() {
        warn!("Warning: Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path)?;
    info!("Loaded environment from: {}", path);
    Ok(())
}
