// dbsnapshot/src/config/mod.rs
use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::errors::AppError;

pub const DATABASE_URL: &str = "DATABASE_URL";
pub const AWS_REGION: &str = "AWS_REGION";
pub const AMAZON_S3_BUCKET: &str = "AMAZON_S3_BUCKET";
pub const DUMP_EXPIRATION_DAYS: &str = "DUMP_EXPIRATION_DAYS";
pub const AMAZON_S3_ENDPOINT: &str = "AMAZON_S3_ENDPOINT";
pub const DUMP_INTERVAL_SECS: &str = "DUMP_INTERVAL_SECS";
pub const CLEANUP_INTERVAL_SECS: &str = "CLEANUP_INTERVAL_SECS";
pub const PG_DUMP_PATH: &str = "PG_DUMP_PATH";

/// Upper bound for `DUMP_EXPIRATION_DAYS` (100 years).
pub const MAX_RETENTION_DAYS: u32 = 36_500;

const DEFAULT_DUMP_INTERVAL: Duration = Duration::from_secs(10 * 60);
const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Storage settings handed to the S3 gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub region: String,
    pub bucket_name: String,
    /// Custom endpoint for S3-compatible services; AWS is used when unset.
    pub endpoint_url: Option<String>,
}

/// Process configuration, loaded once at startup and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_url: String,
    /// Explicit `pg_dump` binary; looked up on `PATH` when unset.
    pub pg_dump_path: Option<PathBuf>,
    pub storage: StorageConfig,
    pub retention_days: u32,
    pub dump_interval: Duration,
    pub cleanup_interval: Duration,
}

impl AppConfig {
    /// Loads `.env` if one exists, then reads the process environment.
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenv::dotenv() {
            if !e.not_found() {
                return Err(anyhow::Error::new(e).context("Failed to load .env file"));
            }
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| -> Result<String> {
            match lookup(name) {
                Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
                _ => Err(AppError::MissingEnv(name).into()),
            }
        };

        let database_url = required(DATABASE_URL)?;
        Url::parse(&database_url).map_err(|e| AppError::InvalidEnv {
            name: DATABASE_URL,
            reason: e.to_string(),
        })?;

        let retention_days = required(DUMP_EXPIRATION_DAYS)?
            .parse::<u32>()
            .map_err(|e| AppError::InvalidEnv {
                name: DUMP_EXPIRATION_DAYS,
                reason: e.to_string(),
            })?;
        if retention_days > MAX_RETENTION_DAYS {
            return Err(AppError::InvalidEnv {
                name: DUMP_EXPIRATION_DAYS,
                reason: format!("must be at most {MAX_RETENTION_DAYS} days"),
            }
            .into());
        }

        let storage = StorageConfig {
            region: required(AWS_REGION)?,
            bucket_name: required(AMAZON_S3_BUCKET)?,
            endpoint_url: lookup(AMAZON_S3_ENDPOINT).filter(|v| !v.trim().is_empty()),
        };

        Ok(Self {
            database_url,
            pg_dump_path: lookup(PG_DUMP_PATH)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            storage,
            retention_days,
            dump_interval: interval(&lookup, DUMP_INTERVAL_SECS, DEFAULT_DUMP_INTERVAL)?,
            cleanup_interval: interval(&lookup, CLEANUP_INTERVAL_SECS, DEFAULT_CLEANUP_INTERVAL)?,
        })
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }

    /// Database URL with the password masked, safe for logs.
    pub fn redacted_database_url(&self) -> String {
        match Url::parse(&self.database_url) {
            Ok(mut url) if url.password().is_some() => match url.set_password(Some("***")) {
                Ok(()) => url.to_string(),
                Err(()) => "<invalid url>".to_string(),
            },
            Ok(url) => url.to_string(),
            Err(_) => "<invalid url>".to_string(),
        }
    }
}

fn interval<F>(lookup: &F, name: &'static str, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name).filter(|v| !v.trim().is_empty()) else {
        return Ok(default);
    };
    let secs = raw.trim().parse::<u64>().map_err(|e| AppError::InvalidEnv {
        name,
        reason: e.to_string(),
    })?;
    if secs == 0 {
        return Err(AppError::InvalidEnv {
            name,
            reason: "interval must be positive".to_string(),
        }
        .into());
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, String> {
        HashMap::from([
            (DATABASE_URL, "postgres://app:secret@db:5432/app".to_string()),
            (AWS_REGION, "eu-central-1".to_string()),
            (AMAZON_S3_BUCKET, "snapshots".to_string()),
            (DUMP_EXPIRATION_DAYS, "7".to_string()),
        ])
    }

    fn load(env: &HashMap<&'static str, String>) -> Result<AppConfig> {
        AppConfig::from_lookup(|name| env.get(name).cloned())
    }

    #[test]
    fn loads_required_values_with_default_intervals() {
        let config = load(&base_env()).unwrap();

        assert_eq!(config.storage.region, "eu-central-1");
        assert_eq!(config.storage.bucket_name, "snapshots");
        assert_eq!(config.storage.endpoint_url, None);
        assert_eq!(config.pg_dump_path, None);
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.retention(), chrono::Duration::days(7));
        assert_eq!(config.dump_interval, Duration::from_secs(600));
        assert_eq!(config.cleanup_interval, Duration::from_secs(3600));
    }

    #[test]
    fn every_required_variable_is_enforced() {
        for name in [DATABASE_URL, AWS_REGION, AMAZON_S3_BUCKET, DUMP_EXPIRATION_DAYS] {
            let mut env = base_env();
            env.remove(name);
            let err = load(&env).unwrap_err();
            match err.downcast_ref::<AppError>() {
                Some(AppError::MissingEnv(missing)) => assert_eq!(*missing, name),
                other => panic!("unexpected error for {name}: {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_non_numeric_retention() {
        let mut env = base_env();
        env.insert(DUMP_EXPIRATION_DAYS, "a week".to_string());
        let err = load(&env).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AppError>(),
            Some(AppError::InvalidEnv { name: DUMP_EXPIRATION_DAYS, .. })
        ));
    }

    #[test]
    fn rejects_retention_beyond_bound() {
        let mut env = base_env();
        env.insert(DUMP_EXPIRATION_DAYS, "200000000".to_string());
        assert!(load(&env).is_err());

        env.insert(DUMP_EXPIRATION_DAYS, MAX_RETENTION_DAYS.to_string());
        assert_eq!(load(&env).unwrap().retention_days, MAX_RETENTION_DAYS);
    }

    #[test]
    fn interval_overrides_must_be_positive() {
        let mut env = base_env();
        env.insert(DUMP_INTERVAL_SECS, "30".to_string());
        env.insert(AMAZON_S3_ENDPOINT, "http://localhost:9000".to_string());
        let config = load(&env).unwrap();
        assert_eq!(config.dump_interval, Duration::from_secs(30));
        assert_eq!(config.storage.endpoint_url.as_deref(), Some("http://localhost:9000"));

        env.insert(CLEANUP_INTERVAL_SECS, "0".to_string());
        assert!(load(&env).is_err());
    }

    #[test]
    fn redacts_password() {
        let config = load(&base_env()).unwrap();
        let redacted = config.redacted_database_url();
        assert!(!redacted.contains("secret"));
        assert!(redacted.contains("app:***@db"));
    }

    #[test]
    fn url_without_password_is_logged_as_is() {
        let mut env = base_env();
        env.insert(DATABASE_URL, "postgres://app@db:5432/app".to_string());
        let config = load(&env).unwrap();
        assert_eq!(config.redacted_database_url(), "postgres://app@db:5432/app");
    }
}
