use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Process-level configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub scheduler_timezone: String,
    pub max_concurrent_jobs: usize,
    pub default_timeout_secs: u64,
    pub max_retries: u32,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables, falling back to the
    /// documented defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://./scheduler.db".to_string()),
            scheduler_timezone: env::var("SCHEDULER_TIMEZONE").unwrap_or_else(|_| "UTC".to_string()),
            max_concurrent_jobs: env::var("MAX_CONCURRENT_JOBS")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .context("MAX_CONCURRENT_JOBS must be a valid number")?,
            default_timeout_secs: env::var("DEFAULT_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("DEFAULT_TIMEOUT must be a valid number")?,
            max_retries: env::var("MAX_RETRIES")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .context("MAX_RETRIES must be a valid number")?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        for key in [
            "DATABASE_URL",
            "SCHEDULER_TIMEZONE",
            "MAX_CONCURRENT_JOBS",
            "DEFAULT_TIMEOUT",
            "MAX_RETRIES",
            "LOG_LEVEL",
        ] {
            env::remove_var(key);
        }

        let config = Config::from_env().unwrap();
        assert_eq!(config.database_url, "sqlite://./scheduler.db");
        assert_eq!(config.scheduler_timezone, "UTC");
        assert_eq!(config.max_concurrent_jobs, 100);
        assert_eq!(config.default_timeout_secs, 30);
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.log_level, "INFO");
    }
}
