//! Environment-driven application configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::scheduler::SchedulerConfig;
use crate::{Error, Result};

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Worker pool capacity (minimum 1).
    pub workers: usize,
    /// Per-job pipeline timeout.
    pub job_timeout: Duration,
    /// Root data directory; temp and results roots derive from it.
    pub data_dir: PathBuf,
    /// SQLite database URL.
    pub database_url: String,
    /// HTTP bind address.
    pub bind_address: String,
    /// HTTP port.
    pub port: u16,
    /// Disables the separator concurrency clamp on retried jobs.
    pub no_graceful_retry: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from("data");
        Self {
            workers: 1,
            job_timeout: Duration::from_secs(3600),
            database_url: format!("sqlite:{}/demix.sqlite?mode=rwc", data_dir.display()),
            data_dir,
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            no_graceful_retry: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults. Unparseable values are a startup error.
    ///
    /// Supported env vars: `WORKERS`, `TIMEOUT_SECS`, `DATA_DIR`,
    /// `DATABASE_URL`, `BIND_ADDRESS`, `PORT`, `NO_GRACEFUL_RETRY`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(workers) = env_parsed::<usize>("WORKERS")? {
            config.workers = workers.max(1);
        }

        if let Some(timeout_secs) = env_parsed::<u64>("TIMEOUT_SECS")? {
            config.job_timeout = Duration::from_secs(timeout_secs);
        }

        if let Ok(data_dir) = std::env::var("DATA_DIR")
            && !data_dir.trim().is_empty()
        {
            config.data_dir = PathBuf::from(data_dir);
            config.database_url =
                format!("sqlite:{}/demix.sqlite?mode=rwc", config.data_dir.display());
        }

        if let Ok(database_url) = std::env::var("DATABASE_URL")
            && !database_url.trim().is_empty()
        {
            config.database_url = database_url;
        }

        if let Ok(bind_address) = std::env::var("BIND_ADDRESS")
            && !bind_address.trim().is_empty()
        {
            config.bind_address = bind_address;
        }

        if let Some(port) = env_parsed::<u16>("PORT")? {
            config.port = port;
        }

        config.no_graceful_retry =
            std::env::var("NO_GRACEFUL_RETRY").is_ok_and(|v| v == "1");

        Ok(config)
    }

    /// Scratch root, cleared at startup.
    pub fn temp_dir(&self) -> PathBuf {
        self.data_dir.join("temp")
    }

    /// Results root; each job owns one subdirectory.
    pub fn results_dir(&self) -> PathBuf {
        self.data_dir.join("results")
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            workers: self.workers,
            job_timeout: self.job_timeout,
            ..SchedulerConfig::default()
        }
    }
}

fn env_parsed<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::config(format!("invalid {name}: {value:?}"))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.workers, 1);
        assert_eq!(config.job_timeout, Duration::from_secs(3600));
        assert_eq!(config.port, 8080);
        assert!(!config.no_graceful_retry);
        assert_eq!(config.temp_dir(), PathBuf::from("data/temp"));
        assert_eq!(config.results_dir(), PathBuf::from("data/results"));
    }

    #[test]
    fn test_scheduler_config_carries_capacity_and_timeout() {
        let config = AppConfig {
            workers: 4,
            job_timeout: Duration::from_secs(120),
            ..AppConfig::default()
        };
        let scheduler = config.scheduler();
        assert_eq!(scheduler.workers, 4);
        assert_eq!(scheduler.job_timeout, Duration::from_secs(120));
    }
}
