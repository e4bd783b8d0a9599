//! Store configuration
//!
//! Location of the database file and the tuning knobs of the connection pool
//! and the watch bus.

use std::path::PathBuf;
use std::time::Duration;

use crate::watch::DEFAULT_WATCH_CAPACITY;

/// Store configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the SQLite database file (created if missing)
    pub database_path: PathBuf,

    /// How long a connection waits on an internal SQLite lock before failing
    pub busy_timeout: Duration,

    /// Size of the connection pool
    pub max_connections: u32,

    /// Queue capacity of each watch subscriber
    pub watch_capacity: usize,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            busy_timeout: Duration::from_millis(5000),
            max_connections: 5,
            watch_capacity: DEFAULT_WATCH_CAPACITY,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - PIPE_DATABASE_PATH (required)
    /// - PIPE_BUSY_TIMEOUT_MS (optional, default: 5000)
    /// - PIPE_MAX_CONNECTIONS (optional, default: 5)
    /// - PIPE_WATCH_CAPACITY (optional, default: 100)
    pub fn from_env() -> anyhow::Result<Self> {
        let database_path = std::env::var("PIPE_DATABASE_PATH")
            .map_err(|_| anyhow::anyhow!("PIPE_DATABASE_PATH environment variable not set"))?;

        let mut config = Self::new(database_path);

        if let Some(ms) = env_parse::<u64>("PIPE_BUSY_TIMEOUT_MS") {
            config.busy_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse::<u32>("PIPE_MAX_CONNECTIONS") {
            config.max_connections = n;
        }
        if let Some(n) = env_parse::<usize>("PIPE_WATCH_CAPACITY") {
            config.watch_capacity = n;
        }

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_path.as_os_str().is_empty() {
            anyhow::bail!("database_path cannot be empty");
        }

        if self.max_connections == 0 {
            anyhow::bail!("max_connections must be greater than 0");
        }

        // tokio's bounded channel panics on a zero capacity
        if self.watch_capacity == 0 {
            anyhow::bail!("watch_capacity must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("pipe.db")
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.busy_timeout, Duration::from_millis(5000));
        assert_eq!(config.watch_capacity, 100);
        assert_eq!(config.database_path, PathBuf::from("pipe.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.watch_capacity = 0;
        assert!(config.validate().is_err());
        config.watch_capacity = 10;

        config.max_connections = 0;
        assert!(config.validate().is_err());
        config.max_connections = 1;

        config.database_path = PathBuf::new();
        assert!(config.validate().is_err());

        config.database_path = PathBuf::from("/tmp/pipe.db");
        assert!(config.validate().is_ok());
    }
}
