//! # Configuration
//!
//! Optional `featuregate.toml`, located by (first match wins):
//! 1. `--config <path>`
//! 2. `FEATUREGATE_CONFIG`
//! 3. `./featuregate.toml`, if it exists
//!
//! Every field has a default, so an empty or missing file is valid. CLI
//! flags override whatever the file says.

use featuregate_core::FeatureGateError;
use featuregate_core::primitives::DEFAULT_RECONCILE_TIMEOUT_SECS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "FEATUREGATE_CONFIG";

/// Config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "featuregate.toml";

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Path to the redb database.
    pub database: PathBuf,
    /// Upper bound on one reconcile step, in seconds.
    pub reconcile_timeout_secs: u64,
    /// Retries for a retryable reconcile failure before giving up.
    pub max_retries: u32,
    /// First retry delay in milliseconds; doubles per attempt.
    pub retry_backoff_ms: u64,
    /// Features reconciled in parallel.
    pub workers: usize,
    pub server: ServerConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("featuregates.redb"),
            reconcile_timeout_secs: DEFAULT_RECONCILE_TIMEOUT_SECS,
            max_retries: 5,
            retry_backoff_ms: 100,
            workers: 4,
            server: ServerConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8443,
        }
    }
}

impl Config {
    /// Load the configuration, falling back to defaults when no file is found.
    ///
    /// An explicitly named file (flag or env var) must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self, FeatureGateError> {
        let named = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        match named {
            Some(path) => Self::from_file(&path),
            None => {
                let local = Path::new(DEFAULT_CONFIG_FILE);
                if local.is_file() {
                    Self::from_file(local)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Read and parse a config file.
    pub fn from_file(path: &Path) -> Result<Self, FeatureGateError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            FeatureGateError::storage(format!("read config {}", path.display()), e)
        })?;
        Self::from_toml(&contents)
            .map_err(|e| e.context(format!("invalid config {}", path.display())))
    }

    /// Parse config text.
    pub fn from_toml(contents: &str) -> Result<Self, FeatureGateError> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| FeatureGateError::DeserializationError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), FeatureGateError> {
        if self.workers == 0 {
            return Err(FeatureGateError::DeserializationError(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.reconcile_timeout_secs == 0 {
            return Err(FeatureGateError::DeserializationError(
                "reconcile_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }

    #[must_use]
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}
