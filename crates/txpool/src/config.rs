//! Transaction pool configuration via `txpool.toml`
//!
//! Every key is optional; a missing key takes its default. Durations are
//! plain millisecond integers so the file stays readable.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Config file name used by [`TxPoolConfig::write_default_if_missing`] callers.
pub const CONFIG_FILE_NAME: &str = "txpool.toml";

/// Errors loading or validating a [`TxPoolConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or written.
    #[error("config file '{path}': {source}")]
    Io {
        /// Offending path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The TOML did not parse.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be rendered as TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings for a [`TxPool`](crate::TxPool).
///
/// # Example
///
/// ```toml
/// name = "TransactionPool"
/// capacity = 20
/// transaction_timeout_ms = 30000
/// idle_timeout_ms = 1800000
/// pool_timeout_ms = 1000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxPoolConfig {
    /// Pool name used in logs.
    #[serde(default = "default_name")]
    pub name: String,
    /// Maximum concurrent transactions (connection pool size).
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Age after which the reaper kills an idle transaction.
    #[serde(default = "default_transaction_timeout_ms")]
    pub transaction_timeout_ms: u64,
    /// Lifetime of an unused pooled connection. 0 keeps them forever.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Longest Begin waits for a connection. 0 waits for the caller's
    /// deadline only.
    #[serde(default = "default_pool_timeout_ms")]
    pub pool_timeout_ms: u64,
}

fn default_name() -> String {
    "TransactionPool".to_string()
}

fn default_capacity() -> usize {
    20
}

fn default_transaction_timeout_ms() -> u64 {
    30_000
}

fn default_idle_timeout_ms() -> u64 {
    1_800_000
}

fn default_pool_timeout_ms() -> u64 {
    1_000
}

impl Default for TxPoolConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            capacity: default_capacity(),
            transaction_timeout_ms: default_transaction_timeout_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            pool_timeout_ms: default_pool_timeout_ms(),
        }
    }
}

impl TxPoolConfig {
    /// Transaction timeout as a `Duration`.
    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.transaction_timeout_ms)
    }

    /// Idle timeout as a `Duration`.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Pool timeout as a `Duration`.
    pub fn pool_timeout(&self) -> Duration {
        Duration::from_millis(self.pool_timeout_ms)
    }

    /// Check that values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::Invalid("capacity must be greater than 0".into()));
        }
        if self.transaction_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "transaction_timeout_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Transaction pool configuration

# Pool name used in logs.
name = "TransactionPool"

# Maximum number of concurrent transactions. Each holds one connection.
capacity = 20

# Transactions idle for longer than this are rolled back by the reaper.
transaction_timeout_ms = 30000

# Unused pooled connections are closed after this long. 0 disables.
idle_timeout_ms = 1800000

# Longest time Begin waits for a free connection.
# 0 waits until the caller's own deadline.
pool_timeout_ms = 1000
"#
    }

    /// Parse and validate a config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: TxPoolConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to `path`.
    pub fn write_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
