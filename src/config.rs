//! Configuration module
//!
//! Read from a TOML file, by default `~/.config/ocpp-central/config.toml`.
//! Every key has a default, so a missing file or section is not an error.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 9000
//!
//! [ocpp]
//! heartbeat_interval = 10
//! call_timeout_secs = 30
//!
//! [store]
//! backend = "sqlite"
//! url = "sqlite://./ocpp.db?mode=rwc"
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::infrastructure::database::DatabaseConfig;
use crate::support::errors::ConfigError;
use crate::support::retry::RetryConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ocpp: OcppConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Seconds to wait for connections to drain on shutdown
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
            shutdown_timeout: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcppConfig {
    /// Interval returned in BootNotification responses (seconds)
    pub heartbeat_interval: u32,
    /// How long an outbound CALL waits for its reply
    pub call_timeout_secs: u64,
    /// How long a handler waits for a Store write before replying anyway
    pub store_ack_timeout_ms: u64,
}

impl Default for OcppConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: 10,
            call_timeout_secs: 30,
            store_ack_timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Database URL, used by the `sqlite` backend
    pub url: String,
    pub retry_attempts: u32,
    pub retry_initial_delay_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            url: DatabaseConfig::default().url,
            retry_attempts: 3,
            retry_initial_delay_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// `text` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ocpp.heartbeat_interval == 0 {
            return Err(ConfigError::Invalid(
                "ocpp.heartbeat_interval must be positive".into(),
            ));
        }
        if self.ocpp.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "ocpp.call_timeout_secs must be positive".into(),
            ));
        }
        if self.ocpp.store_ack_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "ocpp.store_ack_timeout_ms must be positive".into(),
            ));
        }
        if self.store.retry_attempts == 0 {
            return Err(ConfigError::Invalid(
                "store.retry_attempts must be at least 1".into(),
            ));
        }
        if self.store.backend == StoreBackend::Sqlite && self.store.url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "store.url is required for the sqlite backend".into(),
            ));
        }
        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.ocpp.call_timeout_secs)
    }

    pub fn store_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ocpp.store_ack_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.store.retry_attempts,
            initial_delay: Duration::from_millis(self.store.retry_initial_delay_ms),
            ..RetryConfig::default()
        }
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            url: self.store.url.clone(),
        }
    }
}

/// `<config dir>/ocpp-central/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ocpp-central")
        .join("config.toml")
}
