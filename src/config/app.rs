//! Application configuration structures.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::storage::ServerTarget;
use crate::storage::admin::validate_identifier;
use crate::storage::db::postgres::DEFAULT_PORT;

use super::validation::{ConfigError, expand_env_vars};

// =============================================================================
// Constants
// =============================================================================

/// Default SQLite database file.
pub const DEFAULT_SQLITE_PATH: &str = "data/relstore.db";

/// Default server host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default connection timeout (30 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

fn default_path() -> String {
    DEFAULT_SQLITE_PATH.to_string()
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

// =============================================================================
// Database Configuration
// =============================================================================

/// Storage engine selection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DatabaseDriver {
    /// File-based SQLite database.
    #[default]
    Sqlite,
    /// PostgreSQL server.
    #[strum(to_string = "postgres", serialize = "postgresql")]
    #[serde(alias = "postgresql")]
    Postgres,
}

/// Database configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Storage engine (default: sqlite).
    #[serde(default)]
    pub driver: DatabaseDriver,

    /// SQLite database file path.
    #[serde(default = "default_path")]
    pub path: String,

    /// PostgreSQL host (default: "127.0.0.1").
    #[serde(default = "default_host")]
    pub host: String,

    /// PostgreSQL port (default: 5432).
    #[serde(default = "default_port")]
    pub port: u16,

    /// PostgreSQL user.
    #[serde(default)]
    pub username: String,

    /// PostgreSQL password; supports `${VAR}` expansion.
    #[serde(default)]
    pub password: String,

    /// PostgreSQL database name.
    #[serde(default)]
    pub name: String,

    /// Connection / lock wait timeout (default: "30s").
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("driver", &self.driver)
            .field("path", &self.path)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("name", &self.name)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            path: default_path(),
            host: default_host(),
            port: DEFAULT_PORT,
            username: String::new(),
            password: String::new(),
            name: String::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl DatabaseConfig {
    /// Validate the fields the selected driver needs.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "database connect_timeout must be positive".to_string(),
            ));
        }

        match self.driver {
            DatabaseDriver::Sqlite => {
                if self.path.trim().is_empty() {
                    return Err(ConfigError::ValidationError(
                        "database path must not be empty for sqlite".to_string(),
                    ));
                }
            }
            DatabaseDriver::Postgres => {
                if self.host.trim().is_empty() {
                    return Err(ConfigError::ValidationError(
                        "database host must not be empty for postgres".to_string(),
                    ));
                }
                if self.port == 0 {
                    return Err(ConfigError::ValidationError(
                        "database port must be non-zero".to_string(),
                    ));
                }
                if self.username.trim().is_empty() {
                    return Err(ConfigError::ValidationError(
                        "database username must not be empty for postgres".to_string(),
                    ));
                }
                validate_identifier(&self.name).map_err(|_| {
                    ConfigError::ValidationError(format!(
                        "invalid database name: '{}'",
                        self.name
                    ))
                })?;
            }
        }

        Ok(())
    }

    /// Server connection parameters for the postgres driver.
    pub fn server_target(&self) -> ServerTarget {
        ServerTarget::new(&self.host, &self.username, &self.password, &self.name)
            .with_port(self.port)
            .with_connect_timeout(self.connect_timeout)
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Schema file applied by `init-schema` when no path is given on the command line.
    #[serde(default)]
    pub schema_path: Option<String>,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` and `${VAR:-default}` references are expanded before parsing.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(&expand_env_vars(content))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;

        if let Some(schema) = &self.schema_path
            && schema.trim().is_empty()
        {
            return Err(ConfigError::ValidationError(
                "schema_path must not be empty when set".to_string(),
            ));
        }

        Ok(())
    }
}
