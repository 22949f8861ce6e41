//! Configuration module.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Storage engine selection (sqlite / postgres)
//! - SQLite file path or PostgreSQL connection parameters
//! - Default schema file
//!
//! Credentials are resolved here (file + environment), never prompted for.

mod app;
mod validation;

pub use app::{
    AppConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_HOST, DEFAULT_SQLITE_PATH, DatabaseConfig,
    DatabaseDriver,
};
pub use validation::{ConfigError, expand_env_vars, parse_duration};
