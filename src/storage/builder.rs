//! Storage builder.
//!
//! Resolves a [`DatabaseConfig`] into a ready [`Store`] backed by the
//! configured engine.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::{DEFAULT_CONNECT_TIMEOUT, DatabaseConfig, DatabaseDriver};
use crate::storage::db::{PostgresBackend, ServerTarget, SqliteBackend};
use crate::storage::{StorageError, Store};

/// Where the store's data lives.
#[derive(Debug, Clone)]
enum Target {
    Sqlite(PathBuf),
    Postgres(ServerTarget),
}

/// Builder for constructing a [`Store`].
#[derive(Debug, Clone)]
pub struct StorageBuilder {
    target: Target,
    timeout: Duration,
}

impl StorageBuilder {
    /// Store backed by a SQLite file.
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            target: Target::Sqlite(path.into()),
            timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Store backed by a PostgreSQL database.
    pub fn postgres(target: ServerTarget) -> Self {
        Self {
            target: Target::Postgres(target),
            timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Builder for whichever engine `config` selects.
    pub fn from_config(config: &DatabaseConfig) -> Self {
        let builder = match config.driver {
            DatabaseDriver::Sqlite => Self::sqlite(&config.path),
            DatabaseDriver::Postgres => Self::postgres(config.server_target()),
        };
        builder.timeout(config.connect_timeout)
    }

    /// Connection timeout (postgres) or lock wait (sqlite).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the store.
    ///
    /// For SQLite the parent directory of the database file is created if
    /// missing. No connection is opened here.
    pub fn build(self) -> Result<Store, StorageError> {
        match self.target {
            Target::Sqlite(path) => {
                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                    && !parent.exists()
                {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StorageError::Unavailable(sqlx::Error::Io(std::io::Error::new(
                            e.kind(),
                            format!(
                                "failed to create database directory '{}': {}",
                                parent.display(),
                                e
                            ),
                        )))
                    })?;
                }
                tracing::debug!(path = %path.display(), "Using sqlite storage");
                Ok(Store::new(SqliteBackend::with_busy_timeout(
                    path,
                    self.timeout,
                )))
            }
            Target::Postgres(target) => {
                tracing::debug!(
                    host = %target.host,
                    database = %target.database,
                    "Using postgres storage"
                );
                Ok(Store::new(PostgresBackend::new(
                    target.with_connect_timeout(self.timeout),
                )))
            }
        }
    }
}
