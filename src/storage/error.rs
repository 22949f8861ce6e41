//! Storage-specific error types.
//!
//! All storage operations return [`StorageError`] on failure. The two variants
//! callers usually care about are [`StorageError::Unavailable`] (no connection
//! could be acquired) and [`StorageError::Statement`] (the engine rejected the
//! SQL). Both are produced by classifying the underlying [`sqlx::Error`].

use sqlx::postgres::PgDatabaseError;
use thiserror::Error;

/// SQLSTATE reported by PostgreSQL when `CREATE DATABASE` targets an existing name.
pub(crate) const PG_DUPLICATE_DATABASE: &str = "42P04";

/// SQLSTATE reported by PostgreSQL when `lastval()` has no sequence to report.
pub(crate) const PG_OBJECT_NOT_IN_PREREQUISITE_STATE: &str = "55000";

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A connection to the backing store could not be opened or used.
    #[error("storage unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),

    /// The engine rejected a statement (syntax, constraint, type mismatch).
    #[error("statement error: {0}")]
    Statement(#[source] sqlx::Error),

    /// Schema script failed to run.
    #[error("schema build error: {0}")]
    SchemaBuild(String),

    /// Every generated identifier collided with an existing row.
    #[error("no unique identifier for table '{table}' after {attempts} attempts")]
    IdentifierExhausted { table: String, attempts: u32 },

    /// Delete requested without any filter; use the bulk delete path instead.
    #[error("refusing to delete from '{table}' without a filter")]
    EmptyFilter { table: String },

    /// Invalid data in database (e.g., undecodable column type).
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Identifier that cannot be safely spliced into DDL.
    #[error("invalid identifier: '{0}'")]
    InvalidIdentifier(String),
}

impl StorageError {
    /// True when the engine reported a uniqueness (primary key / UNIQUE) conflict.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Statement(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }

    /// True when a uniqueness conflict involves `column`.
    ///
    /// Conflicts on other UNIQUE columns of the same table return `false`.
    pub fn is_unique_violation_on(&self, column: &str) -> bool {
        let Self::Statement(sqlx::Error::Database(db)) = self else {
            return false;
        };
        if !db.is_unique_violation() {
            return false;
        }

        let columns = match db.try_downcast_ref::<PgDatabaseError>() {
            Some(pg) => pg.detail().map(pg_conflict_columns).unwrap_or_default(),
            None => sqlite_conflict_columns(db.message()),
        };
        columns.iter().any(|c| c.eq_ignore_ascii_case(column))
    }

    /// True for connection-level failures.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// SQLSTATE code of the underlying database error, if any.
    pub(crate) fn sqlstate(&self) -> Option<String> {
        match self {
            Self::Statement(sqlx::Error::Database(db)) => db.code().map(|c| c.into_owned()),
            _ => None,
        }
    }
}

/// Columns named in a PostgreSQL conflict detail: `Key (a, b)=(1, 2) already exists.`
fn pg_conflict_columns(detail: &str) -> Vec<String> {
    detail
        .strip_prefix("Key (")
        .and_then(|rest| rest.split_once(")="))
        .map(|(columns, _)| {
            columns
                .split(',')
                .map(|c| c.trim().trim_matches('"').to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Columns named in a SQLite conflict message: `UNIQUE constraint failed: t.a, t.b`.
fn sqlite_conflict_columns(message: &str) -> Vec<String> {
    message
        .split_once("constraint failed: ")
        .map(|(_, columns)| {
            columns
                .split(',')
                .map(|c| c.trim().rsplit('.').next().unwrap_or_default().to_string())
                .collect()
        })
        .unwrap_or_default()
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Configuration(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::Unavailable(err),
            other => Self::Statement(other),
        }
    }
}
