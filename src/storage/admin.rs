//! One-shot administrative setup for the server engine.
//!
//! Creating a database cannot happen inside a transaction, so
//! [`create_database`] issues a bare statement on a fresh connection to the
//! maintenance database (sqlx runs un-wrapped statements in autocommit mode).
//! The target database name is always passed in explicitly.

use sqlx::Connection;
use strum_macros::Display;

use crate::storage::StorageError;
use crate::storage::db::postgres::{ServerTarget, release};
use crate::storage::dialect::Dialect;
use crate::storage::error::PG_DUPLICATE_DATABASE;

/// Database every PostgreSQL server has, used to issue `CREATE DATABASE`.
pub const DEFAULT_MAINTENANCE_DB: &str = "postgres";

/// Outcome of [`create_database`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DatabaseCreation {
    Created,
    AlreadyExists,
}

/// Summary of a full [`bootstrap`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub database: String,
    pub creation: DatabaseCreation,
}

/// Check that `name` is a plain SQL identifier safe to splice into DDL.
pub fn validate_identifier(name: &str) -> Result<(), StorageError> {
    let mut chars = name.chars();
    let valid_head = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');

    if valid_head && valid_tail && name.len() <= 63 {
        Ok(())
    } else {
        Err(StorageError::InvalidIdentifier(name.to_string()))
    }
}

/// Create `target.database`, treating "already exists" as success.
pub async fn create_database(
    target: &ServerTarget,
    maintenance_db: &str,
) -> Result<DatabaseCreation, StorageError> {
    validate_identifier(&target.database)?;

    let mut conn = target.connect_to(maintenance_db).await?;
    let sql = format!("CREATE DATABASE \"{}\"", target.database);
    let result = sqlx::raw_sql(&sql).execute(&mut conn).await;
    release(conn).await;

    match result.map_err(StorageError::from) {
        Ok(_) => {
            tracing::info!(database = %target.database, "Database created");
            Ok(DatabaseCreation::Created)
        }
        Err(e) if e.sqlstate().as_deref() == Some(PG_DUPLICATE_DATABASE) => {
            tracing::info!(database = %target.database, "Database already created");
            Ok(DatabaseCreation::AlreadyExists)
        }
        Err(e) => Err(e),
    }
}

/// Run `schema` against `target.database` in a single transaction.
///
/// Integer boolean defaults are rewritten to keywords first.
pub async fn create_tables(target: &ServerTarget, schema: &str) -> Result<(), StorageError> {
    let schema = Dialect::postgres().adapt_schema(schema);

    let mut conn = target.connect_to(&target.database).await?;
    let result = async {
        let mut tx = conn.begin().await?;
        sqlx::raw_sql(&schema).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok::<_, sqlx::Error>(())
    }
    .await;
    release(conn).await;

    result.map_err(|e| StorageError::SchemaBuild(e.to_string()))?;
    tracing::info!(database = %target.database, "Schema successfully run");
    Ok(())
}

/// Create the database (if needed) and its tables.
pub async fn bootstrap(
    target: &ServerTarget,
    schema: &str,
) -> Result<BootstrapReport, StorageError> {
    let creation = create_database(target, DEFAULT_MAINTENANCE_DB).await?;
    create_tables(target, schema).await?;
    Ok(BootstrapReport {
        database: target.database.clone(),
        creation,
    })
}
