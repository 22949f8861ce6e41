//! Connection-level contract every storage engine implements.
//!
//! A backend only knows how to open a connection and run already-rendered
//! statements against it. SQL construction lives in [`crate::storage::query`]
//! and is shared by all engines through [`crate::Store`].

use async_trait::async_trait;
use strum_macros::{AsRefStr, Display};

use crate::storage::StorageError;
use crate::storage::dialect::Dialect;
use crate::storage::query::{Statement, render_column};
use crate::storage::types::{Row, RowId, Value};

/// Engine family behind a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Engine {
    Sqlite,
    Postgres,
}

/// Storage engine adapter.
///
/// Every method opens its own connection and releases it before returning,
/// on success and on error alike.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Engine family.
    fn engine(&self) -> Engine;

    /// Dialect used to render statements for this engine.
    fn dialect(&self) -> &Dialect;

    /// Run a DDL script once. Failures are logged, never returned.
    ///
    /// Returns whether the script was applied.
    async fn initialize_schema(&self, schema: &str) -> bool;

    /// Run a query and convert every row into a [`Row`].
    async fn fetch_rows(&self, stmt: &Statement) -> Result<Vec<Row>, StorageError>;

    /// Run a query and keep only the first column of every row.
    async fn fetch_column(&self, stmt: &Statement) -> Result<Vec<Value>, StorageError>;

    /// Execute a single statement; returns the number of affected rows.
    async fn execute(&self, stmt: &Statement) -> Result<u64, StorageError>;

    /// Execute an INSERT and report the engine-assigned identifier, if any.
    async fn execute_insert(&self, stmt: &Statement) -> Result<Option<RowId>, StorageError>;

    /// Execute all statements in a single transaction.
    async fn execute_batch(&self, statements: &[Statement]) -> Result<(), StorageError>;

    /// Every value of one column.
    async fn select_column(&self, table: &str, column: &str) -> Result<Vec<Value>, StorageError> {
        self.fetch_column(&render_column(table, column)).await
    }
}
