//! SQLite backend implementation using sqlx.
//!
//! Every operation opens its own connection with foreign-key enforcement on,
//! does its work and closes the connection again. Nothing is pooled, so an
//! in-memory database (`:memory:`) does not survive between calls; use a file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{ConnectOptions, Connection, Database, Row as _, TypeInfo, ValueRef};

use crate::storage::StorageError;
use crate::storage::backend::{Backend, Engine};
use crate::storage::dialect::Dialect;
use crate::storage::query::Statement;
use crate::storage::types::{Row, RowId, Value};

/// Prepended to every schema script.
pub const ENABLE_FOREIGN_KEYS: &str = "PRAGMA foreign_keys = ON;";

/// Default time to wait on a locked database file.
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(30);

type SqliteQuery<'q> = Query<'q, Sqlite, <Sqlite as Database>::Arguments<'q>>;

/// File-based storage backend.
#[derive(Clone)]
pub struct SqliteBackend {
    path: PathBuf,
    options: SqliteConnectOptions,
    dialect: Dialect,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteBackend {
    /// Backend for the database file at `path`.
    ///
    /// # Configuration
    ///
    /// - Foreign keys enforced on every connection
    /// - WAL journal mode, normal synchronous mode
    /// - Create database if not exists
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_busy_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Same as [`SqliteBackend::new`] with an explicit lock wait.
    pub fn with_busy_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> Self {
        let path = path.as_ref().to_path_buf();
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(busy_timeout);

        Self {
            path,
            options,
            dialect: Dialect::sqlite(),
        }
    }

    /// Database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn connect(&self) -> Result<SqliteConnection, StorageError> {
        self.options
            .connect()
            .await
            .map_err(StorageError::Unavailable)
    }

    async fn apply_schema(&self, schema: &str) -> Result<(), StorageError> {
        let script = format!("{ENABLE_FOREIGN_KEYS}\n{schema}");
        let mut conn = self.connect().await?;
        let result = sqlx::Executor::execute(&mut conn, sqlx::raw_sql(&script)).await;
        release(conn).await;
        result
            .map(|_| ())
            .map_err(|e| StorageError::SchemaBuild(e.to_string()))
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    async fn initialize_schema(&self, schema: &str) -> bool {
        match self.apply_schema(schema).await {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "Database schema initialized");
                true
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Error building database");
                false
            }
        }
    }

    async fn fetch_rows(&self, stmt: &Statement) -> Result<Vec<Row>, StorageError> {
        let mut conn = self.connect().await?;
        let result = bind_all(sqlx::query(&stmt.sql), &stmt.params)
            .fetch_all(&mut conn)
            .await;
        release(conn).await;

        result?.iter().map(decode_row).collect()
    }

    async fn fetch_column(&self, stmt: &Statement) -> Result<Vec<Value>, StorageError> {
        let mut conn = self.connect().await?;
        let result = bind_all(sqlx::query(&stmt.sql), &stmt.params)
            .fetch_all(&mut conn)
            .await;
        release(conn).await;

        result?.iter().map(|row| decode_value(row, 0)).collect()
    }

    async fn execute(&self, stmt: &Statement) -> Result<u64, StorageError> {
        let mut conn = self.connect().await?;
        let result = bind_all(sqlx::query(&stmt.sql), &stmt.params)
            .execute(&mut conn)
            .await;
        release(conn).await;

        Ok(result?.rows_affected())
    }

    async fn execute_insert(&self, stmt: &Statement) -> Result<Option<RowId>, StorageError> {
        let mut conn = self.connect().await?;
        let result = bind_all(sqlx::query(&stmt.sql), &stmt.params)
            .execute(&mut conn)
            .await;
        release(conn).await;

        Ok(Some(RowId::Integer(result?.last_insert_rowid())))
    }

    async fn execute_batch(&self, statements: &[Statement]) -> Result<(), StorageError> {
        if statements.is_empty() {
            return Ok(());
        }
        let mut conn = self.connect().await?;
        let result = run_batch(&mut conn, statements).await;
        release(conn).await;
        result
    }
}

async fn run_batch(
    conn: &mut SqliteConnection,
    statements: &[Statement],
) -> Result<(), StorageError> {
    let mut tx = conn.begin().await?;
    for (index, stmt) in statements.iter().enumerate() {
        if let Err(e) = bind_all(sqlx::query(&stmt.sql), &stmt.params)
            .execute(&mut *tx)
            .await
        {
            tracing::warn!(index, error = %e, "Batch statement failed, rolling back");
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "Failed to roll back sqlite batch");
            }
            return Err(e.into());
        }
    }
    tx.commit().await?;
    Ok(())
}

async fn release(conn: SqliteConnection) {
    if let Err(e) = conn.close().await {
        tracing::warn!(error = %e, "Failed to close sqlite connection");
    }
}

fn bind_all<'q>(mut query: SqliteQuery<'q>, params: &[Value]) -> SqliteQuery<'q> {
    for value in params {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Integer(i) => query.bind(*i),
            Value::Real(r) => query.bind(*r),
            Value::Text(s) => query.bind(s.clone()),
            Value::Blob(b) => query.bind(b.clone()),
        };
    }
    query
}

fn decode_row(row: &SqliteRow) -> Result<Row, StorageError> {
    use sqlx::Column as _;

    row.columns()
        .iter()
        .map(|col| Ok((col.name().to_string(), decode_value(row, col.ordinal())?)))
        .collect()
}

/// Decode by the value's storage class rather than the declared column type.
fn decode_value(row: &SqliteRow, index: usize) -> Result<Value, StorageError> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();

    let value = match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => Value::Integer(row.try_get_unchecked::<i64, _>(index)?),
        "REAL" | "NUMERIC" => Value::Real(row.try_get_unchecked::<f64, _>(index)?),
        "BLOB" => Value::Blob(row.try_get_unchecked::<Vec<u8>, _>(index)?),
        "TEXT" | "DATE" | "TIME" | "DATETIME" => {
            Value::Text(row.try_get_unchecked::<String, _>(index)?)
        }
        other => {
            return Err(StorageError::InvalidData(format!(
                "unsupported sqlite type '{other}' in column {index}"
            )));
        }
    };
    Ok(value)
}
