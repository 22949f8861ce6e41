//! PostgreSQL backend implementation using sqlx.
//!
//! Connection parameters arrive already resolved in a [`ServerTarget`]; this
//! module never prompts for them. Each operation wraps a fresh connection that
//! is closed before the call returns.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::encode::{Encode, IsNull};
use sqlx::error::BoxDynError;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{
    PgArgumentBuffer, PgConnectOptions, PgConnection, PgRow, PgTypeInfo, Postgres,
};
use sqlx::query::Query;
use sqlx::{ConnectOptions, Connection, Database, Row as _, Type, TypeInfo, ValueRef};

use crate::storage::StorageError;
use crate::storage::backend::{Backend, Engine};
use crate::storage::dialect::Dialect;
use crate::storage::error::PG_OBJECT_NOT_IN_PREREQUISITE_STATE;
use crate::storage::query::Statement;
use crate::storage::types::{Row, RowId, Value};

/// Default PostgreSQL port.
pub const DEFAULT_PORT: u16 = 5432;

type PgQuery<'q> = Query<'q, Postgres, <Postgres as Database>::Arguments<'q>>;

// =============================================================================
// Server Target
// =============================================================================

/// Resolved connection parameters for a PostgreSQL server.
#[derive(Clone)]
pub struct ServerTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Database the steady-state API connects to.
    pub database: String,
    pub connect_timeout: Option<Duration>,
}

impl std::fmt::Debug for ServerTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

impl ServerTarget {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: username.into(),
            password: password.into(),
            database: database.into(),
            connect_timeout: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Options for connecting to `database` on this server.
    pub fn options_for(&self, database: &str) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(&self.password)
            .database(database)
    }

    /// Open a connection to `database`, bounded by the connect timeout.
    pub(crate) async fn connect_to(&self, database: &str) -> Result<PgConnection, StorageError> {
        let options = self.options_for(database);
        let connecting = options.connect();
        let result = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connecting)
                .await
                .unwrap_or_else(|_| Err(self.connect_timed_out(limit))),
            None => connecting.await,
        };
        result.map_err(StorageError::Unavailable)
    }

    fn connect_timed_out(&self, limit: Duration) -> sqlx::Error {
        sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!(
                "connecting to {}:{} timed out after {}",
                self.host,
                self.port,
                humantime::format_duration(limit)
            ),
        ))
    }
}

// =============================================================================
// Untyped NULL
// =============================================================================

/// NULL parameter sent with OID 0 so the server infers the column type.
///
/// A typed null (`Option<String>`) would be rejected by non-text columns.
#[derive(Debug, Clone, Copy)]
struct UntypedNull;

impl Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

// =============================================================================
// Backend
// =============================================================================

/// Client/server storage backend.
#[derive(Debug, Clone)]
pub struct PostgresBackend {
    target: ServerTarget,
    dialect: Dialect,
}

impl PostgresBackend {
    pub fn new(target: ServerTarget) -> Self {
        Self {
            target,
            dialect: Dialect::postgres(),
        }
    }

    pub fn target(&self) -> &ServerTarget {
        &self.target
    }

    async fn connect(&self) -> Result<PgConnection, StorageError> {
        self.target.connect_to(&self.target.database).await
    }
}

#[async_trait]
impl Backend for PostgresBackend {
    fn engine(&self) -> Engine {
        Engine::Postgres
    }

    fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    async fn initialize_schema(&self, _schema: &str) -> bool {
        tracing::warn!(
            database = %self.target.database,
            "Re-building the database is not supported on postgres; run the `init-schema` command instead"
        );
        false
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
        let result = insert_and_fetch_id(&mut conn, stmt).await;
        release(conn).await;
        result
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

/// Runs the insert in autocommit mode, then asks the session for the last
/// sequence value it generated.
async fn insert_and_fetch_id(
    conn: &mut PgConnection,
    stmt: &Statement,
) -> Result<Option<RowId>, StorageError> {
    bind_all(sqlx::query(&stmt.sql), &stmt.params)
        .execute(&mut *conn)
        .await?;

    let last = sqlx::query_scalar::<_, i64>("SELECT lastval()")
        .fetch_one(&mut *conn)
        .await
        .map_err(StorageError::from);

    match last {
        Ok(id) => Ok(Some(RowId::Integer(id))),
        Err(e) if e.sqlstate().as_deref() == Some(PG_OBJECT_NOT_IN_PREREQUISITE_STATE) => Ok(None),
        Err(e) => Err(e),
    }
}

async fn run_batch(conn: &mut PgConnection, statements: &[Statement]) -> Result<(), StorageError> {
    let mut tx = conn.begin().await?;
    for (index, stmt) in statements.iter().enumerate() {
        if let Err(e) = bind_all(sqlx::query(&stmt.sql), &stmt.params)
            .execute(&mut *tx)
            .await
        {
            tracing::warn!(index, error = %e, "Batch statement failed, rolling back");
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "Failed to roll back postgres batch");
            }
            return Err(e.into());
        }
    }
    tx.commit().await?;
    Ok(())
}

pub(crate) async fn release(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        tracing::warn!(error = %e, "Failed to close postgres connection");
    }
}

fn bind_all<'q>(mut query: PgQuery<'q>, params: &[Value]) -> PgQuery<'q> {
    for value in params {
        query = match value {
            Value::Null => query.bind(UntypedNull),
            Value::Bool(b) => query.bind(*b),
            Value::Integer(i) => query.bind(*i),
            Value::Real(r) => query.bind(*r),
            Value::Text(s) => query.bind(s.clone()),
            Value::Blob(b) => query.bind(b.clone()),
        };
    }
    query
}

fn decode_row(row: &PgRow) -> Result<Row, StorageError> {
    use sqlx::Column as _;

    row.columns()
        .iter()
        .map(|col| Ok((col.name().to_string(), decode_value(row, col.ordinal())?)))
        .collect()
}

/// Decode by the column's declared type; widths must match the wire format.
fn decode_value(row: &PgRow, index: usize) -> Result<Value, StorageError> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_string();

    let value = match type_name.as_str() {
        "BOOL" => Value::Bool(row.try_get::<bool, _>(index)?),
        "INT2" => Value::Integer(i64::from(row.try_get::<i16, _>(index)?)),
        "INT4" => Value::Integer(i64::from(row.try_get::<i32, _>(index)?)),
        "INT8" => Value::Integer(row.try_get::<i64, _>(index)?),
        "OID" => Value::Integer(i64::from(row.try_get::<sqlx::postgres::types::Oid, _>(index)?.0)),
        "FLOAT4" => Value::Real(f64::from(row.try_get::<f32, _>(index)?)),
        "FLOAT8" => Value::Real(row.try_get::<f64, _>(index)?),
        "NUMERIC" => Value::Text(row.try_get::<sqlx::types::Decimal, _>(index)?.to_string()),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" => {
            Value::Text(row.try_get::<String, _>(index)?)
        }
        "BYTEA" => Value::Blob(row.try_get::<Vec<u8>, _>(index)?),
        "JSON" | "JSONB" => Value::Text(row.try_get::<serde_json::Value, _>(index)?.to_string()),
        "UUID" => Value::Text(row.try_get::<uuid::Uuid, _>(index)?.to_string()),
        "DATE" => Value::Text(row.try_get::<chrono::NaiveDate, _>(index)?.to_string()),
        "TIME" => Value::Text(row.try_get::<chrono::NaiveTime, _>(index)?.to_string()),
        "TIMESTAMP" => Value::Text(row.try_get::<chrono::NaiveDateTime, _>(index)?.to_string()),
        "TIMESTAMPTZ" => Value::Text(
            row.try_get::<chrono::DateTime<chrono::Utc>, _>(index)?
                .to_rfc3339(),
        ),
        // Enums and domains over text arrive as UTF-8 in the binary format.
        other => match row.try_get_unchecked::<String, _>(index) {
            Ok(text) => Value::Text(text),
            Err(_) => {
                return Err(StorageError::InvalidData(format!(
                    "unsupported postgres type '{other}' in column {index}"
                )));
            }
        },
    };
    Ok(value)
}
