//! User-facing storage facade.
//!
//! [`Store`] is the only type higher layers talk to. It renders statements
//! with the active backend's dialect and hands them to the backend, so every
//! engine gets identical filter composition, error shape and row format.
//!
//! Operations that can be batched come in two flavours: `render_*` returns
//! the [`Statement`] without running it, the plain method executes it.

use std::sync::Arc;

use crate::storage::StorageError;
use crate::storage::backend::{Backend, Engine};
use crate::storage::dialect::{Dialect, FunctionArg, FunctionKey};
use crate::storage::query::{
    Assignments, Filter, Statement, UpdateScope, render_delete, render_delete_all, render_insert,
    render_select, render_update,
};
use crate::storage::types::{Row, RowId, Value};

// =============================================================================
// Constants
// =============================================================================

/// Attempts at a fresh identifier before [`Store::insert_generating_id`] gives up.
pub const MAX_ID_ATTEMPTS: u32 = 5;

/// Column name used for generated identifiers when callers don't pick one.
pub const DEFAULT_ID_FIELD: &str = "uid";

// =============================================================================
// Store
// =============================================================================

/// Engine-agnostic data access.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn Backend>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("engine", &self.backend.engine())
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Wrap a backend.
    pub fn new(backend: impl Backend) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Wrap an already shared backend.
    pub fn from_arc(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub fn engine(&self) -> Engine {
        self.backend.engine()
    }

    pub fn dialect(&self) -> &Dialect {
        self.backend.dialect()
    }

    /// Value to bind for `true` on this engine.
    pub fn true_value(&self) -> Value {
        self.dialect().true_value()
    }

    /// Value to bind for `false` on this engine.
    pub fn false_value(&self) -> Value {
        self.dialect().false_value()
    }

    /// Render `NAME(args...)` for a logical function; `None` if unmapped.
    pub fn function_name(&self, key: FunctionKey, args: &[FunctionArg<'_>]) -> Option<String> {
        self.dialect().function_call(key, args)
    }

    /// Best-effort schema build; failures are logged by the backend.
    pub async fn initialize_schema(&self, schema: &str) -> bool {
        self.backend.initialize_schema(schema).await
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub fn render_select(&self, table: &str, filter: &Filter) -> Statement {
        render_select(self.dialect(), table, filter)
    }

    /// Rows of `table` matching every term of `filter`.
    pub async fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StorageError> {
        let stmt = self.render_select(table, filter);
        tracing::trace!(sql = %stmt.sql, "select");
        self.backend.fetch_rows(&stmt).await
    }

    /// Every value of `column` in `table`.
    pub async fn select_column(
        &self,
        table: &str,
        column: &str,
    ) -> Result<Vec<Value>, StorageError> {
        self.backend.select_column(table, column).await
    }

    /// Run a pre-built query and return full rows.
    pub async fn raw_select(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StorageError> {
        let stmt = Statement {
            sql: sql.to_string(),
            params: params.to_vec(),
        };
        self.backend.fetch_rows(&stmt).await
    }

    /// Run a pre-built query and return only the first column of each row.
    pub async fn raw_select_column(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<Value>, StorageError> {
        let stmt = Statement {
            sql: sql.to_string(),
            params: params.to_vec(),
        };
        self.backend.fetch_column(&stmt).await
    }

    // -------------------------------------------------------------------------
    // Inserts
    // -------------------------------------------------------------------------

    pub fn render_insert(&self, table: &str, data: &Assignments) -> Statement {
        render_insert(self.dialect(), table, data)
    }

    /// Insert one row; returns the engine-assigned identifier if there is one.
    pub async fn insert(
        &self,
        table: &str,
        data: &Assignments,
    ) -> Result<Option<RowId>, StorageError> {
        let stmt = self.render_insert(table, data);
        self.backend.execute_insert(&stmt).await
    }

    /// Insert one row with a freshly generated text identifier in `id_field`.
    ///
    /// A uniqueness conflict on `id_field` triggers a retry with a new
    /// identifier, up to [`MAX_ID_ATTEMPTS`] times. Any other error, including
    /// a conflict on another UNIQUE column, is returned immediately.
    pub async fn insert_generating_id(
        &self,
        table: &str,
        data: &Assignments,
        id_field: &str,
    ) -> Result<RowId, StorageError> {
        self.insert_generating_id_with(table, data, id_field, || {
            uuid::Uuid::new_v4().to_string()
        })
        .await
    }

    /// [`Store::insert_generating_id`] with a caller-supplied generator.
    pub async fn insert_generating_id_with<F>(
        &self,
        table: &str,
        data: &Assignments,
        id_field: &str,
        mut generate: F,
    ) -> Result<RowId, StorageError>
    where
        F: FnMut() -> String + Send,
    {
        let mut row = data.clone();
        for attempt in 1..=MAX_ID_ATTEMPTS {
            let uid = generate();
            row.insert(id_field, uid.clone());

            match self.insert(table, &row).await {
                Ok(_) => return Ok(RowId::Text(uid)),
                Err(e) if e.is_unique_violation_on(id_field) => {
                    tracing::debug!(table, attempt, "Generated identifier collided, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::error!(table, attempts = MAX_ID_ATTEMPTS, "Could not generate a unique identifier");
        Err(StorageError::IdentifierExhausted {
            table: table.to_string(),
            attempts: MAX_ID_ATTEMPTS,
        })
    }

    // -------------------------------------------------------------------------
    // Updates
    // -------------------------------------------------------------------------

    /// Render the UPDATE without running it; `None` when `data` is empty.
    pub fn render_update(
        &self,
        table: &str,
        scope: &UpdateScope,
        data: &Assignments,
    ) -> Option<Statement> {
        render_update(self.dialect(), table, scope, data)
    }

    /// Apply `data` to the rows in `scope`; returns the affected row count.
    ///
    /// Empty `data` is a no-op: nothing is rendered or executed.
    pub async fn update(
        &self,
        table: &str,
        scope: &UpdateScope,
        data: &Assignments,
    ) -> Result<u64, StorageError> {
        let Some(stmt) = self.render_update(table, scope, data) else {
            return Ok(0);
        };
        if matches!(scope, UpdateScope::AllRows) {
            tracing::warn!(table, "Updating every row");
        }
        self.backend.execute(&stmt).await
    }

    // -------------------------------------------------------------------------
    // Deletes
    // -------------------------------------------------------------------------

    /// Render the DELETE without running it. Empty filters are rejected.
    pub fn render_delete(&self, table: &str, filter: &Filter) -> Result<Statement, StorageError> {
        render_delete(self.dialect(), table, filter)
    }

    /// Delete rows matching `filter`; returns the affected row count.
    pub async fn delete(&self, table: &str, filter: &Filter) -> Result<u64, StorageError> {
        let stmt = self.render_delete(table, filter)?;
        self.backend.execute(&stmt).await
    }

    /// Delete every row of `table`.
    pub async fn delete_all(&self, table: &str) -> Result<u64, StorageError> {
        tracing::warn!(table, "Deleting every row");
        self.backend.execute(&render_delete_all(table)).await
    }

    // -------------------------------------------------------------------------
    // Batches
    // -------------------------------------------------------------------------

    /// Run `statements` in one transaction: all commit or none do.
    pub async fn execute_batch(&self, statements: Vec<Statement>) -> Result<(), StorageError> {
        if statements.is_empty() {
            return Ok(());
        }
        tracing::debug!(count = statements.len(), "Executing batch");
        self.backend.execute_batch(&statements).await
    }
}
