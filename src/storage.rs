//! Storage Layer
//!
//! Engine-agnostic relational storage over interchangeable backends:
//! - **SQLite**: file-based, one short-lived connection per operation
//! - **PostgreSQL**: client/server, one short-lived connection per operation
//!
//! # Components
//!
//! - [`Store`]: The facade higher layers call (select, insert, update, delete, batches)
//! - [`Backend`]: Connection-level contract implemented by each engine
//! - [`Dialect`]: Per-engine placeholders, boolean literals and function names
//! - [`Filter`] / [`Assignments`] / [`Statement`]: Inputs and outputs of the query builders
//! - [`StorageBuilder`]: Construction from [`DatabaseConfig`](crate::config::DatabaseConfig)
//! - [`admin`]: One-shot database creation and schema bootstrap for the server engine

pub mod admin;
mod backend;
mod builder;
pub mod db;
pub mod dialect;
mod error;
mod facades;
pub mod query;
mod types;

pub use backend::{Backend, Engine};
pub use builder::StorageBuilder;
pub use db::{PostgresBackend, ServerTarget, SqliteBackend};
pub use dialect::{BooleanStyle, Dialect, FunctionArg, FunctionKey, Placeholder};
pub use error::StorageError;
pub use facades::{DEFAULT_ID_FIELD, MAX_ID_ATTEMPTS, Store};
pub use query::{Assignments, Comparison, Criterion, Filter, Statement, UpdateScope};
pub use types::{Row, RowId, Value};
