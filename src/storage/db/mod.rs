//! Engine adapters behind the [`Backend`](crate::storage::Backend) trait.
//!
//! Two engines are supported:
//! - [`SqliteBackend`]: file-based, `?` placeholders, integer booleans
//! - [`PostgresBackend`]: client/server, `$n` placeholders, keyword booleans
//!
//! Neither keeps a pool; each call opens and closes its own connection.
//!
//! # Example
//!
//! ```ignore
//! let backend = SqliteBackend::new("data/relstore.db");
//! let rows = backend.fetch_rows(&Statement::new("SELECT 1 AS one")).await?;
//! ```

pub mod postgres;
pub mod sqlite;

pub use postgres::{PostgresBackend, ServerTarget};
pub use sqlite::SqliteBackend;
