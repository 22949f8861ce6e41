//! Relstore - Engine-agnostic Relational Storage
//!
//! This crate lets an application run the same data operations (select,
//! insert, update, delete, transactional batches) against SQLite or
//! PostgreSQL. Each backend privately handles its dialect: placeholder syntax,
//! boolean literals, function names, generated identifiers and foreign-key
//! enforcement. Callers see one row format and one error type.
//!
//! # Architecture
//!
//! - **Config**: YAML configuration with environment expansion
//! - **Storage**: Query builders, dialects, backends and the [`Store`] facade
//!
//! # Example
//!
//! ```rust,ignore
//! use relstore::{Assignments, Filter, StorageBuilder};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = StorageBuilder::sqlite("data/thread.db").build()?;
//!     store.initialize_schema(include_str!("schema.sql")).await;
//!
//!     let uid = store
//!         .insert_generating_id("reports", &Assignments::new().set("title", "APT"), "uid")
//!         .await?;
//!     let rows = store.select("reports", &Filter::new().eq("uid", uid)).await?;
//!     println!("{rows:?}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod storage;

pub use storage::{
    Assignments, Backend, Engine, Filter, Row, RowId, Statement, StorageBuilder, StorageError,
    Store, UpdateScope, Value,
};
