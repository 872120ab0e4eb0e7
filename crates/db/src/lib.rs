//! `db` crate — generic record access over Postgres tables.
//!
//! Provides a connection pool, table handles with a single-column primary key,
//! record CRUD that works against any such table, and the custom `email`
//! domain type. No business logic lives here.

pub mod config;
pub mod error;
pub mod models;
pub mod pool;
mod query;
pub mod repository;
pub mod schema;
pub mod types;

#[cfg(test)]
mod fixtures;

pub use config::DbConfig;
pub use error::DbError;
pub use models::{Created, NewRecords, Record, RecordData, Value};
pub use pool::DbPool;
pub use schema::{Column, ColumnType, QualifiedName, Table};
pub use types::email::Email;
pub use types::TypeRegistry;
