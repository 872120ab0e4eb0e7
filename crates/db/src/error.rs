//! Typed error type for the db crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    // ------ Schema shape (raised when a table handle is bound) ------

    #[error("table '{table}' has no primary key")]
    MissingPrimaryKey { table: String },

    /// Only single-column primary keys are supported.
    #[error("table '{table}' has a composite primary key {columns:?}")]
    CompositePrimaryKey { table: String, columns: Vec<String> },

    #[error("table '{table}' declares column '{column}' more than once")]
    DuplicateColumn { table: String, column: String },

    #[error("table '{0}' does not exist")]
    TableNotFound(String),

    // ------ Data integrity ------

    /// A primary-key lookup matched more than one row.
    #[error("primary key lookup on '{table}' matched more than one row")]
    DuplicatePrimaryKey { table: String },

    // ------ Record input ------

    #[error("column '{column}' does not exist on table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("record has {got} values but table '{table}' has {expected} columns")]
    ColumnCountMismatch {
        table: String,
        expected: usize,
        got: usize,
    },

    #[error("value for column '{column}' is not a valid {expected}")]
    InvalidValue {
        column: String,
        expected: &'static str,
    },

    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),

    // ------ Custom type registry ------

    #[error("custom type registry has not been initialized")]
    RegistryNotInitialized,

    #[error("custom type registry is already initialized for schema '{0}'")]
    RegistryConflict(String),

    #[error("configuration error: {0}")]
    Config(String),
}
