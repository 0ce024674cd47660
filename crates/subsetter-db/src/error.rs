//! Error types for the database adapter layer.

use thiserror::Error;

/// Errors raised while connecting to or introspecting a concrete database.
#[derive(Debug, Error)]
pub enum DbError {
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] postgres::Error),

    /// A table or column referenced an adapter couldn't find in the live
    /// database's own catalog.
    #[error("schema discovery error: {0}")]
    Schema(String),

    /// A value read back from the driver had a type the engine's `Value`
    /// model has no representation for.
    #[error("unsupported column type for {table}.{column}: {type_name}")]
    UnsupportedType {
        table: String,
        column: String,
        type_name: String,
    },
}

pub type DbResult<T> = std::result::Result<T, DbError>;
