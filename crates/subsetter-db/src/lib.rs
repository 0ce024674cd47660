//! Concrete `Database`/`SchemaSource` adapters consumed by `subsetter-core`.
//!
//! This crate provides:
//! - `SQLite` via `rusqlite` (`sqlite` feature)
//! - `PostgreSQL` via `postgres` (`postgres` feature)

#![forbid(unsafe_code)]

pub mod error;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres_adapter;

pub use error::{DbError, DbResult};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

#[cfg(feature = "postgres")]
pub use postgres_adapter::PostgresDatabase;
