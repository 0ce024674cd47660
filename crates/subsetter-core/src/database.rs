//! The narrow contract the engine consumes from a live database connection
//! (spec.md §6 "Database adapter (consumed)"). Implementations live in the
//! `subsetter-db` crate; the engine only ever talks to `dyn Database`.

use crate::schema::{ColumnTuple, Schema};
use crate::value::{Row, Value};

/// Row fetching for one table, optionally filtered by `(cols) IN (values)`.
///
/// Must be repeatably callable and must not leak cursors or other
/// per-call state into the engine.
pub trait Database {
    /// Fetch all rows of `table` when `cols`/`values` are `None`, else
    /// every row where `tuple(cols) IN values`. The returned rows' column
    /// order must match `Table::columns`.
    fn fetch_rows(
        &mut self,
        table: &str,
        cols: Option<&ColumnTuple>,
        values: Option<&[Vec<Value>]>,
    ) -> Result<Vec<Row>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Schema discovery, read once per run before traversal begins.
pub trait SchemaSource {
    fn load_schema(&mut self) -> Result<Schema, Box<dyn std::error::Error + Send + Sync>>;
}
