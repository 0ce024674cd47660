//! Database adapter selection by connection URL scheme.

use subsetter_core::{ColumnTuple, Database, Row, Schema, SchemaSource, Value};
use subsetter_db::{PostgresDatabase, SqliteDatabase};

use crate::error::{CliError, CliResult};

/// Either concrete adapter, behind one `Database`/`SchemaSource` impl so the
/// rest of the CLI doesn't need to be generic over the connection kind.
pub enum ConnectedDatabase {
    Sqlite(SqliteDatabase),
    Postgres(PostgresDatabase),
}

pub fn connect(database_url: &str) -> CliResult<ConnectedDatabase> {
    if let Some(path) = database_url.strip_prefix("sqlite://") {
        Ok(ConnectedDatabase::Sqlite(SqliteDatabase::open(path)?))
    } else if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        Ok(ConnectedDatabase::Postgres(PostgresDatabase::connect(database_url)?))
    } else {
        Err(CliError::UnknownScheme {
            url: database_url.to_string(),
        })
    }
}

impl Database for ConnectedDatabase {
    fn fetch_rows(
        &mut self,
        table: &str,
        cols: Option<&ColumnTuple>,
        values: Option<&[Vec<Value>]>,
    ) -> Result<Vec<Row>, Box<dyn std::error::Error + Send + Sync>> {
        match self {
            ConnectedDatabase::Sqlite(db) => db.fetch_rows(table, cols, values),
            ConnectedDatabase::Postgres(db) => db.fetch_rows(table, cols, values),
        }
    }
}

impl SchemaSource for ConnectedDatabase {
    fn load_schema(&mut self) -> Result<Schema, Box<dyn std::error::Error + Send + Sync>> {
        match self {
            ConnectedDatabase::Sqlite(db) => db.load_schema(),
            ConnectedDatabase::Postgres(db) => db.load_schema(),
        }
    }
}
