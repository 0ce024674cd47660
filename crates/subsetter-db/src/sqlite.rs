//! `SQLite` adapter: row fetching plus schema discovery via the standard
//! `sqlite_master` table and `PRAGMA table_info`/`foreign_key_list`/
//! `index_list`/`index_info` introspection calls.

use std::collections::HashMap;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;
use subsetter_core::{Column, ColumnTuple, Database, ForeignKey, Row, Schema, SchemaSource, Table, Value};
use tracing::debug;

use crate::error::DbError;

/// A `SQLite` connection wrapped as an engine-facing `Database`/`SchemaSource`.
pub struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    pub fn open(path: &str) -> Result<Self, DbError> {
        Ok(SqliteDatabase {
            conn: Connection::open(path)?,
        })
    }

    pub fn from_connection(conn: Connection) -> Self {
        SqliteDatabase { conn }
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn value_to_sql(v: &Value) -> SqlValue {
    match v {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(f.0),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
    }
}

fn sql_to_value(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(subsetter_core::OrderedFloat(f)),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

impl Database for SqliteDatabase {
    fn fetch_rows(
        &mut self,
        table: &str,
        cols: Option<&ColumnTuple>,
        values: Option<&[Vec<Value>]>,
    ) -> Result<Vec<Row>, Box<dyn std::error::Error + Send + Sync>> {
        let (sql, params): (String, Vec<SqlValue>) = match (cols, values) {
            (Some(_), Some(values)) if values.is_empty() => return Ok(Vec::new()),
            (Some(cols), Some(values)) => {
                let col_list = cols.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
                let group = format!("({})", cols.iter().map(|_| "?").collect::<Vec<_>>().join(", "));
                let in_clause = if cols.len() == 1 {
                    format!("{} IN ({})", col_list, values.iter().map(|_| "?").collect::<Vec<_>>().join(", "))
                } else {
                    let groups = values.iter().map(|_| group.clone()).collect::<Vec<_>>().join(", ");
                    format!("({}) IN ({})", col_list, groups)
                };
                let sql = format!("SELECT * FROM {} WHERE {}", quote_ident(table), in_clause);
                let params: Vec<SqlValue> = values.iter().flatten().map(value_to_sql).collect();
                (sql, params)
            }
            _ => (format!("SELECT * FROM {}", quote_ident(table)), Vec::new()),
        };

        debug!(table, sql = %sql, "fetching rows from sqlite");
        let mut stmt = self.conn.prepare(&sql)?;
        let column_count = stmt.column_count();
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                let mut out = Vec::with_capacity(column_count);
                for i in 0..column_count {
                    out.push(sql_to_value(row.get_ref(i)?));
                }
                Ok(out)
            })?
            .collect::<Result<Vec<Row>, rusqlite::Error>>()
            .map_err(DbError::from)?;

        Ok(rows)
    }
}

impl SchemaSource for SqliteDatabase {
    fn load_schema(&mut self) -> Result<Schema, Box<dyn std::error::Error + Send + Sync>> {
        let mut schema = Schema::new();

        let table_names: Vec<String> = {
            let mut stmt = self.conn.prepare(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )?;
            stmt.query_map([], |row| row.get(0))?.collect::<Result<_, _>>()?
        };

        for table_name in table_names {
            let columns_raw: Vec<(i64, String, i64, i64)> = {
                let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({})", quote_ident(&table_name)))?;
                stmt.query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,  // cid
                        row.get::<_, String>(1)?, // name
                        row.get::<_, i64>(3)?,  // notnull
                        row.get::<_, i64>(5)?,  // pk (1-based position, 0 = not part of pk)
                    ))
                })?
                .collect::<Result<_, _>>()?
            };

            let columns: Vec<Column> = columns_raw
                .iter()
                .map(|(_, name, notnull, _)| Column {
                    name: name.clone(),
                    nullable: *notnull == 0,
                })
                .collect();

            let mut pk_cols: Vec<(i64, String)> = columns_raw
                .iter()
                .filter(|(_, _, _, pk)| *pk > 0)
                .map(|(_, name, _, pk)| (*pk, name.clone()))
                .collect();
            pk_cols.sort_by_key(|(pk, _)| *pk);
            let primary_key = if pk_cols.is_empty() {
                None
            } else {
                Some(pk_cols.into_iter().map(|(_, name)| name).collect::<ColumnTuple>())
            };

            let fk_rows: Vec<(i64, i64, String, String, String)> = {
                let mut stmt = self
                    .conn
                    .prepare(&format!("PRAGMA foreign_key_list({})", quote_ident(&table_name)))?;
                stmt.query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?, // id
                        row.get::<_, i64>(1)?, // seq
                        row.get::<_, String>(2)?, // table
                        row.get::<_, String>(3)?, // from
                        row.get::<_, String>(4)?, // to
                    ))
                })?
                .collect::<Result<_, _>>()?
            };

            let mut grouped: HashMap<i64, Vec<(i64, String, String, String)>> = HashMap::new();
            for (id, seq, dst_table, from_col, to_col) in fk_rows {
                grouped.entry(id).or_default().push((seq, dst_table, from_col, to_col));
            }
            let mut foreign_keys = Vec::new();
            for (id, mut entries) in grouped {
                entries.sort_by_key(|(seq, ..)| *seq);
                let dst_table = entries[0].1.clone();
                let src_cols: ColumnTuple = entries.iter().map(|(_, _, from, _)| from.clone()).collect();
                let dst_cols: ColumnTuple = entries.iter().map(|(_, _, _, to)| to.clone()).collect();
                foreign_keys.push(ForeignKey {
                    name: format!("{table_name}_fk{id}"),
                    src_table: table_name.clone(),
                    src_cols,
                    dst_table,
                    dst_cols,
                });
            }

            let index_rows: Vec<(String, i64, String)> = {
                let mut stmt = self.conn.prepare(&format!("PRAGMA index_list({})", quote_ident(&table_name)))?;
                stmt.query_map([], |row| {
                    Ok((
                        row.get::<_, String>(1)?, // name
                        row.get::<_, i64>(2)?,    // unique
                        row.get::<_, String>(3)?, // origin
                    ))
                })?
                .collect::<Result<_, _>>()?
            };

            let mut unique_indexes = Vec::new();
            for (index_name, is_unique, origin) in index_rows {
                if is_unique == 0 || origin == "pk" {
                    continue;
                }
                let mut cols: Vec<(i64, String)> = {
                    let mut stmt = self.conn.prepare(&format!("PRAGMA index_info({})", quote_ident(&index_name)))?;
                    stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(2)?)))?
                        .collect::<Result<_, _>>()?
                };
                cols.sort_by_key(|(seqno, _)| *seqno);
                unique_indexes.push(cols.into_iter().map(|(_, name)| name).collect::<ColumnTuple>());
            }

            schema.insert_table(Table {
                name: table_name,
                columns,
                primary_key,
                unique_indexes,
                foreign_keys,
            });
        }

        Ok(schema)
    }
}
