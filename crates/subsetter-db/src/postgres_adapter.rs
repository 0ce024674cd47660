//! `PostgreSQL` adapter: row fetching plus schema discovery via
//! `information_schema`.

use std::collections::HashMap;

use bytes::BytesMut;
use postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use postgres::Client;
use subsetter_core::{Column, ColumnTuple, Database, ForeignKey, Row, Schema, SchemaSource, Table, Value};
use tracing::debug;

use crate::error::DbError;

/// A `PostgreSQL` connection wrapped as an engine-facing `Database`/
/// `SchemaSource`. Operates on the `public` schema.
pub struct PostgresDatabase {
    client: Client,
}

impl PostgresDatabase {
    pub fn connect(conn_str: &str) -> Result<Self, DbError> {
        Ok(PostgresDatabase {
            client: Client::connect(conn_str, postgres::NoTls)?,
        })
    }

    pub fn from_client(client: Client) -> Self {
        PostgresDatabase { client }
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// A boxed `Value` forwarded to whichever concrete `ToSql` impl matches the
/// wire type Postgres already expects, since the `Value` variant itself was
/// produced from a previously-read column of the same declared type.
#[derive(Debug)]
struct PgParam(Value);

impl ToSql for PgParam {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match &self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql(ty, out),
            Value::Int(i) => i.to_sql(ty, out),
            Value::Float(f) => f.0.to_sql(ty, out),
            Value::Text(s) => s.to_sql(ty, out),
            Value::Bytes(b) => b.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn pg_row_to_value(row: &postgres::Row, i: usize, table: &str) -> Result<Value, DbError> {
    let column = &row.columns()[i];
    let type_name = column.type_().name();
    let value = match type_name {
        "bool" => row.get::<_, Option<bool>>(i).map_or(Value::Null, Value::Bool),
        "int2" => row.get::<_, Option<i16>>(i).map_or(Value::Null, |v| Value::Int(v.into())),
        "int4" => row.get::<_, Option<i32>>(i).map_or(Value::Null, |v| Value::Int(v.into())),
        "int8" => row.get::<_, Option<i64>>(i).map_or(Value::Null, Value::Int),
        "float4" => row
            .get::<_, Option<f32>>(i)
            .map_or(Value::Null, |v| Value::Float(subsetter_core::OrderedFloat(v.into()))),
        "float8" => row
            .get::<_, Option<f64>>(i)
            .map_or(Value::Null, |v| Value::Float(subsetter_core::OrderedFloat(v))),
        "text" | "varchar" | "bpchar" | "name" | "uuid" => row.get::<_, Option<String>>(i).map_or(Value::Null, Value::Text),
        "bytea" => row.get::<_, Option<Vec<u8>>>(i).map_or(Value::Null, Value::Bytes),
        other => {
            return Err(DbError::UnsupportedType {
                table: table.to_string(),
                column: column.name().to_string(),
                type_name: other.to_string(),
            })
        }
    };
    Ok(value)
}

impl Database for PostgresDatabase {
    fn fetch_rows(
        &mut self,
        table: &str,
        cols: Option<&ColumnTuple>,
        values: Option<&[Vec<Value>]>,
    ) -> Result<Vec<Row>, Box<dyn std::error::Error + Send + Sync>> {
        let (sql, params): (String, Vec<PgParam>) = match (cols, values) {
            (Some(_), Some(values)) if values.is_empty() => return Ok(Vec::new()),
            (Some(cols), Some(values)) => {
                let col_list = cols.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
                let mut params = Vec::with_capacity(cols.len() * values.len());
                let mut placeholder_groups = Vec::with_capacity(values.len());
                let mut n = 1usize;
                for value_tuple in values {
                    let placeholders: Vec<String> = value_tuple
                        .iter()
                        .map(|v| {
                            params.push(PgParam(v.clone()));
                            let p = format!("${n}");
                            n += 1;
                            p
                        })
                        .collect();
                    placeholder_groups.push(format!("({})", placeholders.join(", ")));
                }
                let sql = if cols.len() == 1 {
                    format!(
                        "SELECT * FROM {} WHERE {} IN ({})",
                        quote_ident(table),
                        col_list,
                        placeholder_groups
                            .iter()
                            .map(|g| g.trim_start_matches('(').trim_end_matches(')').to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    )
                } else {
                    format!(
                        "SELECT * FROM {} WHERE ({}) IN ({})",
                        quote_ident(table),
                        col_list,
                        placeholder_groups.join(", ")
                    )
                };
                (sql, params)
            }
            _ => (format!("SELECT * FROM {}", quote_ident(table)), Vec::new()),
        };

        debug!(table, sql = %sql, "fetching rows from postgres");
        let param_refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let rows = self.client.query(sql.as_str(), param_refs.as_slice())?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut values = Vec::with_capacity(row.len());
            for i in 0..row.len() {
                values.push(pg_row_to_value(row, i, table)?);
            }
            out.push(values);
        }
        Ok(out)
    }
}

impl SchemaSource for PostgresDatabase {
    fn load_schema(&mut self) -> Result<Schema, Box<dyn std::error::Error + Send + Sync>> {
        let mut schema = Schema::new();

        let table_names: Vec<String> = self
            .client
            .query(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = 'public' AND table_type = 'BASE TABLE' ORDER BY table_name",
                &[],
            )?
            .iter()
            .map(|r| r.get(0))
            .collect();

        for table_name in table_names {
            let columns: Vec<Column> = self
                .client
                .query(
                    "SELECT column_name, is_nullable = 'YES' FROM information_schema.columns \
                     WHERE table_schema = 'public' AND table_name = $1 ORDER BY ordinal_position",
                    &[&table_name],
                )?
                .iter()
                .map(|r| Column {
                    name: r.get(0),
                    nullable: r.get(1),
                })
                .collect();

            let pk_cols: Vec<String> = self
                .client
                .query(
                    "SELECT kcu.column_name FROM information_schema.table_constraints tc \
                     JOIN information_schema.key_column_usage kcu \
                       ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
                     WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = 'public' AND tc.table_name = $1 \
                     ORDER BY kcu.ordinal_position",
                    &[&table_name],
                )?
                .iter()
                .map(|r| r.get(0))
                .collect();
            let primary_key = if pk_cols.is_empty() { None } else { Some(pk_cols) };

            let unique_rows: Vec<(String, String)> = self
                .client
                .query(
                    "SELECT tc.constraint_name, kcu.column_name FROM information_schema.table_constraints tc \
                     JOIN information_schema.key_column_usage kcu \
                       ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
                     WHERE tc.constraint_type = 'UNIQUE' AND tc.table_schema = 'public' AND tc.table_name = $1 \
                     ORDER BY tc.constraint_name, kcu.ordinal_position",
                    &[&table_name],
                )?
                .iter()
                .map(|r| (r.get(0), r.get(1)))
                .collect();
            let mut unique_by_constraint: HashMap<String, ColumnTuple> = HashMap::new();
            let mut unique_order: Vec<String> = Vec::new();
            for (constraint_name, column_name) in unique_rows {
                if !unique_by_constraint.contains_key(&constraint_name) {
                    unique_order.push(constraint_name.clone());
                }
                unique_by_constraint.entry(constraint_name).or_default().push(column_name);
            }
            let unique_indexes: Vec<ColumnTuple> = unique_order
                .into_iter()
                .map(|name| unique_by_constraint.remove(&name).unwrap())
                .collect();

            let fk_rows: Vec<(String, String, String, String)> = self
                .client
                .query(
                    "SELECT tc.constraint_name, kcu.column_name AS src_column, \
                            ccu.table_name AS dst_table, ccu.column_name AS dst_column \
                     FROM information_schema.table_constraints tc \
                     JOIN information_schema.key_column_usage kcu \
                       ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
                     JOIN information_schema.constraint_column_usage ccu \
                       ON tc.constraint_name = ccu.constraint_name AND tc.table_schema = ccu.table_schema \
                      AND kcu.position_in_unique_constraint = ccu.ordinal_position \
                     WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = 'public' AND tc.table_name = $1 \
                     ORDER BY tc.constraint_name, kcu.ordinal_position",
                    &[&table_name],
                )?
                .iter()
                .map(|r| (r.get(0), r.get(1), r.get(2), r.get(3)))
                .collect();

            let mut fk_by_constraint: HashMap<String, (String, Vec<String>, Vec<String>)> = HashMap::new();
            let mut fk_order: Vec<String> = Vec::new();
            for (constraint_name, src_col, dst_table, dst_col) in fk_rows {
                if !fk_by_constraint.contains_key(&constraint_name) {
                    fk_order.push(constraint_name.clone());
                }
                let entry = fk_by_constraint.entry(constraint_name).or_insert((dst_table, Vec::new(), Vec::new()));
                entry.1.push(src_col);
                entry.2.push(dst_col);
            }
            let foreign_keys: Vec<ForeignKey> = fk_order
                .into_iter()
                .map(|name| {
                    let (dst_table, src_cols, dst_cols) = fk_by_constraint.remove(&name).unwrap();
                    ForeignKey {
                        name,
                        src_table: table_name.clone(),
                        src_cols,
                        dst_table,
                        dst_cols,
                    }
                })
                .collect();

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
