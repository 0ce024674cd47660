//! The schema model consumed from the Schema collaborator (spec.md §3).
//!
//! Tables reference each other only by name, not by owning pointers —
//! `incoming_foreign_keys` is a derived query over the whole `Schema`
//! rather than a back-pointer stored on `Table`, which keeps the model a
//! plain tree instead of a reference-counted graph (spec.md §9: "avoid
//! back-pointer cycles in owning references").

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A column, identified by `(table, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub nullable: bool,
}

/// An ordered tuple of column names, anchored to one table.
///
/// Used for primary keys, unique indexes, and one side of a foreign key.
pub type ColumnTuple = Vec<String>;

/// A foreign key: an ordered `src_cols` tuple on this table referencing an
/// equal-arity `dst_cols` tuple on `dst_table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKey {
    pub name: String,
    pub src_table: String,
    pub src_cols: ColumnTuple,
    pub dst_table: String,
    pub dst_cols: ColumnTuple,
}

/// One table in the schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub primary_key: Option<ColumnTuple>,
    pub unique_indexes: Vec<ColumnTuple>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The primary key if present, else the smallest unique index (by
    /// arity, then lexicographically by column name for determinism), else
    /// the full column tuple.
    pub fn effective_primary_key(&self) -> ColumnTuple {
        if let Some(pk) = &self.primary_key {
            return pk.clone();
        }
        if let Some(smallest) = self
            .unique_indexes
            .iter()
            .min_by_key(|idx| (idx.len(), idx.join(",")))
        {
            return smallest.clone();
        }
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// True iff no primary key or unique index exists, i.e. the effective
    /// primary key is the full column tuple and duplicate rows are
    /// possible and must be counted rather than deduplicated away.
    pub fn can_have_duplicated_rows(&self) -> bool {
        self.primary_key.is_none() && self.unique_indexes.is_empty()
    }
}

/// The full relational schema, as discovered by a `SchemaSource`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    pub tables: IndexMap<String, Table>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn insert_table(&mut self, table: Table) {
        self.tables.insert(table.name.clone(), table);
    }

    /// Foreign keys on other tables that reference `table_name`, derived by
    /// scanning every table rather than stored as a back-pointer.
    pub fn incoming_foreign_keys(&self, table_name: &str) -> Vec<&ForeignKey> {
        self.tables
            .values()
            .flat_map(|t| t.foreign_keys.iter())
            .filter(|fk| fk.dst_table == table_name)
            .collect()
    }
}
