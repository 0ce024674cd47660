//! Result accumulation: merging fetched rows into the result store keyed
//! by effective primary key, nulling untraversed FK columns, and tracking
//! duplicate counts for tables with no unique key (spec.md §4.5).

use indexmap::IndexMap;
use std::collections::HashSet;

use crate::model::SubjectId;
use crate::schema::Table;
use crate::value::{Row, Value};

/// One accumulated row: its table, column values, the subjects that
/// required it, whether it's sticky, and — for tables that permit
/// duplicate rows — how many times it was fetched in the pass that last
/// touched it.
#[derive(Debug, Clone)]
pub struct ResultsRow {
    pub table: String,
    pub row: Row,
    pub subjects: HashSet<SubjectId>,
    pub sticky: bool,
    pub count: u64,
}

impl ResultsRow {
    pub fn new(table: String, row: Row, sticky: bool) -> Self {
        ResultsRow {
            table,
            row,
            subjects: HashSet::new(),
            sticky,
            count: 1,
        }
    }

    /// Merge-NULL law: for each position where `self` is NULL and `other`
    /// is not, `self` absorbs `other`'s value. The newer row (`self`)
    /// otherwise wins — this only fills gaps, it never overwrites a
    /// non-NULL value already present.
    fn absorb_nulls_from(&mut self, other: &ResultsRow) {
        for (mine, theirs) in self.row.iter_mut().zip(other.row.iter()) {
            if mine.is_null() && !theirs.is_null() {
                *mine = theirs.clone();
            }
        }
    }
}

/// Per-table map from effective-primary-key value tuple to the
/// accumulated row. The two constant outer keys from spec.md §3
/// (`Table`, `EffectivePK-tuple`) collapse to one map per table, since
/// both are fixed for the table's lifetime in a single run.
#[derive(Debug, Default)]
pub struct ResultStore {
    tables: IndexMap<String, IndexMap<Vec<Value>, ResultsRow>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate a batch of freshly fetched rows for `table` into the
    /// store. `processed_outgoing_fk_cols` are the table's own FK source
    /// columns whose relation was traversed this pass — every other FK
    /// column gets overwritten with NULL (invariant 1).
    pub fn accumulate(
        &mut self,
        table: &Table,
        subject: &SubjectId,
        sticky: bool,
        fetched_rows: Vec<Row>,
        processed_outgoing_fk_cols: &HashSet<String>,
    ) {
        let all_fk_cols: HashSet<String> = table
            .foreign_keys
            .iter()
            .flat_map(|fk| fk.src_cols.iter().cloned())
            .collect();
        let cols_to_null: Vec<usize> = all_fk_cols
            .difference(processed_outgoing_fk_cols)
            .filter_map(|c| table.column_index(c))
            .collect();

        let epk = table.effective_primary_key();
        let epk_indexes: Vec<usize> = epk
            .iter()
            .map(|c| {
                table
                    .column_index(c)
                    .expect("effective primary key column must exist on table")
            })
            .collect();
        let can_have_duplicates = table.can_have_duplicated_rows();

        let table_results = self.tables.entry(table.name.clone()).or_default();
        let mut batch_counts: IndexMap<Vec<Value>, u64> = IndexMap::new();

        for mut row in fetched_rows {
            for &i in &cols_to_null {
                row[i] = Value::Null;
            }

            let mut results_row = ResultsRow::new(table.name.clone(), row, sticky);
            results_row.subjects.insert(subject.clone());

            let key: Vec<Value> = epk_indexes.iter().map(|&i| results_row.row[i].clone()).collect();

            if can_have_duplicates {
                *batch_counts.entry(key.clone()).or_insert(0) += 1;
            }

            if let Some(existing) = table_results.get(&key) {
                if existing.row != results_row.row {
                    results_row.absorb_nulls_from(existing);
                }
                let merged_subjects = results_row.subjects.union(&existing.subjects).cloned().collect();
                results_row.subjects = merged_subjects;
            }

            table_results.insert(key, results_row);
        }

        if can_have_duplicates {
            for (key, count) in batch_counts {
                if let Some(row) = table_results.get_mut(&key) {
                    row.count = count;
                }
            }
        }
    }

    /// Deterministic flat enumeration: tables sorted by name, rows within
    /// a table sorted by their raw tuple, each repeated `count` times
    /// (spec.md §4.6).
    pub fn flat_results(&self) -> Vec<(String, Row)> {
        let mut table_names: Vec<&String> = self.tables.keys().collect();
        table_names.sort();

        let mut out = Vec::new();
        for table_name in table_names {
            let rows = &self.tables[table_name];
            let mut sorted_rows: Vec<&ResultsRow> = rows.values().collect();
            sorted_rows.sort_by(|a, b| a.row.cmp(&b.row));
            for results_row in sorted_rows {
                for _ in 0..results_row.count {
                    out.push((table_name.clone(), results_row.row.clone()));
                }
            }
        }
        out
    }

    pub fn tables(&self) -> impl Iterator<Item = &String> {
        self.tables.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ForeignKey};
    use proptest::prelude::*;

    fn users_table() -> Table {
        Table {
            name: "users".into(),
            columns: vec![
                Column { name: "id".into(), nullable: false },
                Column { name: "name".into(), nullable: false },
                Column { name: "manager_id".into(), nullable: true },
            ],
            primary_key: Some(vec!["id".into()]),
            unique_indexes: vec![],
            foreign_keys: vec![ForeignKey {
                name: "users_manager_id_fkey".into(),
                src_table: "users".into(),
                src_cols: vec!["manager_id".into()],
                dst_table: "users".into(),
                dst_cols: vec!["id".into()],
            }],
        }
    }

    #[test]
    fn untraversed_fk_is_nulled() {
        let table = users_table();
        let mut store = ResultStore::new();
        let subject = SubjectId("s1".into());
        store.accumulate(
            &table,
            &subject,
            true,
            vec![vec![Value::Int(1), Value::Text("a".into()), Value::Int(2)]],
            &HashSet::new(),
        );
        let flat = store.flat_results();
        assert_eq!(flat, vec![("users".to_string(), vec![Value::Int(1), Value::Text("a".into()), Value::Null])]);
    }

    #[test]
    fn traversed_fk_is_preserved() {
        let table = users_table();
        let mut store = ResultStore::new();
        let subject = SubjectId("s1".into());
        let mut processed = HashSet::new();
        processed.insert("manager_id".to_string());
        store.accumulate(
            &table,
            &subject,
            true,
            vec![vec![Value::Int(1), Value::Text("a".into()), Value::Int(2)]],
            &processed,
        );
        let flat = store.flat_results();
        assert_eq!(flat, vec![("users".to_string(), vec![Value::Int(1), Value::Text("a".into()), Value::Int(2)])]);
    }

    #[test]
    fn merge_null_law_fills_gaps_without_overwriting() {
        let table = users_table();
        let mut store = ResultStore::new();
        let subject = SubjectId("s1".into());
        let mut processed = HashSet::new();
        processed.insert("manager_id".to_string());

        store.accumulate(
            &table,
            &subject,
            true,
            vec![vec![Value::Int(1), Value::Text("a".into()), Value::Null]],
            &processed,
        );
        store.accumulate(
            &table,
            &subject,
            true,
            vec![vec![Value::Int(1), Value::Text("a".into()), Value::Int(9)]],
            &processed,
        );

        let flat = store.flat_results();
        assert_eq!(flat, vec![("users".to_string(), vec![Value::Int(1), Value::Text("a".into()), Value::Int(9)])]);
    }

    #[test]
    fn duplicate_count_is_overwritten_not_accumulated() {
        let table = Table {
            name: "events".into(),
            columns: vec![Column { name: "a".into(), nullable: true }],
            primary_key: None,
            unique_indexes: vec![],
            foreign_keys: vec![],
        };
        let mut store = ResultStore::new();
        let subject = SubjectId("s1".into());

        store.accumulate(&table, &subject, true, vec![vec![Value::Int(1)]; 3], &HashSet::new());
        store.accumulate(&table, &subject, true, vec![vec![Value::Int(1)]], &HashSet::new());

        let flat = store.flat_results();
        assert_eq!(flat.len(), 1, "second pass overwrites the count rather than adding to it");
    }

    proptest! {
        /// Merge-NULL law: merging never loses a non-NULL value already
        /// present, and always fills a NULL slot when the other side has a
        /// value there.
        #[test]
        fn merge_null_law_holds_for_arbitrary_rows(
            left in proptest::collection::vec(any::<Option<i64>>(), 1..8),
            right in proptest::collection::vec(any::<Option<i64>>(), 1..8),
        ) {
            let len = left.len().min(right.len());
            let left_row: Vec<Value> = left[..len].iter().map(|v| v.map_or(Value::Null, Value::Int)).collect();
            let right_row: Vec<Value> = right[..len].iter().map(|v| v.map_or(Value::Null, Value::Int)).collect();

            let mut merged = ResultsRow::new("t".into(), left_row.clone(), true);
            let other = ResultsRow::new("t".into(), right_row.clone(), true);
            merged.absorb_nulls_from(&other);

            for i in 0..len {
                if !left_row[i].is_null() {
                    prop_assert_eq!(&merged.row[i], &left_row[i]);
                } else {
                    prop_assert_eq!(&merged.row[i], &right_row[i]);
                }
            }
        }
    }
}
