//! `WorkItem`: a unit of planned fetch (spec.md §3, §4.7).

use crate::model::SubjectId;
use crate::results::ResultsRow;
use crate::schema::{ColumnTuple, Table};
use crate::value::Value;

/// One hop in a work item's provenance trace, rendered by `print_history`
/// in explain mode (spec.md §4.4 "Explain mode").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub table: String,
    pub cols_csv: Option<String>,
    pub values_csv: Option<String>,
    pub sticky: bool,
}

/// A unit of planned fetch: a table, an optional value filter, the sticky
/// flag, and the traversal depth/history that produced it.
///
/// Invariant: `cols.is_none() == values.is_none()`.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub subject: SubjectId,
    pub table: String,
    pub cols: Option<ColumnTuple>,
    pub values: Option<Vec<Vec<Value>>>,
    pub sticky: bool,
    pub depth: u32,
    pub history: Vec<HistoryEntry>,
}

impl WorkItem {
    /// A seed work item: always sticky, depth 0, one-entry history.
    pub fn seed(subject: SubjectId, table: String, cols: Option<ColumnTuple>, values: Option<Vec<Vec<Value>>>) -> Self {
        assert_eq!(cols.is_none(), values.is_none(), "cols and values must both be present or both absent");
        let history = vec![Self::descriptor(&table, cols.as_ref(), values.as_ref().and_then(|v| v.first()), true)];
        WorkItem {
            subject,
            table,
            cols,
            values,
            sticky: true,
            depth: 0,
            history,
        }
    }

    /// A child work item produced by relation expansion. `origin_row`, when
    /// present (explain mode), contributes an extra history entry
    /// describing the specific row that led here, by its effective primary
    /// key — matching the original implementation's per-row provenance.
    pub fn child(
        parent: &WorkItem,
        table: String,
        cols: Option<ColumnTuple>,
        values: Option<Vec<Vec<Value>>>,
        sticky: bool,
        origin_table: Option<&Table>,
        origin_row: Option<&ResultsRow>,
    ) -> Self {
        assert_eq!(cols.is_none(), values.is_none(), "cols and values must both be present or both absent");
        let mut history = parent.history.clone();

        if let (Some(origin_table), Some(origin_row)) = (origin_table, origin_row) {
            let epk = origin_table.effective_primary_key();
            let values_csv = epk
                .iter()
                .filter_map(|c| origin_table.column_index(c))
                .map(|i| origin_row.row[i].to_string())
                .collect::<Vec<_>>();
            let row_entry = Self::descriptor_from_parts(&origin_table.name, &epk, &values_csv, sticky);
            if history.last() != Some(&row_entry) {
                history.push(row_entry);
            }
        }

        let item_entry = Self::descriptor(&table, cols.as_ref(), values.as_ref().and_then(|v| v.first()), sticky);
        if history.last() != Some(&item_entry) {
            history.push(item_entry);
        }

        WorkItem {
            subject: parent.subject.clone(),
            table,
            cols,
            values,
            sticky,
            depth: parent.depth + 1,
            history,
        }
    }

    fn descriptor(table: &str, cols: Option<&ColumnTuple>, first_value: Option<&Vec<Value>>, sticky: bool) -> HistoryEntry {
        match (cols, first_value) {
            (Some(cols), Some(values)) => {
                let values_csv: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                Self::descriptor_from_parts(table, cols, &values_csv, sticky)
            }
            _ => HistoryEntry {
                table: table.to_string(),
                cols_csv: None,
                values_csv: None,
                sticky,
            },
        }
    }

    fn descriptor_from_parts(table: &str, cols: &[String], values_csv: &[String], sticky: bool) -> HistoryEntry {
        let (cols_csv, values_csv) = if cols.len() > 1 {
            (format!("({})", cols.join(",")), format!("({})", values_csv.join(",")))
        } else {
            (cols.join(","), values_csv.join(","))
        };
        HistoryEntry {
            table: table.to_string(),
            cols_csv: Some(cols_csv),
            values_csv: Some(values_csv),
            sticky,
        }
    }

    /// Render the provenance trace the way explain mode prints it:
    /// `table.col=value* -> table2.col2=value2 -> ...`, a trailing `*`
    /// marking sticky hops.
    pub fn render_history(&self) -> String {
        let mut out = String::new();
        for (i, entry) in self.history.iter().enumerate() {
            if i > 0 {
                out.push_str(" -> ");
            }
            match (&entry.cols_csv, &entry.values_csv) {
                (Some(cols), Some(values)) => out.push_str(&format!("{}.{}={}", entry.table, cols, values)),
                _ => out.push_str(&entry.table),
            }
            if entry.sticky {
                out.push('*');
            }
        }
        out
    }
}
